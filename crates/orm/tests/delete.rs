mod common;

use common::*;
use elif_lite_orm::{Entity, EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Member {
    id: i64,
    name: String,
}

impl Entity for Member {
    const NAME: &'static str = "Member";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
    }
}

/// References `member` through two columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Message {
    id: i64,
    body: String,
    sender: Option<Box<Member>>,
    receiver: Option<Box<Member>>,
}

impl Entity for Message {
    const NAME: &'static str = "Message";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("body", FieldType::Text))
            .field(FieldDescriptor::many_to_one::<Member>("sender"))
            .field(FieldDescriptor::many_to_one::<Member>("receiver"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Region {
    id: i64,
    name: String,
}

impl Entity for Region {
    const NAME: &'static str = "Region";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Depot {
    id: i64,
    name: String,
    region: Option<Box<Region>>,
}

impl Entity for Depot {
    const NAME: &'static str = "Depot";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
            .field(FieldDescriptor::many_to_one::<Region>("region"))
    }
}

/// Reaches `region` both directly and through `depot`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Parcel {
    id: i64,
    label: String,
    region: Option<Box<Region>>,
    depot: Option<Box<Depot>>,
}

impl Entity for Parcel {
    const NAME: &'static str = "Parcel";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("label", FieldType::Text))
            .field(FieldDescriptor::many_to_one::<Region>("region"))
            .field(FieldDescriptor::many_to_one::<Depot>("depot"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Category {
    id: i64,
    name: String,
    parent: Option<Box<Category>>,
}

impl Entity for Category {
    const NAME: &'static str = "Category";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(Self::NAME)
            .field(FieldDescriptor::id("id"))
            .field(FieldDescriptor::column("name", FieldType::Text))
            .field(FieldDescriptor::many_to_one::<Category>("parent"))
    }
}

fn graph_registry() -> EntityRegistry {
    EntityRegistry::new()
        .register::<Member>()
        .register::<Message>()
        .register::<Region>()
        .register::<Depot>()
        .register::<Parcel>()
        .register::<Category>()
}

fn ids(test: &TestDb, table: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = test
        .raw(&format!("SELECT _id FROM {}", table))
        .iter()
        .filter_map(|row| int(row, "_id"))
        .collect();
    ids.sort_unstable();
    ids
}

fn author_with_books(test: &TestDb, name: &str, titles: &[&str]) -> Author {
    let mut author = Author {
        name: name.to_string(),
        books: titles
            .iter()
            .map(|title| Book {
                title: title.to_string(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    test.db.store(&mut author).unwrap();
    author
}

#[test]
fn test_delete_cascades_to_referencing_rows() {
    let test = TestDb::open();
    let tove = author_with_books(&test, "Tove", &["Comet", "Winter"]);
    let other = author_with_books(&test, "Astrid", &["Pippi"]);

    let deleted = test.db.delete::<Author>(&[tove.id]).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(test.count_rows("author"), 1);

    let rows = test.raw("SELECT author_id FROM book");
    assert_eq!(rows.len(), 1);
    assert_eq!(int(&rows[0], "author_id"), Some(other.id));
}

#[test]
fn test_delete_several_roots_at_once() {
    let test = TestDb::open();
    let a = author_with_books(&test, "A", &["1", "2"]);
    let b = author_with_books(&test, "B", &["3"]);

    let deleted = test.db.delete::<Author>(&[a.id, b.id, a.id]).unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(test.count_rows("book"), 0);
}

#[test]
fn test_delete_missing_identifier() {
    let test = TestDb::open();
    assert_eq!(test.db.delete::<Author>(&[42]).unwrap(), 0);
    assert_eq!(test.db.delete::<Author>(&[]).unwrap(), 0);
}

#[test]
fn test_delete_follows_many_to_one_references() {
    let test = TestDb::open();
    let mut group = Group {
        name: "admins".to_string(),
        person: Some(Box::new(person("matti", 30))),
        ..Default::default()
    };
    test.db.store(&mut group).unwrap();
    let person_id = group.person.as_ref().unwrap().id;

    assert_eq!(test.db.delete::<Person>(&[person_id]).unwrap(), 1);
    assert_eq!(test.count_rows("group"), 0);
}

#[test]
fn test_many_to_many_counterparts_shared_ownership() {
    let test = TestDb::open();
    let mut matti = person("matti", 30);
    matti.class_rooms = vec![room("math"), room("art")];
    test.db.store(&mut matti).unwrap();
    let math = matti.class_rooms[0].clone();
    let art = matti.class_rooms[1].clone();

    let mut liisa = person("liisa", 28);
    liisa.class_rooms = vec![art.clone()];
    test.db.store(&mut liisa).unwrap();
    assert_eq!(test.count_rows("person_class_room"), 3);

    assert_eq!(test.db.delete::<Person>(&[matti.id]).unwrap(), 1);

    let rooms: Vec<i64> = test
        .raw("SELECT _id FROM class_room")
        .iter()
        .filter_map(|row| int(row, "_id"))
        .collect();
    assert_eq!(rooms, vec![art.id]);
    assert!(!rooms.contains(&math.id));

    let links = test.raw("SELECT person_id, class_room_id FROM person_class_room");
    assert_eq!(links.len(), 1);
    assert_eq!(int(&links[0], "person_id"), Some(liisa.id));
}

#[test]
fn test_delete_where_uses_filter() {
    let test = TestDb::open();
    for (name, age) in [("a", 10), ("b", 20), ("c", 30)] {
        test.db.store(&mut person(name, age)).unwrap();
    }

    let deleted = test
        .db
        .delete_where::<Person, _>(|_, p| {
            p.ge("age", 20);
        })
        .unwrap();
    assert_eq!(deleted, 2);

    let remaining = test.db.find_all::<Person, _>(|_, _| {}).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].username, "a");
}

#[test]
fn test_delete_through_two_columns_of_one_table() {
    let test = TestDb::open_with(graph_registry());
    let mut a = Member { name: "a".to_string(), ..Default::default() };
    let mut b = Member { name: "b".to_string(), ..Default::default() };
    let mut c = Member { name: "c".to_string(), ..Default::default() };
    for member in [&mut a, &mut b, &mut c] {
        test.db.store(member).unwrap();
    }

    let message = |body: &str, from: &Member, to: &Member| Message {
        body: body.to_string(),
        sender: Some(Box::new(from.clone())),
        receiver: Some(Box::new(to.clone())),
        ..Default::default()
    };
    let mut sent = message("a to b", &a, &b);
    let mut received = message("b to a", &b, &a);
    let mut unrelated = message("b to c", &b, &c);
    for message in [&mut sent, &mut received, &mut unrelated] {
        test.db.store(message).unwrap();
    }

    assert_eq!(test.db.delete::<Member>(&[a.id]).unwrap(), 1);
    assert_eq!(ids(&test, "member"), vec![b.id, c.id]);
    assert_eq!(ids(&test, "message"), vec![unrelated.id]);
}

#[test]
fn test_delete_reaches_rows_through_every_path() {
    let test = TestDb::open_with(graph_registry());
    let mut north = Region { name: "north".to_string(), ..Default::default() };
    let mut south = Region { name: "south".to_string(), ..Default::default() };
    test.db.store(&mut north).unwrap();
    test.db.store(&mut south).unwrap();

    let mut depot = Depot {
        name: "harbour".to_string(),
        region: Some(Box::new(north.clone())),
        ..Default::default()
    };
    test.db.store(&mut depot).unwrap();

    let parcel = |label: &str, region: &Region, depot: Option<&Depot>| Parcel {
        label: label.to_string(),
        region: Some(Box::new(region.clone())),
        depot: depot.map(|d| Box::new(d.clone())),
        ..Default::default()
    };
    // only reachable through the depot
    let mut routed = parcel("routed", &south, Some(&depot));
    let mut direct = parcel("direct", &north, None);
    let mut both = parcel("both", &north, Some(&depot));
    let mut kept = parcel("kept", &south, None);
    for parcel in [&mut routed, &mut direct, &mut both, &mut kept] {
        test.db.store(parcel).unwrap();
    }

    assert_eq!(test.db.delete::<Region>(&[north.id]).unwrap(), 1);
    assert_eq!(ids(&test, "region"), vec![south.id]);
    assert!(ids(&test, "depot").is_empty());
    assert_eq!(ids(&test, "parcel"), vec![kept.id]);
}

#[test]
fn test_delete_follows_self_references() {
    let test = TestDb::open_with(graph_registry());
    let mut root = Category { name: "root".to_string(), ..Default::default() };
    test.db.store(&mut root).unwrap();
    let mut child = Category {
        name: "child".to_string(),
        parent: Some(Box::new(root.clone())),
        ..Default::default()
    };
    test.db.store(&mut child).unwrap();
    let mut grandchild = Category {
        name: "grandchild".to_string(),
        parent: Some(Box::new(child.clone())),
        ..Default::default()
    };
    let mut other = Category { name: "other".to_string(), ..Default::default() };
    test.db.store(&mut grandchild).unwrap();
    test.db.store(&mut other).unwrap();

    assert_eq!(test.db.delete::<Category>(&[root.id]).unwrap(), 1);
    assert_eq!(ids(&test, "category"), vec![other.id]);
}
