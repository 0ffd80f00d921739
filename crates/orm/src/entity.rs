//! Entity metadata - declarative descriptions of mapped record types
//!
//! The engine never introspects Rust types. Each entity hands over an
//! [`EntityDescriptor`] once, at registration time, and every later stage
//! (schema synthesis, query rendering, cascades) works off that structure.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A record type mapped to a table
///
/// Instances travel through the engine as `serde_json` objects whose keys are
/// the descriptor's field names. Implementors are expected to be
/// `#[serde(default)]` so that rows and identifier-only stubs can always be
/// materialized; a failing deserialization is reported as a mapping error.
pub trait Entity: Serialize + DeserializeOwned + 'static {
    /// Type name used for registration and relation targets
    const NAME: &'static str;

    /// Field metadata for this entity
    fn descriptor() -> EntityDescriptor;
}

/// Declared value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Real,
    Boolean,
    Decimal,
    Text,
    Enum,
    DateTime,
    Date,
    Uuid,
    Blob,
    /// Identifier of a related entity
    Entity,
}

/// Which operations propagate across a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cascade {
    #[default]
    None,
    Store,
    Delete,
    All,
}

impl Cascade {
    pub fn stores(self) -> bool {
        matches!(self, Cascade::Store | Cascade::All)
    }

    pub fn deletes(self) -> bool {
        matches!(self, Cascade::Delete | Cascade::All)
    }
}

/// When related entities are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Fetch {
    Eager,
    #[default]
    Lazy,
}

/// Shape of an association between two entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
    ManyToMany,
    /// Without `mapped_by` this side owns the foreign key
    OneToOne { mapped_by: Option<String> },
}

impl RelationKind {
    /// Whether the foreign-key column lives on this side
    pub fn is_owning(&self) -> bool {
        matches!(
            self,
            RelationKind::ManyToOne | RelationKind::OneToOne { mapped_by: None }
        )
    }

    /// Whether the field holds a collection
    pub fn is_collection(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Relation metadata attached to a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    /// Type name of the related entity
    pub target: String,
    pub cascade: Cascade,
    pub fetch: Fetch,
}

/// Role a field plays in the mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRole {
    Identifier,
    Column,
    Transient,
    Relation(Relation),
}

/// Metadata for a single entity field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    name: String,
    column: Option<String>,
    role: FieldRole,
    field_type: FieldType,
    indexed: bool,
    unique: bool,
}

impl FieldDescriptor {
    fn with_role(name: impl Into<String>, role: FieldRole, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            column: None,
            role,
            field_type,
            indexed: false,
            unique: false,
        }
    }

    /// The identifier field
    pub fn id(name: impl Into<String>) -> Self {
        Self::with_role(name, FieldRole::Identifier, FieldType::Integer)
    }

    /// A plain persisted column
    pub fn column(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::with_role(name, FieldRole::Column, field_type)
    }

    /// A field that is never persisted
    pub fn transient(name: impl Into<String>) -> Self {
        Self::with_role(name, FieldRole::Transient, FieldType::Text)
    }

    /// A relation to an entity identified by type name
    pub fn relation_to(name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self::with_role(
            name,
            FieldRole::Relation(Relation {
                kind,
                target: target.into(),
                cascade: Cascade::None,
                fetch: Fetch::Lazy,
            }),
            FieldType::Entity,
        )
    }

    pub fn many_to_one<T: Entity>(name: impl Into<String>) -> Self {
        Self::relation_to(name, T::NAME, RelationKind::ManyToOne)
    }

    pub fn one_to_many<T: Entity>(name: impl Into<String>) -> Self {
        Self::relation_to(name, T::NAME, RelationKind::OneToMany)
    }

    pub fn many_to_many<T: Entity>(name: impl Into<String>) -> Self {
        Self::relation_to(name, T::NAME, RelationKind::ManyToMany)
    }

    /// Owning one-to-one; call [`mapped_by`](Self::mapped_by) for the inverse side
    pub fn one_to_one<T: Entity>(name: impl Into<String>) -> Self {
        Self::relation_to(name, T::NAME, RelationKind::OneToOne { mapped_by: None })
    }

    /// Override the column name
    pub fn named(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Mark a one-to-one as the inverse side of `field` on the target
    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        if let FieldRole::Relation(relation) = &mut self.role {
            if let RelationKind::OneToOne { mapped_by } = &mut relation.kind {
                *mapped_by = Some(field.into());
            }
        }
        self
    }

    pub fn cascade(mut self, cascade: Cascade) -> Self {
        if let FieldRole::Relation(relation) = &mut self.role {
            relation.cascade = cascade;
        }
        self
    }

    pub fn fetch(mut self, fetch: Fetch) -> Self {
        if let FieldRole::Relation(relation) = &mut self.role {
            relation.fetch = fetch;
        }
        self
    }

    pub fn eager(self) -> Self {
        self.fetch(Fetch::Eager)
    }

    /// Create a non-unique index on this column
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Create a unique index on this column
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_override(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn role(&self) -> &FieldRole {
        &self.role
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.role, FieldRole::Identifier)
    }

    pub fn relation(&self) -> Option<&Relation> {
        match &self.role {
            FieldRole::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// Whether the field maps to a column on its own table
    pub fn is_persisted(&self) -> bool {
        match &self.role {
            FieldRole::Identifier | FieldRole::Column => true,
            FieldRole::Transient => false,
            FieldRole::Relation(relation) => relation.kind.is_owning(),
        }
    }
}

/// Entity-level index over one or more fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: Option<String>,
    pub unique: bool,
    pub fields: Vec<String>,
}

impl IndexDescriptor {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            unique: false,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Complete mapping metadata for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    name: String,
    table: Option<String>,
    fields: Vec<FieldDescriptor>,
    indexes: Vec<IndexDescriptor>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Override the table name
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_override(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identifier(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_identifier())
    }

    /// Fields carrying relation metadata, in declaration order
    pub fn relations(&self) -> impl Iterator<Item = (&FieldDescriptor, &Relation)> {
        self.fields
            .iter()
            .filter_map(|f| f.relation().map(|relation| (f, relation)))
    }
}

/// Registry of entity descriptors, the engine's only source of metadata
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    descriptors: HashMap<String, EntityDescriptor>,
    order: Vec<String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed entity
    pub fn register<T: Entity>(self) -> Self {
        let mut descriptor = T::descriptor();
        if descriptor.name.is_empty() {
            descriptor.name = T::NAME.to_string();
        }
        self.with_descriptor(descriptor)
    }

    /// Register a raw descriptor; a later registration under the same name replaces it
    pub fn with_descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        let name = descriptor.name.clone();
        if self.descriptors.insert(name.clone(), descriptor).is_none() {
            self.order.push(name);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.descriptors.get(name)
    }

    /// Look up a descriptor, failing with a name-resolve error when unknown
    pub fn descriptor(&self, name: &str) -> ModelResult<&EntityDescriptor> {
        self.get(name).ok_or_else(|| {
            ModelError::NameResolve(format!("'{}' is not a registered entity", name))
        })
    }

    /// Descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.order.iter().filter_map(|name| self.descriptors.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Find the entity mapped to a table name
    pub fn by_table(&self, table: &str) -> Option<&EntityDescriptor> {
        self.iter()
            .find(|d| crate::naming::table_name(d).map(|t| t == table).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Person {
        id: Option<i64>,
        username: String,
    }

    impl Entity for Person {
        const NAME: &'static str = "Person";

        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::new(Self::NAME)
                .field(FieldDescriptor::id("id"))
                .field(FieldDescriptor::column("username", FieldType::Text).unique())
        }
    }

    #[test]
    fn test_relation_kind_ownership() {
        assert!(RelationKind::ManyToOne.is_owning());
        assert!(RelationKind::OneToOne { mapped_by: None }.is_owning());
        assert!(!RelationKind::OneToOne { mapped_by: Some("owner".into()) }.is_owning());
        assert!(!RelationKind::OneToMany.is_owning());
        assert!(!RelationKind::ManyToMany.is_owning());
        assert!(RelationKind::ManyToMany.is_collection());
    }

    #[test]
    fn test_cascade_flags() {
        assert!(Cascade::All.stores() && Cascade::All.deletes());
        assert!(Cascade::Store.stores() && !Cascade::Store.deletes());
        assert!(!Cascade::None.stores());
    }

    #[test]
    fn test_field_builders() {
        let field = FieldDescriptor::one_to_one::<Person>("owner")
            .mapped_by("car")
            .cascade(Cascade::All)
            .eager();
        let relation = field.relation().unwrap();
        assert_eq!(relation.target, "Person");
        assert_eq!(relation.cascade, Cascade::All);
        assert_eq!(relation.fetch, Fetch::Eager);
        assert_eq!(
            relation.kind,
            RelationKind::OneToOne { mapped_by: Some("car".to_string()) }
        );
        assert!(!field.is_persisted());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = EntityRegistry::new().register::<Person>();
        assert_eq!(registry.len(), 1);
        assert!(registry.descriptor("Person").is_ok());
        assert!(matches!(
            registry.descriptor("Ghost"),
            Err(ModelError::NameResolve(_))
        ));
        assert_eq!(registry.by_table("person").unwrap().name(), "Person");
    }
}
