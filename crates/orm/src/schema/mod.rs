//! Schema model - tables, columns, foreign keys and indexes
//!
//! The tree is synthesized once from the entity registry (see [`factory`]),
//! persisted as a JSON snapshot per database version, and rendered to DDL on
//! demand. Rendering never mutates the tree.

pub mod factory;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::FieldType;
use crate::error::{ModelError, ModelResult};
use crate::naming::ID_COLUMN;
use crate::security::quote_identifier;

pub use factory::SchemaFactory;

/// SQLite storage class used for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Integer,
    Real,
    Numeric,
    Blob,
    Text,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Numeric => "NUMERIC",
            SqlType::Blob => "BLOB",
            SqlType::Text => "TEXT",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl From<FieldType> for SqlType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer | FieldType::Entity => SqlType::Integer,
            FieldType::Real => SqlType::Real,
            FieldType::Boolean | FieldType::Decimal => SqlType::Numeric,
            FieldType::Blob => SqlType::Blob,
            FieldType::Text
            | FieldType::Enum
            | FieldType::DateTime
            | FieldType::Date
            | FieldType::Uuid => SqlType::Text,
        }
    }
}

/// Which DDL to render for a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlMode {
    Create,
    Drop,
}

/// A column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    /// Trailing column definition text such as `PRIMARY KEY`
    pub extension: Option<String>,
    /// Owning table
    pub table: String,
}

impl Column {
    pub fn new(table: impl Into<String>, name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            extension: None,
            table: table.into(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// `<col> <TYPE> [<EXT>]`
    pub fn definition(&self) -> String {
        match &self.extension {
            Some(extension) => format!(
                "{} {} {}",
                quote_identifier(&self.name),
                self.sql_type,
                extension
            ),
            None => format!("{} {}", quote_identifier(&self.name), self.sql_type),
        }
    }

    /// `ALTER TABLE <table> ADD COLUMN <col> <TYPE> [<EXT>];`
    pub fn add_column_sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote_identifier(&self.table),
            self.definition()
        )
    }
}

/// Foreign key from the owning table's column to another table's column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub column_name: String,
    pub reference_table: String,
    pub reference_column: String,
}

impl Reference {
    pub fn new(
        column_name: impl Into<String>,
        reference_table: impl Into<String>,
        reference_column: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            reference_table: reference_table.into(),
            reference_column: reference_column.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!(
            "FOREIGN KEY({}) REFERENCES {}({})",
            quote_identifier(&self.column_name),
            quote_identifier(&self.reference_table),
            quote_identifier(&self.reference_column)
        )
    }
}

/// Index over one or more columns of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub unique: bool,
    pub table_name: String,
    pub columns: Vec<String>,
}

impl Constraint {
    pub fn new(
        name: impl Into<String>,
        unique: bool,
        table_name: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            unique,
            table_name: table_name.into(),
            columns,
        }
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {}({});",
            if self.unique { "UNIQUE " } else { "" },
            quote_identifier(&self.name),
            quote_identifier(&self.table_name),
            columns.join(", ")
        )
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP INDEX IF EXISTS {};", quote_identifier(&self.name))
    }
}

/// A table node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    columns: Vec<Column>,
    references: Vec<Reference>,
    constraints: Vec<Constraint>,
    /// Visitation sequence number from schema synthesis
    order: u32,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            references: Vec::new(),
            constraints: Vec::new(),
            order: 0,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub(crate) fn set_order(&mut self, order: u32) {
        self.order = order;
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn has_identifier(&self) -> bool {
        self.has_column(ID_COLUMN)
    }

    /// Join tables carry no identifier column
    pub fn is_join_table(&self) -> bool {
        !self.has_identifier()
    }

    /// References pointing at `table`
    pub fn references_to<'a, 'b>(&'a self, table: &'b str) -> impl Iterator<Item = &'a Reference> + 'b
    where
        'a: 'b,
    {
        self.references
            .iter()
            .filter(move |r| r.reference_table == table)
    }

    /// Add a column, failing if the name is already taken
    pub fn add_column(&mut self, column: Column) -> ModelResult<()> {
        if self.has_column(&column.name) {
            return Err(ModelError::SchemaInit(format!(
                "column '{}' is declared twice on table '{}'",
                column.name, self.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn add_reference(&mut self, reference: Reference) {
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> ModelResult<()> {
        if self.constraints.iter().any(|c| c.name == constraint.name) {
            return Err(ModelError::SchemaInit(format!(
                "index '{}' is declared twice on table '{}'",
                constraint.name, self.name
            )));
        }
        self.constraints.push(constraint);
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS ...;`
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(Column::definition).collect();
        parts.extend(self.references.iter().map(Reference::to_sql));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote_identifier(&self.name),
            parts.join(", ")
        )
    }

    /// `DROP TABLE <table>;`
    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE {};", quote_identifier(&self.name))
    }

    /// `DROP TABLE IF EXISTS <table>;`
    pub fn drop_if_exists_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", quote_identifier(&self.name))
    }
}

/// Root of the schema tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Get or create a table node
    pub(crate) fn table_entry(&mut self, name: &str) -> &mut Table {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables sorted by visitation order
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        tables
    }

    /// Tables ordered so that referenced tables precede referencing ones
    ///
    /// Visitation order breaks ties; on a reference cycle the earliest
    /// remaining table is emitted first.
    pub fn creation_order(&self) -> Vec<&Table> {
        let mut remaining = self.tables();
        let mut emitted: HashSet<&str> = HashSet::new();
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|table| {
                table.references.iter().all(|r| {
                    r.reference_table == table.name
                        || emitted.contains(r.reference_table.as_str())
                        || !self.tables.contains_key(&r.reference_table)
                })
            });
            let table = remaining.remove(ready.unwrap_or(0));
            emitted.insert(table.name.as_str());
            ordered.push(table);
        }
        ordered
    }

    /// Every table holding a reference to `table`, with those references
    pub fn referencing(&self, table: &str) -> Vec<(&Table, Vec<&Reference>)> {
        self.tables()
            .into_iter()
            .filter_map(|candidate| {
                let references: Vec<&Reference> = candidate
                    .references
                    .iter()
                    .filter(|r| r.reference_table == table)
                    .collect();
                if references.is_empty() {
                    None
                } else {
                    Some((candidate, references))
                }
            })
            .collect()
    }

    /// The join table for a pair, whichever ordering created it
    pub fn join_table(&self, a: &str, b: &str) -> Option<&Table> {
        [format!("{}_{}", a, b), format!("{}_{}", b, a)]
            .iter()
            .filter_map(|name| self.tables.get(name))
            .find(|t| t.is_join_table() && t.references_to(a).next().is_some() && t.references_to(b).next().is_some())
    }

    /// Render the whole schema
    pub fn to_ddl(&self, mode: DdlMode) -> Vec<String> {
        match mode {
            DdlMode::Create => {
                let ordered = self.creation_order();
                let mut statements: Vec<String> = ordered.iter().map(|t| t.create_sql()).collect();
                for table in &ordered {
                    statements.extend(table.constraints.iter().map(Constraint::create_sql));
                }
                statements
            }
            DdlMode::Drop => self
                .creation_order()
                .into_iter()
                .rev()
                .map(Table::drop_sql)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_and_group() -> Schema {
        let mut schema = Schema::new();
        {
            let group = schema.table_entry("group");
            group.set_order(1);
            group
                .add_column(Column::new("group", "_id", SqlType::Integer).with_extension("PRIMARY KEY"))
                .unwrap();
            group.add_column(Column::new("group", "person_id", SqlType::Integer)).unwrap();
            group.add_reference(Reference::new("person_id", "person", "_id"));
        }
        {
            let person = schema.table_entry("person");
            person.set_order(2);
            person
                .add_column(Column::new("person", "_id", SqlType::Integer).with_extension("PRIMARY KEY"))
                .unwrap();
            person.add_column(Column::new("person", "username", SqlType::Text)).unwrap();
            person
                .add_constraint(Constraint::new(
                    "idx_person_username",
                    true,
                    "person",
                    vec!["username".to_string()],
                ))
                .unwrap();
        }
        schema
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(SqlType::from(FieldType::Integer), SqlType::Integer);
        assert_eq!(SqlType::from(FieldType::Entity), SqlType::Integer);
        assert_eq!(SqlType::from(FieldType::Real), SqlType::Real);
        assert_eq!(SqlType::from(FieldType::Boolean), SqlType::Numeric);
        assert_eq!(SqlType::from(FieldType::Decimal), SqlType::Numeric);
        assert_eq!(SqlType::from(FieldType::Blob), SqlType::Blob);
        assert_eq!(SqlType::from(FieldType::DateTime), SqlType::Text);
    }

    #[test]
    fn test_table_ddl() {
        let schema = person_and_group();
        let group = schema.table("group").unwrap();
        assert_eq!(
            group.create_sql(),
            "CREATE TABLE IF NOT EXISTS \"group\" (_id INTEGER PRIMARY KEY, person_id INTEGER, FOREIGN KEY(person_id) REFERENCES person(_id));"
        );
        assert_eq!(group.drop_sql(), "DROP TABLE \"group\";");
    }

    #[test]
    fn test_creation_order_respects_references() {
        let schema = person_and_group();
        let visited: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(visited, vec!["group", "person"]);

        let created: Vec<&str> = schema.creation_order().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(created, vec!["person", "group"]);
    }

    #[test]
    fn test_ddl_rendering_is_pure() {
        let schema = person_and_group();
        let snapshot = schema.clone();

        let create = schema.to_ddl(DdlMode::Create);
        let drop = schema.to_ddl(DdlMode::Drop);
        assert_eq!(schema, snapshot);
        assert_eq!(schema.to_ddl(DdlMode::Create), create);
        assert_eq!(schema.to_ddl(DdlMode::Drop), drop);

        assert_eq!(create.len(), 3);
        assert_eq!(create[2], "CREATE UNIQUE INDEX idx_person_username ON person(username);");
        assert_eq!(drop, vec!["DROP TABLE \"group\";", "DROP TABLE person;"]);
    }

    #[test]
    fn test_add_column_collision() {
        let mut table = Table::new("person");
        table.add_column(Column::new("person", "name", SqlType::Text)).unwrap();
        let err = table.add_column(Column::new("person", "name", SqlType::Text));
        assert!(matches!(err, Err(ModelError::SchemaInit(_))));
    }

    #[test]
    fn test_alter_sql() {
        let column = Column::new("person", "nickname", SqlType::Text);
        assert_eq!(column.add_column_sql(), "ALTER TABLE person ADD COLUMN nickname TEXT;");
    }

    #[test]
    fn test_referencing_tables() {
        let schema = person_and_group();
        let referencing = schema.referencing("person");
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].0.name, "group");
        assert_eq!(referencing[0].1[0].column_name, "person_id");
        assert!(schema.referencing("group").is_empty());
    }

    #[test]
    fn test_referencing_outlives_table_name() {
        let mut schema = person_and_group();
        {
            let message = schema.table_entry("message");
            for column in ["sender_id", "receiver_id"] {
                message.add_column(Column::new("message", column, SqlType::Integer)).unwrap();
                message.add_reference(Reference::new(column, "person", "_id"));
            }
        }
        let referencing = {
            let name = String::from("person");
            schema.referencing(&name)
        };
        let message = referencing.iter().find(|(t, _)| t.name == "message").unwrap();
        let columns: Vec<&str> = message.1.iter().map(|r| r.column_name.as_str()).collect();
        assert_eq!(columns, vec!["sender_id", "receiver_id"]);
    }
}
