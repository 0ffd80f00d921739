//! Association resolution against the schema
//!
//! Maps a relation field to the columns that link the two tables, and
//! renders the JOIN clauses for one join-tree node.

use super::alias::AliasContext;
use super::joins::Root;
use crate::entity::{EntityDescriptor, EntityRegistry, FieldDescriptor, Relation, RelationKind};
use crate::error::{ModelError, ModelResult};
use crate::naming::{self, ID_COLUMN};
use crate::schema::{Reference, Schema};
use crate::security::quote_identifier;

/// Columns linking a parent table to a related table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKeys {
    /// `parent.<column>` holds the target identifier
    Owning { column: String },
    /// `target.<column>` holds the parent identifier
    Inverse { column: String },
    /// Pairs live in a join table
    JoinTable {
        table: String,
        parent_column: String,
        target_column: String,
    },
}

/// A relation field resolved against the schema
#[derive(Debug, Clone)]
pub struct Association<'a> {
    pub field: &'a FieldDescriptor,
    pub relation: &'a Relation,
    pub target: &'a EntityDescriptor,
    pub target_table: String,
    pub keys: JoinKeys,
}

/// Result of resolving one join node
#[derive(Debug, Clone)]
pub struct JoinResolution<'a> {
    pub target: &'a EntityDescriptor,
    pub table: String,
    pub alias: String,
    pub clauses: Vec<String>,
}

pub struct AssociationProcessor<'a> {
    schema: &'a Schema,
    registry: &'a EntityRegistry,
}

impl<'a> AssociationProcessor<'a> {
    pub fn new(schema: &'a Schema, registry: &'a EntityRegistry) -> Self {
        Self { schema, registry }
    }

    /// Resolve the relation field `field` of `parent`
    pub fn association(&self, parent: &'a EntityDescriptor, field: &str) -> ModelResult<Association<'a>> {
        let descriptor = parent.get_field(field).ok_or_else(|| {
            ModelError::QueryBuild(format!("'{}' has no field '{}'", parent.name(), field))
        })?;
        let relation = descriptor.relation().ok_or_else(|| {
            ModelError::QueryBuild(format!("{}.{} is not an association", parent.name(), field))
        })?;
        let target = self
            .registry
            .descriptor(&relation.target)
            .map_err(|e| ModelError::QueryBuild(e.to_string()))?;
        let parent_table = naming::table_name(parent).map_err(|e| ModelError::QueryBuild(e.to_string()))?;
        let target_table = naming::table_name(target).map_err(|e| ModelError::QueryBuild(e.to_string()))?;

        let keys = match &relation.kind {
            RelationKind::ManyToOne | RelationKind::OneToOne { mapped_by: None } => {
                let column = naming::column_name(descriptor);
                self.require_column(&parent_table, &column)?;
                JoinKeys::Owning { column }
            }
            RelationKind::OneToOne { mapped_by: Some(mapped_by) } => {
                let owning = target.get_field(mapped_by).ok_or_else(|| {
                    ModelError::IllegalJoin(format!(
                        "'{}' has no field '{}' mapping {}.{}",
                        target.name(),
                        mapped_by,
                        parent.name(),
                        field
                    ))
                })?;
                let column = naming::column_name(owning);
                self.require_column(&target_table, &column)?;
                JoinKeys::Inverse { column }
            }
            RelationKind::OneToMany => {
                let candidates: Vec<&Reference> = self
                    .schema
                    .table(&target_table)
                    .map(|t| t.references_to(&parent_table).collect())
                    .unwrap_or_default();
                let column = match candidates.as_slice() {
                    [reference] => reference.column_name.clone(),
                    [] => {
                        return Err(ModelError::IllegalJoin(format!(
                            "no column on '{}' references '{}'",
                            target_table, parent_table
                        )))
                    }
                    _ => {
                        return Err(ModelError::IllegalJoin(format!(
                            "{}.{} is ambiguous: '{}' references '{}' through {} columns",
                            parent.name(),
                            field,
                            target_table,
                            parent_table,
                            candidates.len()
                        )))
                    }
                };
                JoinKeys::Inverse { column }
            }
            RelationKind::ManyToMany => {
                let join = self
                    .schema
                    .join_table(&parent_table, &target_table)
                    .ok_or_else(|| {
                        ModelError::IllegalJoin(format!(
                            "no join table between '{}' and '{}'",
                            parent_table, target_table
                        ))
                    })?;
                let column_to = |table: &str| {
                    join.references_to(table)
                        .next()
                        .map(|r| r.column_name.clone())
                        .ok_or_else(|| {
                            ModelError::IllegalJoin(format!(
                                "join table '{}' has no reference to '{}'",
                                join.name, table
                            ))
                        })
                };
                JoinKeys::JoinTable {
                    table: join.name.clone(),
                    parent_column: column_to(&parent_table)?,
                    target_column: column_to(&target_table)?,
                }
            }
        };

        Ok(Association {
            field: descriptor,
            relation,
            target,
            target_table,
            keys,
        })
    }

    fn require_column(&self, table: &str, column: &str) -> ModelResult<()> {
        match self.schema.table(table) {
            Some(t) if t.has_column(column) => Ok(()),
            _ => Err(ModelError::IllegalJoin(format!(
                "column '{}' not found on table '{}'",
                column, table
            ))),
        }
    }

    /// Render the JOIN clauses for `node`, a child of the node aliased `parent_alias`
    pub fn resolve(
        &self,
        parent: &'a EntityDescriptor,
        parent_alias: &str,
        node: &Root,
        ctx: &mut AliasContext,
    ) -> ModelResult<JoinResolution<'a>> {
        let association = self.association(parent, node.path())?;
        let table = association.target_table.clone();
        let alias = ctx.assign(&table, node.alias_name())?;
        let mode = node.mode();
        let quoted = quote_identifier(&table);

        let clauses = match &association.keys {
            JoinKeys::Owning { column } => vec![format!(
                "{} {} {} ON {}.{} = {}.{}",
                mode,
                quoted,
                alias,
                alias,
                ID_COLUMN,
                parent_alias,
                quote_identifier(column)
            )],
            JoinKeys::Inverse { column } => vec![format!(
                "{} {} {} ON {}.{} = {}.{}",
                mode,
                quoted,
                alias,
                parent_alias,
                ID_COLUMN,
                alias,
                quote_identifier(column)
            )],
            JoinKeys::JoinTable {
                table: join_table,
                parent_column,
                target_column,
            } => {
                let join_alias = ctx.assign(join_table, None)?;
                vec![
                    format!(
                        "{} {} {} ON {}.{} = {}.{}",
                        mode,
                        quote_identifier(join_table),
                        join_alias,
                        join_alias,
                        quote_identifier(parent_column),
                        parent_alias,
                        ID_COLUMN
                    ),
                    format!(
                        "{} {} {} ON {}.{} = {}.{}",
                        mode,
                        quoted,
                        alias,
                        alias,
                        ID_COLUMN,
                        join_alias,
                        quote_identifier(target_column)
                    ),
                ]
            }
        };

        Ok(JoinResolution {
            target: association.target,
            table,
            alias,
            clauses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldType;
    use crate::schema::SchemaFactory;

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with_descriptor(
                EntityDescriptor::new("Person")
                    .field(FieldDescriptor::id("id"))
                    .field(FieldDescriptor::column("name", FieldType::Text))
                    .field(FieldDescriptor::relation_to("groups", "Group", RelationKind::OneToMany))
                    .field(FieldDescriptor::relation_to("rooms", "ClassRoom", RelationKind::ManyToMany)),
            )
            .with_descriptor(
                EntityDescriptor::new("Group")
                    .field(FieldDescriptor::id("id"))
                    .field(FieldDescriptor::relation_to("person", "Person", RelationKind::ManyToOne)),
            )
            .with_descriptor(EntityDescriptor::new("ClassRoom").field(FieldDescriptor::id("id")))
    }

    #[test]
    fn test_owning_and_inverse_joins() {
        let registry = registry();
        let schema = SchemaFactory::new(&registry).build().unwrap();
        let processor = AssociationProcessor::new(&schema, &registry);
        let mut ctx = AliasContext::new();
        ctx.assign("group", None).unwrap();

        let group = registry.get("Group").unwrap();
        let mut root = Root::new();
        root.join("person");
        let resolution = processor.resolve(group, "g", &root.children()[0], &mut ctx).unwrap();
        assert_eq!(resolution.clauses, vec!["JOIN person p ON p._id = g.person_id"]);

        let person = registry.get("Person").unwrap();
        let mut root = Root::new();
        root.left_join("groups");
        let resolution = processor.resolve(person, "p", &root.children()[0], &mut ctx).unwrap();
        assert_eq!(resolution.clauses, vec!["LEFT JOIN \"group\" g1 ON p._id = g1.person_id"]);
    }

    #[test]
    fn test_many_to_many_join() {
        let registry = registry();
        let schema = SchemaFactory::new(&registry).build().unwrap();
        let processor = AssociationProcessor::new(&schema, &registry);
        let mut ctx = AliasContext::new();
        ctx.assign("person", None).unwrap();

        let person = registry.get("Person").unwrap();
        let mut root = Root::new();
        root.join("rooms").alias("r");
        let resolution = processor.resolve(person, "p", &root.children()[0], &mut ctx).unwrap();
        assert_eq!(
            resolution.clauses,
            vec![
                "JOIN person_class_room pcr ON pcr.person_id = p._id",
                "JOIN class_room r ON r._id = pcr.class_room_id",
            ]
        );
    }

    #[test]
    fn test_unknown_association() {
        let registry = registry();
        let schema = SchemaFactory::new(&registry).build().unwrap();
        let processor = AssociationProcessor::new(&schema, &registry);
        let person = registry.get("Person").unwrap();

        assert!(matches!(
            processor.association(person, "missing"),
            Err(ModelError::QueryBuild(_))
        ));
        assert!(matches!(
            processor.association(person, "name"),
            Err(ModelError::QueryBuild(_))
        ));
    }

    #[test]
    fn test_missing_reverse_column_is_illegal_join() {
        let registry = registry();
        let mut schema = Schema::new();
        schema.table_entry("person");
        schema.table_entry("group");
        let processor = AssociationProcessor::new(&schema, &registry);
        let person = registry.get("Person").unwrap();
        assert!(matches!(
            processor.association(person, "groups"),
            Err(ModelError::IllegalJoin(_))
        ));
    }

    #[test]
    fn test_collection_with_two_back_references_is_ambiguous() {
        use crate::schema::{Column, SqlType};

        let registry = registry();
        let mut schema = Schema::new();
        schema.table_entry("person");
        let group = schema.table_entry("group");
        for column in ["owner_id", "person_id"] {
            group.add_column(Column::new("group", column, SqlType::Integer)).unwrap();
            group.add_reference(Reference::new(column, "person", "_id"));
        }
        let processor = AssociationProcessor::new(&schema, &registry);
        let person = registry.get("Person").unwrap();

        let err = processor.association(person, "groups").unwrap_err();
        assert!(matches!(err, ModelError::IllegalJoin(ref message) if message.contains("ambiguous")));
    }
}
