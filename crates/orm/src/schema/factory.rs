//! Schema synthesis from entity descriptors
//!
//! Depth-first walk over every registered entity. Each visit stamps the
//! table with the next sequence number, so tables reached later carry a
//! higher `order`. Checks that need the whole graph (inverse one-to-one
//! targets, unidirectional one-to-many keys) run after the walk.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{Column, Constraint, Reference, Schema, SqlType};
use crate::entity::{EntityDescriptor, EntityRegistry, FieldDescriptor, FieldRole, RelationKind};
use crate::error::{ModelError, ModelResult};
use crate::naming::{self, ID_COLUMN};
use crate::security::validate_identifier;

/// Builds a [`Schema`] from an [`EntityRegistry`]
pub struct SchemaFactory<'a> {
    registry: &'a EntityRegistry,
}

/// Per-build state, discarded once the schema is returned
#[derive(Default)]
struct BuildContext {
    schema: Schema,
    order: u32,
    visited: HashSet<String>,
    table_owners: HashMap<String, String>,
    join_tables: HashSet<String>,
    inverse_collections: Vec<InverseCollection>,
    mapped_by: Vec<MappedBy>,
}

impl BuildContext {
    fn next_order(&mut self) -> u32 {
        self.order += 1;
        self.order
    }
}

/// A one-to-many whose foreign key must exist on the far table
struct InverseCollection {
    owner_table: String,
    target_table: String,
}

/// An inverse one-to-one waiting for its owning field to be checked
struct MappedBy {
    entity: String,
    field: String,
    target: String,
    mapped_by: String,
}

fn schema_error(err: ModelError) -> ModelError {
    match err {
        ModelError::NameResolve(message) => ModelError::SchemaInit(message),
        other => other,
    }
}

impl<'a> SchemaFactory<'a> {
    pub fn new(registry: &'a EntityRegistry) -> Self {
        Self { registry }
    }

    /// Synthesize the schema for every registered entity
    pub fn build(&self) -> ModelResult<Schema> {
        let mut ctx = BuildContext::default();
        for descriptor in self.registry.iter() {
            self.visit(descriptor, &mut ctx)?;
        }
        self.resolve_mapped_by(&ctx)?;
        self.resolve_inverse_collections(&mut ctx)?;

        debug!(
            "Built schema with {} tables ({} join tables)",
            ctx.schema.len(),
            ctx.join_tables.len()
        );
        Ok(ctx.schema)
    }

    fn target(&self, entity: &str, field: &FieldDescriptor, target: &str) -> ModelResult<&'a EntityDescriptor> {
        self.registry.get(target).ok_or_else(|| {
            ModelError::SchemaInit(format!(
                "{}.{} refers to unregistered entity '{}'",
                entity,
                field.name(),
                target
            ))
        })
    }

    fn visit(&self, descriptor: &EntityDescriptor, ctx: &mut BuildContext) -> ModelResult<String> {
        let table = naming::table_name(descriptor).map_err(schema_error)?;

        match ctx.table_owners.get(&table) {
            Some(owner) if owner != descriptor.name() => {
                return Err(ModelError::SchemaInit(format!(
                    "entities '{}' and '{}' both map to table '{}'",
                    owner,
                    descriptor.name(),
                    table
                )));
            }
            _ => {}
        }
        if ctx.join_tables.contains(&table) {
            return Err(ModelError::SchemaInit(format!(
                "table '{}' of entity '{}' collides with a join table",
                table,
                descriptor.name()
            )));
        }

        let order = ctx.next_order();
        ctx.schema.table_entry(&table).set_order(order);
        if !ctx.visited.insert(descriptor.name().to_string()) {
            return Ok(table);
        }
        ctx.table_owners
            .insert(table.clone(), descriptor.name().to_string());

        validate_identifier(&table)?;
        naming::id_column_name(descriptor).map_err(schema_error)?;

        for field in descriptor.fields() {
            match field.role() {
                FieldRole::Identifier => {
                    self.add_column(
                        ctx,
                        &table,
                        Column::new(&table, ID_COLUMN, SqlType::Integer).with_extension("PRIMARY KEY"),
                    )?;
                }
                FieldRole::Column => {
                    let column = naming::column_name(field);
                    self.add_column(ctx, &table, Column::new(&table, &column, field.field_type().into()))?;
                    self.add_field_index(ctx, &table, field, &column)?;
                }
                FieldRole::Transient => {}
                FieldRole::Relation(relation) => {
                    let target = self.target(descriptor.name(), field, &relation.target)?;
                    let target_table = naming::table_name(target).map_err(schema_error)?;

                    match &relation.kind {
                        RelationKind::ManyToOne | RelationKind::OneToOne { mapped_by: None } => {
                            let column = naming::column_name(field);
                            self.add_column(ctx, &table, Column::new(&table, &column, SqlType::Integer))?;
                            if let Some(node) = ctx.schema.table_mut(&table) {
                                node.add_reference(Reference::new(&column, &target_table, ID_COLUMN));
                            }
                            self.add_field_index(ctx, &table, field, &column)?;
                            self.visit(target, ctx)?;
                        }
                        RelationKind::OneToOne { mapped_by: Some(mapped_by) } => {
                            ctx.mapped_by.push(MappedBy {
                                entity: descriptor.name().to_string(),
                                field: field.name().to_string(),
                                target: relation.target.clone(),
                                mapped_by: mapped_by.clone(),
                            });
                            self.visit(target, ctx)?;
                        }
                        RelationKind::OneToMany => {
                            ctx.inverse_collections.push(InverseCollection {
                                owner_table: table.clone(),
                                target_table: target_table.clone(),
                            });
                            self.visit(target, ctx)?;
                        }
                        RelationKind::ManyToMany => {
                            if target_table == table {
                                return Err(ModelError::SchemaInit(format!(
                                    "many-to-many {}.{} cannot target its own table '{}'",
                                    descriptor.name(),
                                    field.name(),
                                    table
                                )));
                            }
                            self.join_table(ctx, &table, &target_table)?;
                            self.visit(target, ctx)?;
                        }
                    }
                }
            }
        }

        for index in descriptor.indexes() {
            let mut columns = Vec::with_capacity(index.fields.len());
            for name in &index.fields {
                let field = descriptor.get_field(name).filter(|f| f.is_persisted()).ok_or_else(|| {
                    ModelError::SchemaInit(format!(
                        "index on '{}' names unknown or unpersisted field '{}'",
                        table, name
                    ))
                })?;
                columns.push(naming::column_name(field));
            }
            let name = index
                .name
                .clone()
                .unwrap_or_else(|| format!("idx_{}_{}", table, columns.join("_")));
            self.add_constraint(ctx, &table, Constraint::new(name, index.unique, &table, columns))?;
        }

        Ok(table)
    }

    fn add_column(&self, ctx: &mut BuildContext, table: &str, column: Column) -> ModelResult<()> {
        validate_identifier(&column.name)?;
        match ctx.schema.table_mut(table) {
            Some(node) => node.add_column(column),
            None => Err(ModelError::SchemaInit(format!("table '{}' is not part of the schema", table))),
        }
    }

    fn add_constraint(&self, ctx: &mut BuildContext, table: &str, constraint: Constraint) -> ModelResult<()> {
        validate_identifier(&constraint.name)?;
        match ctx.schema.table_mut(table) {
            Some(node) => node.add_constraint(constraint),
            None => Err(ModelError::SchemaInit(format!("table '{}' is not part of the schema", table))),
        }
    }

    fn add_field_index(
        &self,
        ctx: &mut BuildContext,
        table: &str,
        field: &FieldDescriptor,
        column: &str,
    ) -> ModelResult<()> {
        if !field.is_indexed() && !field.is_unique() {
            return Ok(());
        }
        let constraint = Constraint::new(
            format!("idx_{}_{}", table, column),
            field.is_unique(),
            table,
            vec![column.to_string()],
        );
        self.add_constraint(ctx, table, constraint)
    }

    /// Create the join table for a pair, or reuse the one the other side made
    fn join_table(&self, ctx: &mut BuildContext, table: &str, target_table: &str) -> ModelResult<()> {
        let forward = format!("{}_{}", table, target_table);
        let reverse = format!("{}_{}", target_table, table);
        if ctx.join_tables.contains(&forward) || ctx.join_tables.contains(&reverse) {
            return Ok(());
        }
        if ctx.table_owners.contains_key(&forward) {
            return Err(ModelError::SchemaInit(format!(
                "join table '{}' collides with an entity table",
                forward
            )));
        }

        validate_identifier(&forward)?;
        let order = ctx.next_order();
        let join = ctx.schema.table_entry(&forward);
        join.set_order(order);
        for side in [table, target_table] {
            let column = naming::foreign_key_column(side);
            join.add_column(Column::new(&forward, &column, SqlType::Integer))?;
            join.add_reference(Reference::new(&column, side, ID_COLUMN));
        }
        ctx.join_tables.insert(forward.clone());
        debug!("Created join table '{}'", forward);
        Ok(())
    }

    fn resolve_mapped_by(&self, ctx: &BuildContext) -> ModelResult<()> {
        for pending in &ctx.mapped_by {
            let target = self.registry.descriptor(&pending.target).map_err(schema_error)?;
            let owning = target
                .get_field(&pending.mapped_by)
                .and_then(FieldDescriptor::relation)
                .filter(|relation| relation.kind.is_owning() && relation.target == pending.entity);
            if owning.is_none() {
                return Err(ModelError::SchemaInit(format!(
                    "{}.{} is mapped by '{}', which is not an owning relation on '{}'",
                    pending.entity, pending.field, pending.mapped_by, pending.target
                )));
            }
        }
        Ok(())
    }

    fn resolve_inverse_collections(&self, ctx: &mut BuildContext) -> ModelResult<()> {
        for pending in &ctx.inverse_collections {
            let target = match ctx.schema.table_mut(&pending.target_table) {
                Some(target) => target,
                None => continue,
            };
            if target.references_to(&pending.owner_table).next().is_some() {
                continue;
            }
            let column = naming::foreign_key_column(&pending.owner_table);
            validate_identifier(&column)?;
            target.add_column(Column::new(&pending.target_table, &column, SqlType::Integer))?;
            target.add_reference(Reference::new(&column, &pending.owner_table, ID_COLUMN));
            debug!(
                "Added back-reference column '{}' to '{}'",
                column, pending.target_table
            );
        }
        Ok(())
    }
}
