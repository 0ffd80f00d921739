//! Query execution and entity materialization

use std::collections::HashSet;

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use super::{EngineContext, Transaction};
use crate::backends::DatabaseRow;
use crate::converter::{EntityConverter, ResultSet};
use crate::entity::{EntityDescriptor, Fetch};
use crate::error::ModelResult;
use crate::query::{Association, JoinKeys, Query};

pub struct QueryTransaction<'a> {
    ctx: EngineContext<'a>,
}

impl<'a> QueryTransaction<'a> {
    pub fn new(ctx: EngineContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run `query` and materialize one object per distinct root row
    ///
    /// Rows failing conversion are logged and skipped.
    pub fn find(&self, tx: &mut Transaction<'_>, entity: &str, query: &Query) -> ModelResult<Vec<Map<String, JsonValue>>> {
        let descriptor = self.ctx.descriptor(entity)?;
        let table = self.ctx.table_name(descriptor)?;
        let rows = tx.executor().query(query.sql(), query.args())?;
        let joined = joined_tables(query.sql(), &table);

        let mut seen = HashSet::new();
        let mut objects = Vec::with_capacity(rows.len());
        let mut chain = Vec::new();
        for row in &rows {
            let result = EntityConverter::to_result_set(descriptor, row, None);
            if let Some(id) = result.id() {
                if !seen.insert(id) {
                    continue;
                }
            }
            match self.materialize(tx, descriptor, &result, &joined, &mut chain) {
                Ok(object) => objects.push(object),
                Err(e) if e.is_row_local() => warn!("Skipping {} row: {}", entity, e),
                Err(e) => return Err(e),
            }
        }

        debug!("Materialized {} {} from {} rows", objects.len(), entity, rows.len());
        Ok(objects)
    }

    /// Run `query` and hand each row to `transformer` as a raw column bag
    pub fn find_raw<R, F>(&self, tx: &mut Transaction<'_>, query: &Query, mut transformer: F) -> ModelResult<Vec<R>>
    where
        F: FnMut(ResultSet) -> R,
    {
        let rows = tx.executor().query(query.sql(), query.args())?;
        Ok(rows.iter().map(|row| transformer(ResultSet::from_row(row))).collect())
    }

    /// First column of the first row as a count
    pub fn count(&self, tx: &mut Transaction<'_>, query: &Query) -> ModelResult<u64> {
        let rows = tx.executor().query(query.sql(), query.args())?;
        Ok(rows
            .first()
            .and_then(|row| row.get_by_index(0).ok())
            .and_then(|value| value.as_i64())
            .map_or(0, |count| count.max(0) as u64))
    }

    /// Build an object from a result set and populate its relations
    ///
    /// `chain` holds the entities being materialized above this one; meeting
    /// one of them again yields an identifier-only stub.
    fn materialize(
        &self,
        tx: &mut Transaction<'_>,
        descriptor: &'a EntityDescriptor,
        result: &ResultSet,
        joined: &HashSet<String>,
        chain: &mut Vec<(String, i64)>,
    ) -> ModelResult<Map<String, JsonValue>> {
        let mut object = EntityConverter::to_entity_map(descriptor, result)?;
        let id = result.id();
        if let Some(id) = id {
            chain.push((descriptor.name().to_string(), id));
        }
        let populated = self.populate_relations(tx, descriptor, result, id, joined, chain, &mut object);
        if id.is_some() {
            chain.pop();
        }
        populated.map(|_| object)
    }

    #[allow(clippy::too_many_arguments)]
    fn populate_relations(
        &self,
        tx: &mut Transaction<'_>,
        descriptor: &'a EntityDescriptor,
        result: &ResultSet,
        id: Option<i64>,
        joined: &HashSet<String>,
        chain: &mut Vec<(String, i64)>,
        object: &mut Map<String, JsonValue>,
    ) -> ModelResult<()> {
        let associations = self.ctx.associations();

        for (field, relation) in descriptor.relations() {
            let association = associations.association(descriptor, field.name())?;
            let eager = relation.fetch == Fetch::Eager || joined.contains(&association.target_table);
            let collection = relation.kind.is_collection();

            let value = match &association.keys {
                JoinKeys::Owning { column } => {
                    let foreign = result.value(column).and_then(|v| v.as_i64()).filter(|fk| *fk > 0);
                    match foreign {
                        None => JsonValue::Null,
                        Some(fk) if eager && !in_chain(chain, association.target, fk) => {
                            let query = self.ctx.processor().create_query(association.target.name(), |_, p| {
                                p.eq("id", fk);
                            })?;
                            self.load(tx, &association, &query, joined, chain)?
                                .into_iter()
                                .next()
                                .unwrap_or(JsonValue::Null)
                        }
                        Some(fk) => EntityConverter::stub(association.target, fk),
                    }
                }
                _ if !eager => empty(collection),
                JoinKeys::Inverse { column } => match id {
                    Some(id) => {
                        let clause = format!("this.{} = ?", column);
                        let query = self.ctx.processor().create_query(association.target.name(), |_, p| {
                            p.raw(&clause, [id]);
                        })?;
                        collect(self.load(tx, &association, &query, joined, chain)?, collection)
                    }
                    None => empty(collection),
                },
                JoinKeys::JoinTable {
                    table,
                    parent_column,
                    target_column,
                } => match id {
                    Some(id) => {
                        let query = self.ctx.processor().many_to_many_query(
                            association.target,
                            table,
                            parent_column,
                            target_column,
                            id,
                        )?;
                        collect(self.load(tx, &association, &query, joined, chain)?, collection)
                    }
                    None => empty(collection),
                },
            };
            object.insert(field.name().to_string(), value);
        }
        Ok(())
    }

    /// Run a sub-query for an association and materialize its rows
    fn load(
        &self,
        tx: &mut Transaction<'_>,
        association: &Association<'a>,
        query: &Query,
        joined: &HashSet<String>,
        chain: &mut Vec<(String, i64)>,
    ) -> ModelResult<Vec<JsonValue>> {
        let target = association.target;
        let rows: Vec<DatabaseRow> = tx.executor().query(query.sql(), query.args())?;
        let mut seen = HashSet::new();
        let mut values = Vec::with_capacity(rows.len());

        for row in &rows {
            let result = EntityConverter::to_result_set(target, row, None);
            match result.id() {
                Some(id) if !seen.insert(id) => continue,
                Some(id) if in_chain(chain, target, id) => values.push(EntityConverter::stub(target, id)),
                _ => {
                    let object = self.materialize(tx, target, &result, joined, chain)?;
                    values.push(JsonValue::Object(object));
                }
            }
        }
        Ok(values)
    }
}

fn in_chain(chain: &[(String, i64)], descriptor: &EntityDescriptor, id: i64) -> bool {
    chain.iter().any(|(name, seen)| name == descriptor.name() && *seen == id)
}

fn empty(collection: bool) -> JsonValue {
    if collection {
        JsonValue::Array(Vec::new())
    } else {
        JsonValue::Null
    }
}

fn collect(values: Vec<JsonValue>, collection: bool) -> JsonValue {
    if collection {
        JsonValue::Array(values)
    } else {
        values.into_iter().next().unwrap_or(JsonValue::Null)
    }
}

/// Tables named after `FROM` or a `JOIN` in a rendered query, besides the root
fn joined_tables(sql: &str, root_table: &str) -> HashSet<String> {
    let words: Vec<&str> = sql
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .collect();
    words
        .windows(2)
        .filter(|pair| pair[0].eq_ignore_ascii_case("FROM") || pair[0].eq_ignore_ascii_case("JOIN"))
        .map(|pair| pair[1])
        .filter(|table| *table != root_table)
        .map(str::to_string)
        .collect()
}
