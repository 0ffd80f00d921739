//! Cascading delete
//!
//! Runs in two phases. Collection walks the references with SELECTs only
//! and schedules every row that transitively references the deleted
//! identifiers, each row exactly once. Removal then clears the join tables
//! and issues one DELETE per scheduled table, referencing tables first.
//!
//! Many-to-many counterparts are only scheduled when the deleting side
//! cascades deletes, and only once no surviving row still links to them.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use super::{id_args, placeholders, EngineContext, Transaction};
use crate::entity::RelationKind;
use crate::error::ModelResult;
use crate::naming::ID_COLUMN;
use crate::schema::{Reference, Table};
use crate::security::quote_identifier;

type Batch = (String, Vec<i64>);

pub struct DeleteTransaction<'a> {
    ctx: EngineContext<'a>,
    /// Rows scheduled for deletion in the current call, per table
    doomed: HashMap<String, HashSet<i64>>,
    /// Tables in the order their first row was scheduled
    order: Vec<String>,
    /// Many-to-many counterparts waiting on the orphan check
    candidates: HashMap<String, HashSet<i64>>,
}

impl<'a> DeleteTransaction<'a> {
    pub fn new(ctx: EngineContext<'a>) -> Self {
        Self {
            ctx,
            doomed: HashMap::new(),
            order: Vec::new(),
            candidates: HashMap::new(),
        }
    }

    /// Delete `ids` of `entity` with their cascade, returning the number of
    /// root rows removed
    pub fn delete(&mut self, tx: &mut Transaction<'_>, entity: &str, ids: &[i64]) -> ModelResult<usize> {
        let descriptor = self.ctx.descriptor(entity)?;
        let table = self.ctx.table_name(descriptor)?;

        self.reset();
        let result = self.run(tx, &table, ids);
        self.reset();
        result
    }

    fn reset(&mut self) {
        self.doomed.clear();
        self.order.clear();
        self.candidates.clear();
    }

    fn run(&mut self, tx: &mut Transaction<'_>, table: &str, ids: &[i64]) -> ModelResult<usize> {
        let ids = unique(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let roots = select_ids(tx, table, ID_COLUMN, &ids)?;
        if roots.is_empty() {
            return Ok(0);
        }

        let mut queue = VecDeque::new();
        self.schedule(table, roots.clone(), &mut queue);
        loop {
            self.collect(tx, &mut queue)?;
            let orphans = self.take_orphans(tx)?;
            if orphans.is_empty() {
                break;
            }
            for (table, ids) in orphans {
                self.schedule(&table, ids, &mut queue);
            }
        }

        self.remove(tx)?;
        debug!("Deleted {} root rows from {}", roots.len(), table);
        Ok(roots.len())
    }

    /// Mark `ids` of `table` for deletion, queueing the ones not seen before
    fn schedule(&mut self, table: &str, ids: Vec<i64>, queue: &mut VecDeque<Batch>) {
        let doomed = self.doomed.entry(table.to_string()).or_default();
        let fresh: Vec<i64> = ids.into_iter().filter(|id| doomed.insert(*id)).collect();
        if fresh.is_empty() {
            return;
        }
        if !self.order.iter().any(|t| t == table) {
            self.order.push(table.to_string());
        }
        queue.push_back((table.to_string(), fresh));
    }

    /// Drain the queue, scheduling every row that references a queued row
    fn collect(&mut self, tx: &mut Transaction<'_>, queue: &mut VecDeque<Batch>) -> ModelResult<()> {
        let schema = self.ctx.schema;
        while let Some((table, batch)) = queue.pop_front() {
            for (referencing, references) in schema.referencing(&table) {
                if referencing.is_join_table() {
                    for reference in references {
                        self.collect_counterparts(tx, &table, referencing, reference, &batch)?;
                    }
                    continue;
                }
                // all columns of one table pointing here form a single batch
                let mut children = Vec::new();
                for reference in references {
                    children.extend(select_ids(tx, &referencing.name, &reference.column_name, &batch)?);
                }
                self.schedule(&referencing.name, unique(&children), queue);
            }
        }
        Ok(())
    }

    /// Remember the counterparts linked to `batch` through `join` when the
    /// many-to-many cascades deletes
    fn collect_counterparts(
        &mut self,
        tx: &mut Transaction<'_>,
        table: &str,
        join: &Table,
        reference: &Reference,
        batch: &[i64],
    ) -> ModelResult<()> {
        let Some(other) = join
            .references()
            .iter()
            .find(|r| r.column_name != reference.column_name)
        else {
            return Ok(());
        };
        if !self.cascades_delete(table, &other.reference_table) {
            return Ok(());
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            quote_identifier(&other.column_name),
            quote_identifier(&join.name),
            quote_identifier(&reference.column_name),
            placeholders(batch.len())
        );
        let rows = tx.executor().query(&sql, &id_args(batch))?;
        let counterparts = self.candidates.entry(other.reference_table.clone()).or_default();
        counterparts.extend(
            rows.iter()
                .filter_map(|row| row.get_by_index(0).ok().and_then(|v| v.as_i64())),
        );
        Ok(())
    }

    /// Candidates no surviving row references any more
    fn take_orphans(&mut self, tx: &mut Transaction<'_>) -> ModelResult<Vec<Batch>> {
        let candidates = std::mem::take(&mut self.candidates);
        let mut orphans = Vec::new();
        for (table, ids) in candidates {
            let mut ids: Vec<i64> = ids.into_iter().collect();
            ids.sort_unstable();

            let mut orphaned = Vec::new();
            for id in ids {
                if self.is_doomed(&table, id) {
                    continue;
                }
                if self.is_referenced(tx, &table, id)? {
                    self.candidates.entry(table.clone()).or_default().insert(id);
                } else {
                    orphaned.push(id);
                }
            }
            if !orphaned.is_empty() {
                orphans.push((table, orphaned));
            }
        }
        Ok(orphans)
    }

    /// Whether the entity mapped to `table` declares a deleting many-to-many
    /// towards `target_table`
    fn cascades_delete(&self, table: &str, target_table: &str) -> bool {
        let Some(descriptor) = self.ctx.registry.by_table(table) else {
            return false;
        };
        descriptor.relations().any(|(_, relation)| {
            relation.kind == RelationKind::ManyToMany
                && relation.cascade.deletes()
                && self
                    .ctx
                    .registry
                    .get(&relation.target)
                    .and_then(|target| self.ctx.table_name(target).ok())
                    .is_some_and(|name| name == target_table)
        })
    }

    fn is_doomed(&self, table: &str, id: i64) -> bool {
        self.doomed.get(table).is_some_and(|ids| ids.contains(&id))
    }

    /// Whether a row outside the cascade still references `id`
    fn is_referenced(&self, tx: &mut Transaction<'_>, table: &str, id: i64) -> ModelResult<bool> {
        for (referencing, references) in self.ctx.schema.referencing(table) {
            for reference in references {
                if referencing.has_identifier() {
                    let rows = select_ids(tx, &referencing.name, &reference.column_name, &[id])?;
                    if rows.iter().any(|row| !self.is_doomed(&referencing.name, *row)) {
                        return Ok(true);
                    }
                    continue;
                }

                // a join row survives unless one of its other ends is doomed
                let others: Vec<&Reference> = referencing
                    .references()
                    .iter()
                    .filter(|r| r.column_name != reference.column_name)
                    .collect();
                let columns = if others.is_empty() {
                    "1".to_string()
                } else {
                    others
                        .iter()
                        .map(|r| quote_identifier(&r.column_name))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = ?",
                    columns,
                    quote_identifier(&referencing.name),
                    quote_identifier(&reference.column_name)
                );
                for row in tx.executor().query(&sql, &[id.to_string()])? {
                    let released = others.iter().enumerate().any(|(index, other)| {
                        row.get_by_index(index)
                            .ok()
                            .and_then(|v| v.as_i64())
                            .is_some_and(|end| self.is_doomed(&other.reference_table, end))
                    });
                    if !released {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Clear join rows, then delete each scheduled table once
    fn remove(&mut self, tx: &mut Transaction<'_>) -> ModelResult<()> {
        let schema = self.ctx.schema;
        for join in schema.tables().into_iter().filter(|t| t.is_join_table()) {
            let mut clauses = Vec::new();
            let mut args = Vec::new();
            for reference in join.references() {
                let Some(ids) = self.sorted_doomed(&reference.reference_table) else {
                    continue;
                };
                clauses.push(format!(
                    "{} IN ({})",
                    quote_identifier(&reference.column_name),
                    placeholders(ids.len())
                ));
                args.extend(id_args(&ids));
            }
            if clauses.is_empty() {
                continue;
            }
            let count = tx.executor().delete(&join.name, &clauses.join(" OR "), &args)?;
            debug!("Unlinked {} rows from {}", count, join.name);
        }

        for table in self.order.iter().rev() {
            let Some(ids) = self.sorted_doomed(table) else {
                continue;
            };
            let count = delete_rows(tx, table, &ids)?;
            debug!("Deleted {} rows from {}", count, table);
        }
        Ok(())
    }

    fn sorted_doomed(&self, table: &str) -> Option<Vec<i64>> {
        let ids = self.doomed.get(table).filter(|ids| !ids.is_empty())?;
        let mut ids: Vec<i64> = ids.iter().copied().collect();
        ids.sort_unstable();
        Some(ids)
    }
}

/// Identifiers of rows in `table` whose `column` is one of `ids`
fn select_ids(tx: &mut Transaction<'_>, table: &str, column: &str, ids: &[i64]) -> ModelResult<Vec<i64>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({})",
        ID_COLUMN,
        quote_identifier(table),
        quote_identifier(column),
        placeholders(ids.len())
    );
    let rows = tx.executor().query(&sql, &id_args(ids))?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get_by_index(0).ok().and_then(|v| v.as_i64()))
        .collect())
}

fn delete_rows(tx: &mut Transaction<'_>, table: &str, ids: &[i64]) -> ModelResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let filter = format!("{} IN ({})", ID_COLUMN, placeholders(ids.len()));
    tx.executor().delete(table, &filter, &id_args(ids))
}

fn unique(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
