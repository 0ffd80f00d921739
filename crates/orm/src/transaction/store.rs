//! Cascading store
//!
//! Owning relations are stored before the row that references them, the row
//! is upserted, then inverse and many-to-many relations are stored with the
//! fresh identifier.

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use super::{EngineContext, PendingTransaction, Transaction};
use crate::backends::DatabaseValue;
use crate::converter::EntityConverter;
use crate::entity::{EntityDescriptor, RelationKind};
use crate::error::ModelResult;
use crate::query::JoinKeys;
use crate::security::quote_identifier;

/// Result of storing one root entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Row identifier assigned to the entity
    Stored(i64),
    /// The root row could not be written; nothing of its cascade was kept
    Failed,
}

impl StoreOutcome {
    pub fn id(&self) -> Option<i64> {
        match self {
            StoreOutcome::Stored(id) => Some(*id),
            StoreOutcome::Failed => None,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, StoreOutcome::Stored(_))
    }
}

pub struct StoreTransaction<'a> {
    ctx: EngineContext<'a>,
    pending: Vec<PendingTransaction>,
}

impl<'a> StoreTransaction<'a> {
    pub fn new(ctx: EngineContext<'a>) -> Self {
        Self {
            ctx,
            pending: Vec::new(),
        }
    }

    /// Store every object of a batch
    ///
    /// Each root runs under its own savepoint so a failed root leaves no
    /// partial cascade behind. Identifiers are written back into the objects.
    pub fn store_all(
        &mut self,
        tx: &mut Transaction<'_>,
        entity: &str,
        objects: &mut [Map<String, JsonValue>],
    ) -> ModelResult<Vec<StoreOutcome>> {
        let descriptor = self.ctx.descriptor(entity)?;
        let mut outcomes = Vec::with_capacity(objects.len());

        for object in objects.iter_mut() {
            self.pending.clear();
            let savepoint = tx.savepoint()?;
            match self.store(tx, descriptor, object, &[]) {
                Ok(Some(id)) => {
                    tx.release_savepoint(&savepoint)?;
                    outcomes.push(StoreOutcome::Stored(id));
                }
                Ok(None) => {
                    tx.rollback_to_savepoint(&savepoint)?;
                    outcomes.push(StoreOutcome::Failed);
                }
                Err(e) if e.is_row_local() => {
                    warn!("Skipping {}: {}", entity, e);
                    tx.rollback_to_savepoint(&savepoint)?;
                    outcomes.push(StoreOutcome::Failed);
                }
                Err(e) => {
                    tx.rollback_to_savepoint(&savepoint)?;
                    return Err(e);
                }
            }
        }

        debug!(
            "Stored {} of {} {} entities",
            outcomes.iter().filter(|o| o.is_stored()).count(),
            outcomes.len(),
            entity
        );
        Ok(outcomes)
    }

    /// Store one object and its cascade
    ///
    /// `extra` supplies columns set by the caller, such as the parent key of
    /// a one-to-many child. Returns `None` when the insert failed.
    pub fn store(
        &mut self,
        tx: &mut Transaction<'_>,
        descriptor: &'a EntityDescriptor,
        object: &mut Map<String, JsonValue>,
        extra: &[(String, DatabaseValue)],
    ) -> ModelResult<Option<i64>> {
        let table = self.ctx.table_name(descriptor)?;
        let owning = self.store_owning(tx, descriptor, object)?;

        let mut values = EntityConverter::to_column_values(descriptor, object)?;
        for (column, value) in owning.into_iter().chain(extra.iter().cloned()) {
            match values.iter_mut().find(|(existing, _)| *existing == column) {
                Some(slot) => slot.1 = value,
                None => values.push((column, value)),
            }
        }

        let id = match tx.executor().insert_or_replace(&table, &values) {
            Ok(id) => id,
            Err(e) => {
                warn!("Insert into {} failed: {}", table, e);
                return Ok(None);
            }
        };
        EntityConverter::set_identifier(descriptor, object, id);

        self.store_inverse(tx, descriptor, object, id)?;
        Ok(Some(id))
    }

    /// Foreign key values for every owning relation, storing cascaded targets
    fn store_owning(
        &mut self,
        tx: &mut Transaction<'_>,
        descriptor: &'a EntityDescriptor,
        object: &mut Map<String, JsonValue>,
    ) -> ModelResult<Vec<(String, DatabaseValue)>> {
        let associations = self.ctx.associations();
        let mut values = Vec::new();

        for (field, relation) in descriptor.relations() {
            if !relation.kind.is_owning() {
                continue;
            }
            let association = associations.association(descriptor, field.name())?;
            let column = match association.keys {
                JoinKeys::Owning { column } => column,
                _ => continue,
            };
            let target = association.target;

            let nested = object.get_mut(field.name()).and_then(JsonValue::as_object_mut);
            let nested_id = nested.as_deref().and_then(|n| EntityConverter::identifier_of(target, n));
            let pending = self
                .pending
                .iter()
                .rev()
                .find(|p| p.from == target.name() && p.to == descriptor.name())
                .map(|p| p.stored_id)
                .filter(|stored| nested_id.map_or(true, |id| id == *stored));

            let foreign = match (pending, nested) {
                (Some(stored), nested) => {
                    if let Some(nested) = nested {
                        EntityConverter::set_identifier(target, nested, stored);
                    }
                    Some(stored)
                }
                (None, Some(nested)) if relation.cascade.stores() => self.store(tx, target, nested, &[])?,
                (None, Some(_)) => nested_id,
                (None, None) => None,
            };
            values.push((column, foreign.map_or(DatabaseValue::Null, DatabaseValue::Integer)));
        }
        Ok(values)
    }

    /// Children of inverse relations and many-to-many pairs
    fn store_inverse(
        &mut self,
        tx: &mut Transaction<'_>,
        descriptor: &'a EntityDescriptor,
        object: &mut Map<String, JsonValue>,
        id: i64,
    ) -> ModelResult<()> {
        let associations = self.ctx.associations();

        for (field, relation) in descriptor.relations() {
            if relation.kind.is_owning() || !relation.cascade.stores() {
                continue;
            }
            let association = associations.association(descriptor, field.name())?;
            let target = association.target;
            let Some(value) = object.get_mut(field.name()) else {
                continue;
            };

            match association.keys {
                JoinKeys::Inverse { column } => {
                    self.pending
                        .push(PendingTransaction::new(id, descriptor.name(), target.name()));
                    let parent = [(column, DatabaseValue::Integer(id))];
                    let result = children(value, &relation.kind)
                        .into_iter()
                        .try_for_each(|child| self.store(tx, target, child, &parent).map(|_| ()));
                    self.pending.pop();
                    result?;
                }
                JoinKeys::JoinTable {
                    table,
                    parent_column,
                    target_column,
                } => {
                    let mut target_ids = Vec::new();
                    for child in children(value, &relation.kind) {
                        if let Some(target_id) = self.store(tx, target, child, &[])? {
                            target_ids.push(target_id);
                        }
                    }
                    tx.executor().delete(
                        &table,
                        &format!("{} = ?", quote_identifier(&parent_column)),
                        &[id.to_string()],
                    )?;
                    for target_id in target_ids {
                        tx.executor().insert_or_replace(
                            &table,
                            &[
                                (parent_column.clone(), DatabaseValue::Integer(id)),
                                (target_column.clone(), DatabaseValue::Integer(target_id)),
                            ],
                        )?;
                    }
                }
                JoinKeys::Owning { .. } => {}
            }
        }
        Ok(())
    }
}

/// Related objects held by a relation field
fn children<'v>(value: &'v mut JsonValue, kind: &RelationKind) -> Vec<&'v mut Map<String, JsonValue>> {
    if kind.is_collection() {
        match value {
            JsonValue::Array(items) => items.iter_mut().filter_map(JsonValue::as_object_mut).collect(),
            _ => Vec::new(),
        }
    } else {
        value.as_object_mut().into_iter().collect()
    }
}
