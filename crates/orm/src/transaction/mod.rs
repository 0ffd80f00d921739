//! Transaction Engine
//!
//! Every store, delete and query runs as one unit of work between a single
//! `BEGIN` and a `COMMIT` or `ROLLBACK`. The unit of work must mark itself
//! committed; anything else rolls back.

pub mod delete;
pub mod query;
pub mod store;

use tracing::{debug, warn};

use crate::backends::SqlExecutor;
use crate::entity::{EntityDescriptor, EntityRegistry};
use crate::error::{ModelError, ModelResult};
use crate::naming;
use crate::query::{AssociationProcessor, QueryProcessor};
use crate::schema::Schema;

pub use delete::DeleteTransaction;
pub use query::QueryTransaction;
pub use store::{StoreOutcome, StoreTransaction};

/// An open transaction on an executor
///
/// Dropping an active transaction rolls it back.
pub struct Transaction<'e> {
    executor: &'e mut dyn SqlExecutor,
    committed: bool,
    active: bool,
    savepoints: u32,
}

impl<'e> Transaction<'e> {
    /// Begin a transaction
    pub fn begin(executor: &'e mut dyn SqlExecutor) -> ModelResult<Self> {
        debug!("Beginning transaction");
        executor
            .begin_transaction()
            .map_err(|e| ModelError::Transaction(format!("Failed to begin transaction: {}", e)))?;
        Ok(Self {
            executor,
            committed: false,
            active: true,
            savepoints: 0,
        })
    }

    /// The executor statements run against
    pub fn executor(&mut self) -> &mut dyn SqlExecutor {
        &mut *self.executor
    }

    /// Mark the unit of work successful; only marked transactions commit
    pub fn set_committed(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Commit the transaction
    pub fn commit(mut self) -> ModelResult<()> {
        debug!("Committing transaction");
        self.active = false;
        self.executor
            .commit()
            .map_err(|e| ModelError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    /// Roll back the transaction
    pub fn rollback(mut self) -> ModelResult<()> {
        debug!("Rolling back transaction");
        self.active = false;
        self.executor
            .rollback()
            .map_err(|e| ModelError::Transaction(format!("Failed to rollback transaction: {}", e)))
    }

    /// Open a savepoint inside the transaction
    pub fn savepoint(&mut self) -> ModelResult<String> {
        self.savepoints += 1;
        let name = format!("sp_{}", self.savepoints);
        self.executor
            .execute(&format!("SAVEPOINT {}", name))
            .map_err(|e| ModelError::Transaction(format!("Failed to create savepoint: {}", e)))?;
        Ok(name)
    }

    pub fn release_savepoint(&mut self, name: &str) -> ModelResult<()> {
        self.executor
            .execute(&format!("RELEASE SAVEPOINT {}", name))
            .map_err(|e| ModelError::Transaction(format!("Failed to release savepoint: {}", e)))
    }

    /// Undo everything since the savepoint and discard it
    pub fn rollback_to_savepoint(&mut self, name: &str) -> ModelResult<()> {
        self.executor
            .execute(&format!("ROLLBACK TO SAVEPOINT {}; RELEASE SAVEPOINT {}", name, name))
            .map_err(|e| ModelError::Transaction(format!("Failed to rollback to savepoint: {}", e)))
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.active {
            warn!("Transaction dropped without commit or rollback, rolling back");
            if let Err(e) = self.executor.rollback() {
                warn!("Rollback on drop failed: {}", e);
            }
        }
    }
}

/// Runs a unit of work inside one transaction
pub struct TransactionTemplate;

impl TransactionTemplate {
    /// Run `work`, committing only if it returned `Ok` and marked the
    /// transaction committed
    pub fn execute<R, F>(executor: &mut dyn SqlExecutor, work: F) -> ModelResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> ModelResult<R>,
    {
        let mut tx = Transaction::begin(executor)?;
        match work(&mut tx) {
            Ok(result) if tx.is_committed() => {
                tx.commit()?;
                Ok(result)
            }
            Ok(result) => {
                debug!("Unit of work not marked committed");
                tx.rollback()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback() {
                    warn!("Rollback after error failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }
}

/// Identifier of an entity stored earlier in the same cascade
///
/// Consulted by deeper levels to link a back-reference to the parent
/// without storing the parent again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub stored_id: i64,
    /// Entity that was stored
    pub from: String,
    /// Entity whose cascade is in progress
    pub to: String,
}

impl PendingTransaction {
    pub fn new(stored_id: i64, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            stored_id,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Schema and registry shared by the engine operations
#[derive(Debug, Clone, Copy)]
pub struct EngineContext<'a> {
    pub schema: &'a Schema,
    pub registry: &'a EntityRegistry,
}

impl<'a> EngineContext<'a> {
    pub fn new(schema: &'a Schema, registry: &'a EntityRegistry) -> Self {
        Self { schema, registry }
    }

    pub fn descriptor(&self, entity: &str) -> ModelResult<&'a EntityDescriptor> {
        self.registry.descriptor(entity)
    }

    pub fn table_name(&self, descriptor: &EntityDescriptor) -> ModelResult<String> {
        naming::table_name(descriptor).map_err(|e| ModelError::Mapping(e.to_string()))
    }

    pub fn associations(&self) -> AssociationProcessor<'a> {
        AssociationProcessor::new(self.schema, self.registry)
    }

    pub fn processor(&self) -> QueryProcessor<'a> {
        QueryProcessor::new(self.schema, self.registry)
    }
}

/// `?, ?, ?` for an IN list
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn id_args(ids: &[i64]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqliteExecutor;

    fn executor() -> SqliteExecutor {
        let mut executor = SqliteExecutor::open_in_memory().unwrap();
        executor
            .execute("CREATE TABLE item (_id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        executor
    }

    fn count(executor: &mut SqliteExecutor) -> usize {
        executor.query("SELECT _id FROM item", &[]).unwrap().len()
    }

    #[test]
    fn test_marked_work_commits() {
        let mut executor = executor();
        let id = TransactionTemplate::execute(&mut executor, |tx| {
            let id = tx
                .executor()
                .insert_or_replace("item", &[("name".to_string(), "a".into())])?;
            tx.set_committed();
            Ok(id)
        })
        .unwrap();
        assert_eq!(id, 1);
        assert_eq!(count(&mut executor), 1);
    }

    #[test]
    fn test_unmarked_work_rolls_back() {
        let mut executor = executor();
        TransactionTemplate::execute(&mut executor, |tx| {
            tx.executor()
                .insert_or_replace("item", &[("name".to_string(), "a".into())])
        })
        .unwrap();
        assert_eq!(count(&mut executor), 0);
    }

    #[test]
    fn test_failed_work_rolls_back() {
        let mut executor = executor();
        let result: ModelResult<()> = TransactionTemplate::execute(&mut executor, |tx| {
            tx.executor()
                .insert_or_replace("item", &[("name".to_string(), "a".into())])?;
            tx.set_committed();
            Err(ModelError::Transaction("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(count(&mut executor), 0);
    }

    #[test]
    fn test_savepoint_rollback_keeps_earlier_work() {
        let mut executor = executor();
        TransactionTemplate::execute(&mut executor, |tx| {
            tx.executor()
                .insert_or_replace("item", &[("name".to_string(), "kept".into())])?;
            let savepoint = tx.savepoint()?;
            tx.executor()
                .insert_or_replace("item", &[("name".to_string(), "undone".into())])?;
            tx.rollback_to_savepoint(&savepoint)?;
            tx.set_committed();
            Ok(())
        })
        .unwrap();
        let rows = executor.query("SELECT name FROM item", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_index(0).ok().and_then(|v| v.as_str()), Some("kept"));
    }
}
