//! Database - open lifecycle and the public entry points
//!
//! Opening builds the schema from the registry, connects, and migrates the
//! file to the configured version. Every later call is one transaction on
//! the shared connection.

use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::backends::{SqlExecutor, SqliteExecutor};
use crate::config::DatabaseConfig;
use crate::converter::{EntityConverter, ResultSet};
use crate::entity::{Entity, EntityRegistry};
use crate::error::{ModelError, ModelResult};
use crate::migrations::{FileSnapshotStore, MemorySnapshotStore, MigrationRunResult, SchemaMigrator, SnapshotStore};
use crate::query::{PredicateBuilder, Query, Root};
use crate::schema::factory::SchemaFactory;
use crate::schema::Schema;
use crate::transaction::{
    DeleteTransaction, EngineContext, QueryTransaction, StoreOutcome, StoreTransaction, TransactionTemplate,
};

pub struct Database {
    config: DatabaseConfig,
    registry: EntityRegistry,
    schema: Schema,
    executor: Mutex<Box<dyn SqlExecutor + Send>>,
    migration: MigrationRunResult,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("tables", &self.schema.len())
            .field("migration", &self.migration)
            .finish()
    }
}

impl Database {
    /// Open the configured SQLite database
    ///
    /// The schema is built before the connection is made, so an invalid
    /// registry never creates the database file.
    pub fn open(config: DatabaseConfig, registry: EntityRegistry) -> ModelResult<Self> {
        config.validate()?;
        let schema = SchemaFactory::new(&registry).build()?;
        let mut executor = match &config.path {
            Some(path) => SqliteExecutor::open(path)?,
            None => SqliteExecutor::open_in_memory()?,
        };
        executor.set_foreign_keys(config.foreign_keys)?;

        let store: Box<dyn SnapshotStore> = match &config.snapshot_dir {
            Some(dir) => Box::new(FileSnapshotStore::new(dir)),
            None => Box::new(MemorySnapshotStore::new()),
        };
        Self::open_with_schema(config, registry, schema, Box::new(executor), &*store)
    }

    /// Open over a caller-supplied executor and snapshot store
    pub fn open_with_executor(
        config: DatabaseConfig,
        registry: EntityRegistry,
        executor: Box<dyn SqlExecutor + Send>,
        snapshots: &dyn SnapshotStore,
    ) -> ModelResult<Self> {
        config.validate()?;
        let schema = SchemaFactory::new(&registry).build()?;
        Self::open_with_schema(config, registry, schema, executor, snapshots)
    }

    fn open_with_schema(
        config: DatabaseConfig,
        registry: EntityRegistry,
        schema: Schema,
        mut executor: Box<dyn SqlExecutor + Send>,
        snapshots: &dyn SnapshotStore,
    ) -> ModelResult<Self> {
        let migrator = SchemaMigrator::new(&config.name, snapshots)
            .with_mode(config.migration_mode)
            .with_rollback_on_downgrade(config.rollback_on_downgrade);
        let migration = TransactionTemplate::execute(&mut *executor, |tx| {
            let result = migrator.migrate(tx.executor(), &schema, config.version)?;
            tx.set_committed();
            Ok(result)
        })?;

        info!(
            "Opened database {} at version {} ({} tables)",
            config.name,
            config.version,
            schema.len()
        );
        Ok(Self {
            config,
            registry,
            schema,
            executor: Mutex::new(executor),
            migration,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Outcome of the migration run at open
    pub fn migration(&self) -> &MigrationRunResult {
        &self.migration
    }

    fn context(&self) -> EngineContext<'_> {
        EngineContext::new(&self.schema, &self.registry)
    }

    fn lock(&self) -> ModelResult<MutexGuard<'_, Box<dyn SqlExecutor + Send>>> {
        self.executor
            .lock()
            .map_err(|_| ModelError::Transaction("Database connection lock poisoned".to_string()))
    }

    /// Render a query over `T` without running it
    pub fn create_query<T, F>(&self, filter: F) -> ModelResult<Query>
    where
        T: Entity,
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        self.context().processor().create_query(T::NAME, filter)
    }

    /// Store one entity with its cascade, writing assigned identifiers back
    pub fn store<T: Entity>(&self, entity: &mut T) -> ModelResult<StoreOutcome> {
        let outcomes = self.store_all(std::slice::from_mut(entity))?;
        Ok(outcomes.into_iter().next().unwrap_or(StoreOutcome::Failed))
    }

    /// Store a batch in one transaction, one outcome per entity
    pub fn store_all<T: Entity>(&self, entities: &mut [T]) -> ModelResult<Vec<StoreOutcome>> {
        let mut objects = entities
            .iter()
            .map(EntityConverter::to_json)
            .collect::<ModelResult<Vec<_>>>()?;
        let outcomes = self.store_objects(T::NAME, &mut objects)?;

        for ((entity, object), outcome) in entities.iter_mut().zip(objects).zip(&outcomes) {
            if outcome.is_stored() {
                *entity = EntityConverter::from_json(JsonValue::Object(object))?;
            }
        }
        Ok(outcomes)
    }

    /// Store untyped object bags of a registered entity
    pub fn store_objects(&self, entity: &str, objects: &mut [Map<String, JsonValue>]) -> ModelResult<Vec<StoreOutcome>> {
        let ctx = self.context();
        let mut guard = self.lock()?;
        TransactionTemplate::execute(&mut **guard, |tx| {
            let outcomes = StoreTransaction::new(ctx).store_all(tx, entity, objects)?;
            tx.set_committed();
            Ok(outcomes)
        })
    }

    pub fn find_by_id<T: Entity>(&self, id: i64) -> ModelResult<Option<T>> {
        self.find_one::<T, _>(|_, p| {
            p.eq("id", id);
        })
    }

    pub fn find_one<T, F>(&self, filter: F) -> ModelResult<Option<T>>
    where
        T: Entity,
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        Ok(self.find_all::<T, F>(filter)?.into_iter().next())
    }

    pub fn find_all<T, F>(&self, filter: F) -> ModelResult<Vec<T>>
    where
        T: Entity,
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        let query = self.create_query::<T, F>(filter)?;
        self.execute_query::<T>(&query)
    }

    /// Run a prepared query over `T`
    pub fn execute_query<T: Entity>(&self, query: &Query) -> ModelResult<Vec<T>> {
        self.find_objects(T::NAME, query)?
            .into_iter()
            .map(|object| EntityConverter::from_json(JsonValue::Object(object)))
            .collect()
    }

    /// Run a prepared query and return untyped object bags
    pub fn find_objects(&self, entity: &str, query: &Query) -> ModelResult<Vec<Map<String, JsonValue>>> {
        let ctx = self.context();
        let mut guard = self.lock()?;
        TransactionTemplate::execute(&mut **guard, |tx| {
            let objects = QueryTransaction::new(ctx).find(tx, entity, query)?;
            tx.set_committed();
            Ok(objects)
        })
    }

    /// Run a filter over `T` and hand every row to `transformer` untouched
    pub fn query_raw<T, F, R, G>(&self, filter: F, transformer: G) -> ModelResult<Vec<R>>
    where
        T: Entity,
        F: FnOnce(&mut Root, &mut PredicateBuilder),
        G: FnMut(ResultSet) -> R,
    {
        let query = self.create_query::<T, F>(filter)?;
        let ctx = self.context();
        let mut guard = self.lock()?;
        TransactionTemplate::execute(&mut **guard, |tx| {
            let rows = QueryTransaction::new(ctx).find_raw(tx, &query, transformer)?;
            tx.set_committed();
            Ok(rows)
        })
    }

    /// Number of distinct `T` rows matching the filter
    pub fn count<T, F>(&self, filter: F) -> ModelResult<u64>
    where
        T: Entity,
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        let ctx = self.context();
        let query = ctx.processor().count_query(T::NAME, filter)?;
        let mut guard = self.lock()?;
        TransactionTemplate::execute(&mut **guard, |tx| {
            let count = QueryTransaction::new(ctx).count(tx, &query)?;
            tx.set_committed();
            Ok(count)
        })
    }

    /// Delete rows of `T` by identifier with their cascade
    pub fn delete<T: Entity>(&self, ids: &[i64]) -> ModelResult<usize> {
        self.delete_ids(T::NAME, ids)
    }

    /// Delete untyped rows of a registered entity by identifier
    pub fn delete_ids(&self, entity: &str, ids: &[i64]) -> ModelResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ctx = self.context();
        let mut guard = self.lock()?;
        TransactionTemplate::execute(&mut **guard, |tx| {
            let count = DeleteTransaction::new(ctx).delete(tx, entity, ids)?;
            tx.set_committed();
            Ok(count)
        })
    }

    /// Delete every `T` matching the filter with their cascade
    pub fn delete_where<T, F>(&self, filter: F) -> ModelResult<usize>
    where
        T: Entity,
        F: FnOnce(&mut Root, &mut PredicateBuilder),
    {
        let ctx = self.context();
        let query = ctx.processor().id_query(T::NAME, filter)?;
        let mut guard = self.lock()?;
        TransactionTemplate::execute(&mut **guard, |tx| {
            let ids: Vec<i64> = QueryTransaction::new(ctx)
                .find_raw(tx, &query, |row| row.id())?
                .into_iter()
                .flatten()
                .collect();
            debug!("Deleting {} {} rows matching filter", ids.len(), T::NAME);
            let count = DeleteTransaction::new(ctx).delete(tx, T::NAME, &ids)?;
            tx.set_committed();
            Ok(count)
        })
    }
}
