//! Migration Runner - reconciles a database file with the current schema

use tracing::{info, warn};

use super::definitions::{MigrationDirection, MigrationMode, MigrationRunResult, SnapshotKey};
use super::snapshot::SnapshotStore;
use crate::backends::SqlExecutor;
use crate::error::{ModelError, ModelResult};
use crate::schema::{Constraint, DdlMode, Schema};

/// Brings a database to the requested schema version
pub struct SchemaMigrator<'a> {
    database: String,
    store: &'a dyn SnapshotStore,
    mode: MigrationMode,
    rollback_on_downgrade: bool,
}

impl<'a> SchemaMigrator<'a> {
    pub fn new(database: impl Into<String>, store: &'a dyn SnapshotStore) -> Self {
        Self {
            database: database.into(),
            store,
            mode: MigrationMode::default(),
            rollback_on_downgrade: false,
        }
    }

    pub fn with_mode(mut self, mode: MigrationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rollback_on_downgrade(mut self, enabled: bool) -> Self {
        self.rollback_on_downgrade = enabled;
        self
    }

    fn key(&self, version: u32) -> SnapshotKey {
        SnapshotKey::new(&self.database, version)
    }

    /// Statements creating `schema` on an empty database
    pub fn create_statements(&self, schema: &Schema) -> Vec<String> {
        schema.to_ddl(DdlMode::Create)
    }

    /// Statements taking a database at `from` to `to`, whose schema is `schema`
    pub fn plan(&self, schema: &Schema, from: u32, to: u32) -> ModelResult<(MigrationDirection, Vec<String>)> {
        if from == 0 {
            return Ok((MigrationDirection::Create, self.create_statements(schema)));
        }
        if from == to {
            return Ok((MigrationDirection::Unchanged, Vec::new()));
        }
        if from < to {
            return Ok((MigrationDirection::Upgrade, self.upgrade_statements(schema, from)?));
        }
        if !self.rollback_on_downgrade {
            return Err(ModelError::Downgrade { from, to });
        }
        Ok((MigrationDirection::Downgrade, self.downgrade_statements(schema, from, to)?))
    }

    fn upgrade_statements(&self, schema: &Schema, from: u32) -> ModelResult<Vec<String>> {
        let previous = self.store.load(&self.key(from))?;
        if previous.is_none() {
            warn!(
                "No schema snapshot for {} version {}, treating the database as empty",
                self.database, from
            );
        }

        match (self.mode, previous) {
            (MigrationMode::Create, Some(previous)) => {
                let mut statements = drop_statements(&previous);
                statements.extend(self.create_statements(schema));
                Ok(statements)
            }
            (MigrationMode::Update, Some(previous)) => Ok(diff(&previous, schema)),
            (_, None) => Ok(self.create_statements(schema)),
        }
    }

    fn downgrade_statements(&self, schema: &Schema, from: u32, to: u32) -> ModelResult<Vec<String>> {
        let mut statements = match self.store.load(&self.key(from))? {
            Some(previous) => drop_statements(&previous),
            None => {
                warn!(
                    "No schema snapshot for {} version {}, dropping tables of the target schema",
                    self.database, from
                );
                drop_statements(schema)
            }
        };

        match self.store.load(&self.key(to))? {
            Some(target) => {
                statements.extend(target.to_ddl(DdlMode::Create));
                statements.extend(diff(&target, schema));
            }
            None => statements.extend(self.create_statements(schema)),
        }
        Ok(statements)
    }

    /// Migrate to `to`, stamp the version and store the current snapshot
    ///
    /// The caller owns the surrounding transaction.
    pub fn migrate(&self, executor: &mut dyn SqlExecutor, schema: &Schema, to: u32) -> ModelResult<MigrationRunResult> {
        let from = executor.user_version()?;
        let (direction, statements) = self.plan(schema, from, to)?;

        if !statements.is_empty() {
            info!(
                "Migrating {} from version {} to {} ({:?}, {} statements)",
                self.database,
                from,
                to,
                direction,
                statements.len()
            );
        }
        for statement in &statements {
            executor.execute(statement)?;
        }
        if from != to {
            executor.set_user_version(to)?;
        }
        if !self.store.save(&self.key(to), schema)? {
            warn!("Schema snapshot for {} version {} was not saved", self.database, to);
        }

        Ok(MigrationRunResult {
            from_version: from,
            to_version: to,
            direction,
            statements,
        })
    }
}

fn drop_statements(schema: &Schema) -> Vec<String> {
    schema
        .creation_order()
        .into_iter()
        .rev()
        .map(|table| table.drop_if_exists_sql())
        .collect()
}

/// Additive changes from `old` to `new`: new tables, new columns, new indexes
pub fn diff(old: &Schema, new: &Schema) -> Vec<String> {
    let mut statements = Vec::new();
    let mut constraints: Vec<&Constraint> = Vec::new();

    for table in new.creation_order() {
        match old.table(&table.name) {
            None => {
                statements.push(table.create_sql());
                constraints.extend(table.constraints());
            }
            Some(existing) => {
                for column in table.columns() {
                    if !existing.has_column(&column.name) {
                        statements.push(column.add_column_sql());
                    }
                }
                constraints.extend(
                    table
                        .constraints()
                        .iter()
                        .filter(|c| !existing.constraints().iter().any(|e| e.name == c.name)),
                );
            }
        }
    }

    statements.extend(constraints.into_iter().map(Constraint::create_sql));
    statements
}
