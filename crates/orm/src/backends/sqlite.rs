//! SQLite Backend Implementation
//!
//! [`SqlExecutor`] over a single `rusqlite` connection. Transactions are
//! driven with plain `BEGIN`/`COMMIT`/`ROLLBACK` statements so the executor
//! can be held behind a trait object for the lifetime of the database.

use std::path::Path;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::debug;

use super::core::{DatabaseRow, DatabaseValue, SqlExecutor};
use crate::error::OrmResult;
use crate::security::quote_identifier;

/// SQLite-backed [`SqlExecutor`]
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened SQLite database at {}", path.as_ref().display());
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> OrmResult<Self> {
        let conn = Connection::open_in_memory()?;
        debug!("Opened in-memory SQLite database");
        Ok(Self { conn })
    }

    /// Toggle foreign key enforcement for this connection
    pub fn set_foreign_keys(&mut self, enabled: bool) -> OrmResult<()> {
        self.conn.execute_batch(if enabled {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = OFF;"
        })?;
        Ok(())
    }

    /// Borrow the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&mut self, sql: &str) -> OrmResult<()> {
        debug!("Executing: {}", sql);
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query(&mut self, sql: &str, args: &[String]) -> OrmResult<Vec<DatabaseRow>> {
        debug!("Query: {} {:?}", sql, args);
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                values.push(DatabaseValue::from(row.get_ref(index)?));
            }
            result.push(DatabaseRow::new(columns.clone(), values));
        }
        Ok(result)
    }

    fn insert_or_replace(&mut self, table: &str, values: &[(String, DatabaseValue)]) -> OrmResult<i64> {
        let sql = if values.is_empty() {
            format!("INSERT OR REPLACE INTO {} DEFAULT VALUES", quote_identifier(table))
        } else {
            let columns: Vec<String> = values.iter().map(|(c, _)| quote_identifier(c)).collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                quote_identifier(table),
                columns.join(", "),
                placeholders
            )
        };
        debug!("Insert: {}", sql);
        self.conn
            .execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete(&mut self, table: &str, where_clause: &str, args: &[String]) -> OrmResult<usize> {
        let sql = if where_clause.trim().is_empty() {
            format!("DELETE FROM {}", quote_identifier(table))
        } else {
            format!("DELETE FROM {} WHERE {}", quote_identifier(table), where_clause)
        };
        debug!("Delete: {} {:?}", sql, args);
        let affected = self.conn.execute(&sql, params_from_iter(args.iter()))?;
        Ok(affected)
    }

    fn begin_transaction(&mut self) -> OrmResult<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> OrmResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn user_version(&mut self) -> OrmResult<u32> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(u32::try_from(version).unwrap_or(0))
    }

    fn set_user_version(&mut self, version: u32) -> OrmResult<()> {
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {}", version))?;
        Ok(())
    }
}

impl ToSql for DatabaseValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            DatabaseValue::Null => ValueRef::Null,
            DatabaseValue::Integer(i) => ValueRef::Integer(*i),
            DatabaseValue::Real(f) => ValueRef::Real(*f),
            DatabaseValue::Text(s) => ValueRef::Text(s.as_bytes()),
            DatabaseValue::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

impl From<ValueRef<'_>> for DatabaseValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(i) => DatabaseValue::Integer(i),
            ValueRef::Real(f) => DatabaseValue::Real(f),
            ValueRef::Text(t) => DatabaseValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => DatabaseValue::Blob(b.to_vec()),
        }
    }
}
