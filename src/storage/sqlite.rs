//! `SQLite` execution backend.
//!
//! Executes compiled statements over a mutex-guarded [`Connection`]. The
//! mutex serializes operations, which also guarantees that a page query and
//! its companion count query run back-to-back with nothing interleaved.

use crate::models::{FieldMap, Value};
use crate::query::{CompiledDelete, CompiledSelect};
use crate::storage::{acquire_lock, record_operation_metrics};
use crate::{Error, Result};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug)]
struct SqlInner {
    conn: Connection,
    in_transaction: bool,
}

/// `SQLite`-backed storage.
///
/// Holds one connection behind a mutex. WAL mode and a busy timeout keep
/// contention manageable; callers needing true pooling should front this
/// with `r2d2-rusqlite` or `deadpool-sqlite`.
#[derive(Debug)]
pub struct SqliteBackend {
    inner: Mutex<SqlInner>,
}

impl SqliteBackend {
    /// Opens (creating if needed) a database file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| backend_err("open", &e))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the connection cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| backend_err("open", &e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_connection(&conn);
        Ok(Self {
            inner: Mutex::new(SqlInner {
                conn,
                in_transaction: false,
            }),
        })
    }

    /// Executes a compiled SELECT and returns the page rows plus the total
    /// number of rows the WHERE clause matches before LIMIT/OFFSET.
    ///
    /// Both statements run under one lock guard so the count cannot drift
    /// from the page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure.
    #[instrument(skip(self, compiled), level = "debug")]
    pub fn select(&self, compiled: &CompiledSelect) -> Result<(Vec<FieldMap>, usize)> {
        let start = Instant::now();
        let inner = acquire_lock(&self.inner);

        let rows = fetch_rows(&inner.conn, &compiled.sql, &compiled.params)?;
        let total: i64 = inner
            .conn
            .query_row(
                &compiled.count_sql,
                params_from_iter(compiled.params.iter()),
                |row| row.get(0),
            )
            .map_err(|e| backend_err("count", &e))?;

        record_operation_metrics("sqlite", "select", start);
        Ok((rows, usize::try_from(total).unwrap_or(0)))
    }

    /// Inserts a row and returns the generated rowid.
    ///
    /// An empty field map inserts a row of defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure.
    #[instrument(skip(self, fields), level = "debug")]
    pub fn insert(&self, table: &str, fields: &FieldMap) -> Result<i64> {
        let start = Instant::now();
        let inner = acquire_lock(&self.inner);

        let affected = if fields.is_empty() {
            inner
                .conn
                .execute(&format!("INSERT INTO \"{table}\" DEFAULT VALUES"), [])
        } else {
            let columns: Vec<String> = fields.keys().map(|k| format!("\"{k}\"")).collect();
            let placeholders = vec!["?"; fields.len()].join(", ");
            let sql = format!(
                "INSERT INTO \"{table}\" ({}) VALUES ({placeholders})",
                columns.join(", ")
            );
            inner
                .conn
                .execute(&sql, params_from_iter(fields.values()))
        };
        affected.map_err(|e| backend_err("insert", &e))?;

        let id = inner.conn.last_insert_rowid();
        record_operation_metrics("sqlite", "insert", start);
        Ok(id)
    }

    /// Updates the row whose `key_column` equals `key` and returns the
    /// number of rows changed.
    ///
    /// Columns listed in `skip` never reach the SET list; the caller passes
    /// the primary key and any join-populated output aliases there. With
    /// nothing left to set this is a no-op returning 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure.
    #[instrument(skip(self, fields, skip), level = "debug")]
    pub fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        fields: &FieldMap,
        skip: &[&str],
    ) -> Result<usize> {
        let (assignments, mut params): (Vec<String>, Vec<&Value>) = fields
            .iter()
            .filter(|(name, _)| name.as_str() != key_column && !skip.contains(&name.as_str()))
            .map(|(name, value)| (format!("\"{name}\" = ?"), value))
            .unzip();
        if assignments.is_empty() {
            return Ok(0);
        }
        params.push(key);

        let start = Instant::now();
        let inner = acquire_lock(&self.inner);
        let sql = format!(
            "UPDATE \"{table}\" SET {} WHERE \"{key_column}\" = ?",
            assignments.join(", ")
        );
        let changed = inner
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| backend_err("update", &e))?;

        record_operation_metrics("sqlite", "update", start);
        Ok(changed)
    }

    /// Executes a compiled DELETE and returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure.
    #[instrument(skip(self, compiled), level = "debug")]
    pub fn execute_delete(&self, compiled: &CompiledDelete) -> Result<usize> {
        let start = Instant::now();
        let inner = acquire_lock(&self.inner);
        let removed = inner
            .conn
            .execute(&compiled.sql, params_from_iter(compiled.params.iter()))
            .map_err(|e| backend_err("delete", &e))?;

        record_operation_metrics("sqlite", "delete", start);
        Ok(removed)
    }

    /// Runs an arbitrary caller-written SELECT with positional parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure.
    #[instrument(skip(self, sql, params), level = "debug")]
    pub fn raw_query(&self, sql: &str, params: &[Value]) -> Result<Vec<FieldMap>> {
        let start = Instant::now();
        let inner = acquire_lock(&self.inner);
        let rows = fetch_rows(&inner.conn, sql, params)?;
        record_operation_metrics("sqlite", "raw_query", start);
        Ok(rows)
    }

    /// Executes a batch of semicolon-separated statements, typically DDL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let inner = acquire_lock(&self.inner);
        inner
            .conn
            .execute_batch(sql)
            .map_err(|e| backend_err("execute_batch", &e))
    }

    /// Begins a transaction.
    ///
    /// Transactions do not nest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if a transaction is already open,
    /// or [`Error::Backend`] on statement failure.
    pub fn begin_transaction(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        if inner.in_transaction {
            return Err(Error::TransactionState(
                "transaction already begun".to_string(),
            ));
        }
        inner
            .conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| backend_err("begin", &e))?;
        inner.in_transaction = true;
        Ok(())
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if no transaction is open, or
    /// [`Error::Backend`] on statement failure.
    pub fn commit(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        if !inner.in_transaction {
            return Err(Error::TransactionState(
                "no transaction to commit".to_string(),
            ));
        }
        inner
            .conn
            .execute_batch("COMMIT")
            .map_err(|e| backend_err("commit", &e))?;
        inner.in_transaction = false;
        Ok(())
    }

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if no transaction is open, or
    /// [`Error::Backend`] on statement failure.
    pub fn rollback(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        if !inner.in_transaction {
            return Err(Error::TransactionState(
                "no transaction to roll back".to_string(),
            ));
        }
        inner
            .conn
            .execute_batch("ROLLBACK")
            .map_err(|e| backend_err("rollback", &e))?;
        inner.in_transaction = false;
        Ok(())
    }
}

/// Applies connection pragmas: WAL journaling, NORMAL synchronous, a 5s
/// busy timeout, and case-sensitive LIKE so substring filters behave the
/// same as the in-memory matcher.
fn configure_connection(conn: &Connection) {
    // journal_mode returns a value row, so pragma_update's result is ignored
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    let _ = conn.pragma_update(None, "case_sensitive_like", "ON");
}

fn fetch_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<FieldMap>> {
    let mut stmt = conn.prepare(sql).map_err(|e| backend_err("prepare", &e))?;
    let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

    let mut rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(|e| backend_err("query", &e))?;

    let mut result = Vec::new();
    while let Some(row) = rows.next().map_err(|e| backend_err("fetch", &e))? {
        let mut fields = FieldMap::with_capacity(column_names.len());
        for (index, name) in column_names.iter().enumerate() {
            let value = row
                .get_ref(index)
                .map(Value::from)
                .map_err(|e| backend_err("fetch", &e))?;
            fields.insert(name.clone(), value);
        }
        result.push(fields);
    }
    Ok(result)
}

fn backend_err(operation: &str, cause: &rusqlite::Error) -> Error {
    Error::Backend {
        operation: operation.to_string(),
        cause: cause.to_string(),
    }
}
