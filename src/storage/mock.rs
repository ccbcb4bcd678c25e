//! In-memory mock store with snapshot transactions and fault injection.
//!
//! Backs tests and offline development. Rows live in per-entity ordered
//! maps keyed by a synthetic integer row key; filtering interprets the same
//! parsed predicates the SQL compiler does, so a filter matches the same
//! rows here and against the database.

use crate::models::{FieldMap, Value};
use crate::query::Predicate;
use crate::storage::{acquire_lock, record_operation_metrics};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

type Tables = IndexMap<String, BTreeMap<i64, FieldMap>>;

#[derive(Debug, Default)]
struct MockInner {
    tables: Tables,
    /// Pre-transaction copy of `tables`; `Some` while a transaction is open.
    snapshot: Option<Tables>,
    fail_select: HashSet<String>,
    fail_save: HashSet<String>,
    fail_delete: HashSet<String>,
}

/// In-memory store keyed by entity-type name.
///
/// All mutation goes through a single mutex, mirroring the serialized
/// access model of the `SQLite` backend. Pagination and ordering are not
/// applied here; callers filter first and window the result themselves.
#[derive(Debug, Default)]
pub struct MockStore {
    inner: Mutex<MockInner>,
}

impl MockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first row of an entity matching every predicate.
    ///
    /// Rows are scanned in row-key order, so the match with the lowest key
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when a select fault was armed for this
    /// entity.
    #[instrument(skip(self, predicates), level = "debug")]
    pub fn get_one(&self, entity: &str, predicates: &[Predicate]) -> Result<Option<FieldMap>> {
        let start = Instant::now();
        let mut inner = acquire_lock(&self.inner);
        Self::check_fault(&mut inner.fail_select, entity, "select")?;

        let row = inner.tables.get(entity).and_then(|rows| {
            rows.values()
                .find(|row| predicates.iter().all(|p| p.matches(row)))
                .cloned()
        });
        record_operation_metrics("mock", "get_one", start);
        Ok(row)
    }

    /// Returns every row of an entity matching every predicate, in row-key
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when a select fault was armed for this
    /// entity.
    #[instrument(skip(self, predicates), level = "debug")]
    pub fn get_many(&self, entity: &str, predicates: &[Predicate]) -> Result<Vec<FieldMap>> {
        let start = Instant::now();
        let mut inner = acquire_lock(&self.inner);
        Self::check_fault(&mut inner.fail_select, entity, "select")?;

        let rows = inner.tables.get(entity).map_or_else(Vec::new, |rows| {
            rows.values()
                .filter(|row| predicates.iter().all(|p| p.matches(row)))
                .cloned()
                .collect()
        });
        record_operation_metrics("mock", "get_many", start);
        Ok(rows)
    }

    /// Inserts or updates a row and returns the resulting primary-key value.
    ///
    /// When `primary_key` names a field holding a numeric value and some
    /// stored row carries that same value, the stored row is overwritten in
    /// place. Otherwise a new row key is allocated as one past the current
    /// maximum (1 for an empty table), written into the primary-key field,
    /// and the row inserted. The row key is an internal sequence number; it
    /// only coincides with the primary key because inserts copy it there.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when a save fault was armed for this
    /// entity.
    #[instrument(skip(self, fields), level = "debug")]
    pub fn save(
        &self,
        entity: &str,
        primary_key: Option<&str>,
        fields: &FieldMap,
    ) -> Result<Value> {
        let start = Instant::now();
        let mut inner = acquire_lock(&self.inner);
        Self::check_fault(&mut inner.fail_save, entity, "save")?;

        let rows = inner.tables.entry(entity.to_string()).or_default();

        let pk_value = primary_key
            .and_then(|pk| fields.get(pk))
            .filter(|v| v.is_numeric())
            .cloned();
        if let Some(pk_value) = pk_value {
            let pk = primary_key.unwrap_or_default();
            let existing = rows
                .iter()
                .find(|(_, row)| row.get(pk) == Some(&pk_value))
                .map(|(key, _)| *key);
            if let Some(key) = existing {
                rows.insert(key, fields.clone());
                record_operation_metrics("mock", "save", start);
                return Ok(pk_value);
            }
        }

        let key = rows.keys().next_back().map_or(1, |max| max + 1);
        let mut row = fields.clone();
        if let Some(pk) = primary_key {
            row.insert(pk.to_string(), key.into());
        }
        rows.insert(key, row);
        record_operation_metrics("mock", "save", start);
        Ok(Value::Int(key))
    }

    /// Every stored row of an entity, in row-key order.
    ///
    /// Backs the raw-query path, which has no SQL engine to run against and
    /// returns the whole table instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when a select fault was armed for this
    /// entity.
    pub fn all_rows(&self, entity: &str) -> Result<Vec<FieldMap>> {
        let mut inner = acquire_lock(&self.inner);
        Self::check_fault(&mut inner.fail_select, entity, "select")?;
        Ok(inner
            .tables
            .get(entity)
            .map_or_else(Vec::new, |rows| rows.values().cloned().collect()))
    }

    /// Deletes every row of an entity matching every predicate and returns
    /// the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeDeleteRejected`] when `predicates` is empty,
    /// or [`Error::Backend`] when a delete fault was armed for this entity.
    #[instrument(skip(self, predicates), level = "debug")]
    pub fn delete(&self, entity: &str, predicates: &[Predicate]) -> Result<usize> {
        if predicates.is_empty() {
            return Err(Error::UnsafeDeleteRejected {
                entity: entity.to_string(),
            });
        }

        let start = Instant::now();
        let mut inner = acquire_lock(&self.inner);
        Self::check_fault(&mut inner.fail_delete, entity, "delete")?;

        let removed = inner.tables.get_mut(entity).map_or(0, |rows| {
            let before = rows.len();
            rows.retain(|_, row| !predicates.iter().all(|p| p.matches(row)));
            before - rows.len()
        });
        record_operation_metrics("mock", "delete", start);
        Ok(removed)
    }

    /// Begins a transaction by snapshotting the full table state.
    ///
    /// Transactions do not nest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if a transaction is already open.
    pub fn begin_transaction(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        if inner.snapshot.is_some() {
            return Err(Error::TransactionState(
                "transaction already begun".to_string(),
            ));
        }
        inner.snapshot = Some(inner.tables.clone());
        Ok(())
    }

    /// Commits the open transaction by discarding the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if no transaction is open.
    pub fn commit(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        if inner.snapshot.take().is_none() {
            return Err(Error::TransactionState(
                "no transaction to commit".to_string(),
            ));
        }
        Ok(())
    }

    /// Rolls back the open transaction by restoring the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if no transaction is open.
    pub fn rollback(&self) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        let Some(snapshot) = inner.snapshot.take() else {
            return Err(Error::TransactionState(
                "no transaction to roll back".to_string(),
            ));
        };
        inner.tables = snapshot;
        Ok(())
    }

    /// Arms a one-shot failure for the next select on an entity.
    pub fn fail_next_select(&self, entity: &str) {
        acquire_lock(&self.inner)
            .fail_select
            .insert(entity.to_string());
    }

    /// Arms a one-shot failure for the next save on an entity.
    pub fn fail_next_save(&self, entity: &str) {
        acquire_lock(&self.inner)
            .fail_save
            .insert(entity.to_string());
    }

    /// Arms a one-shot failure for the next delete on an entity.
    pub fn fail_next_delete(&self, entity: &str) {
        acquire_lock(&self.inner)
            .fail_delete
            .insert(entity.to_string());
    }

    /// Replaces an entity's rows with the given field maps, keyed 1..n.
    pub fn seed(&self, entity: &str, rows: Vec<FieldMap>) {
        let mut inner = acquire_lock(&self.inner);
        let table = rows
            .into_iter()
            .zip(1_i64..)
            .map(|(row, key)| (key, row))
            .collect();
        inner.tables.insert(entity.to_string(), table);
    }

    /// Clears all tables, snapshots, and armed faults.
    pub fn reset(&self) {
        let mut inner = acquire_lock(&self.inner);
        *inner = MockInner::default();
    }

    /// Number of rows currently stored for an entity.
    #[must_use]
    pub fn row_count(&self, entity: &str) -> usize {
        acquire_lock(&self.inner)
            .tables
            .get(entity)
            .map_or(0, BTreeMap::len)
    }

    fn check_fault(armed: &mut HashSet<String>, entity: &str, operation: &str) -> Result<()> {
        if armed.remove(entity) {
            return Err(Error::Backend {
                operation: operation.to_string(),
                cause: format!("injected {operation} failure for '{entity}'"),
            });
        }
        Ok(())
    }
}
