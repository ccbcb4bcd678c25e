//! The query gateway: one entry point over either backing store.
//!
//! A [`QueryGateway`] owns the schema registry and one active backend. Data
//! access code talks to the gateway only; whether rows come from `SQLite` or
//! the in-memory mock store is a construction-time choice, which is what
//! makes that code testable without a database.

use crate::config::{BackendKind, GatewayConfig};
use crate::models::{FieldMap, Record, Schema, SchemaRegistry, Value};
use crate::query::{compile_delete, compile_select, Params, QueryOptions, SortDirection};
use crate::storage::{MockStore, SqliteBackend};
use crate::{Error, Result};
use std::cmp::Ordering;
use tracing::instrument;

/// The backing store a gateway was constructed over.
#[derive(Debug)]
enum ActiveBackend {
    Mock(MockStore),
    Sqlite(SqliteBackend),
}

/// A page of records plus the total number of matches before pagination.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// The records in this page.
    pub records: Vec<Record>,
    /// Rows the predicates matched before LIMIT/OFFSET.
    pub total_count: usize,
}

impl QueryResult {
    /// Number of records in this page.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether this page is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for QueryResult {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Schema-aware record gateway over one backing store.
pub struct QueryGateway {
    registry: SchemaRegistry,
    backend: ActiveBackend,
}

impl QueryGateway {
    /// Creates a gateway over a fresh in-memory mock store.
    #[must_use]
    pub fn mock() -> Self {
        Self {
            registry: SchemaRegistry::new(),
            backend: ActiveBackend::Mock(MockStore::new()),
        }
    }

    /// Creates a gateway over a `SQLite` database file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the file cannot be opened.
    pub fn sqlite(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self {
            registry: SchemaRegistry::new(),
            backend: ActiveBackend::Sqlite(SqliteBackend::open(path)?),
        })
    }

    /// Creates a gateway over an in-memory `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the connection cannot be created.
    pub fn sqlite_in_memory() -> Result<Self> {
        Ok(Self {
            registry: SchemaRegistry::new(),
            backend: ActiveBackend::Sqlite(SqliteBackend::in_memory()?),
        })
    }

    /// Creates a gateway from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the configured database cannot be
    /// opened.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        match config.backend {
            BackendKind::Mock => Ok(Self::mock()),
            BackendKind::Sqlite => config
                .database_path
                .as_ref()
                .map_or_else(Self::sqlite_in_memory, Self::sqlite),
        }
    }

    /// Registers a schema under an entity-type name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJoinConfiguration`] for an invalid join
    /// descriptor, or [`Error::Backend`] if the name is already taken.
    pub fn register_schema(&mut self, entity: impl Into<String>, schema: Schema) -> Result<()> {
        self.registry.register(entity, schema)
    }

    /// The mock store, when this gateway runs over one.
    ///
    /// Gives tests access to seeding, fault injection, and row counts.
    #[must_use]
    pub const fn mock_store(&self) -> Option<&MockStore> {
        match &self.backend {
            ActiveBackend::Mock(store) => Some(store),
            ActiveBackend::Sqlite(_) => None,
        }
    }

    /// The `SQLite` backend, when this gateway runs over one.
    ///
    /// Gives callers access to DDL via `execute_batch`.
    #[must_use]
    pub const fn sqlite_backend(&self) -> Option<&SqliteBackend> {
        match &self.backend {
            ActiveBackend::Sqlite(backend) => Some(backend),
            ActiveBackend::Mock(_) => None,
        }
    }

    /// Creates an unsaved record for a registered entity type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] if the type was never registered.
    pub fn create<I, K, V>(&self, entity: &str, fields: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let schema = self.registry.get(entity)?;
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Ok(Record::from_fields(entity, schema, fields))
    }

    /// Fetches the first record matching the parsed predicates.
    ///
    /// `for_update` requests row locking on backends that support it; the
    /// mock store ignores it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] for an unregistered type, or
    /// [`Error::Backend`] on backend failure.
    #[instrument(skip(self, params), level = "debug")]
    pub fn get_one(&self, entity: &str, params: &Params, for_update: bool) -> Result<Option<Record>> {
        let schema = self.registry.get(entity)?;
        let predicates = params.parse();

        let row = match &self.backend {
            ActiveBackend::Mock(store) => store.get_one(entity, &predicates)?,
            ActiveBackend::Sqlite(backend) => {
                let mut opts = QueryOptions::default().with_limit(1);
                if for_update {
                    opts = opts.for_update();
                }
                let compiled = compile_select(&schema, &predicates, &opts)?;
                let (mut rows, _) = backend.select(&compiled)?;
                if rows.is_empty() {
                    None
                } else {
                    Some(rows.swap_remove(0))
                }
            },
        };

        Ok(row.map(|fields| Record::from_fields(entity, schema.clone(), fields)))
    }

    /// Fetches every record matching the parsed predicates, with optional
    /// ordering, pagination, and (on capable backends) row locking.
    ///
    /// The returned [`QueryResult`] carries the total number of matches
    /// before the page window, so callers can paginate without a second
    /// query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] for an unregistered type, or
    /// [`Error::Backend`] on backend failure.
    #[instrument(skip(self, params, opts), level = "debug")]
    pub fn get_many(&self, entity: &str, params: &Params, opts: &QueryOptions) -> Result<QueryResult> {
        let schema = self.registry.get(entity)?;
        let predicates = params.parse();

        let (rows, total_count) = match &self.backend {
            ActiveBackend::Mock(store) => {
                let mut rows = store.get_many(entity, &predicates)?;
                if let Some(sort_by) = opts.sort_by.as_deref() {
                    sort_rows(&mut rows, sort_by, opts.sort_direction);
                }
                let total = rows.len();
                let page: Vec<FieldMap> = rows
                    .into_iter()
                    .skip(opts.offset.unwrap_or(0))
                    .take(opts.limit.unwrap_or(usize::MAX))
                    .collect();
                (page, total)
            },
            ActiveBackend::Sqlite(backend) => {
                let compiled = compile_select(&schema, &predicates, opts)?;
                backend.select(&compiled)?
            },
        };

        let records = rows
            .into_iter()
            .map(|fields| Record::from_fields(entity, schema.clone(), fields))
            .collect();
        Ok(QueryResult {
            records,
            total_count,
        })
    }

    /// Runs a caller-written SELECT and materializes the rows as records of
    /// the given entity type.
    ///
    /// The mock store has no SQL engine; there the statement is ignored and
    /// the entity's whole table comes back, a deliberate asymmetry that
    /// keeps consumer code runnable in tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on statement failure, and
    /// [`Error::UnknownEntity`] for an unregistered type.
    #[instrument(skip(self, sql, params), level = "debug")]
    pub fn get_many_by_raw_query(
        &self,
        entity: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Record>> {
        let schema = self.registry.get(entity)?;
        let rows = match &self.backend {
            ActiveBackend::Sqlite(backend) => backend.raw_query(sql, params)?,
            ActiveBackend::Mock(store) => store.all_rows(entity)?,
        };
        Ok(rows
            .into_iter()
            .map(|fields| Record::from_fields(entity, schema.clone(), fields))
            .collect())
    }

    /// Persists a record and returns the resulting primary-key value.
    ///
    /// Inserts when the record has no numeric primary key yet, updating the
    /// record's primary-key field with the generated key; updates in place
    /// otherwise. Join-populated output aliases never reach the store, and
    /// the primary key is never part of an UPDATE's SET list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] on backend failure.
    #[instrument(skip(self, record), level = "debug")]
    pub fn save(&self, record: &mut Record) -> Result<Value> {
        let schema = record.schema().clone();
        let synthetic = schema.synthetic_columns();
        let primary_key = schema.primary_key.as_deref();

        let stored: FieldMap = record
            .to_map()
            .into_iter()
            .filter(|(name, value)| {
                !synthetic.contains(&name.as_str())
                    && !(Some(name.as_str()) == primary_key && value.is_null())
            })
            .collect();

        let pk_value = match &self.backend {
            ActiveBackend::Mock(store) => store.save(record.entity(), primary_key, &stored)?,
            ActiveBackend::Sqlite(backend) => {
                if record.is_persisted() {
                    let key = record
                        .primary_key_value()
                        .cloned()
                        .unwrap_or(Value::Null);
                    let pk = primary_key.unwrap_or_default();
                    backend.update(&schema.table_name, pk, &key, &stored, &[])?;
                    key
                } else {
                    Value::Int(backend.insert(&schema.table_name, &stored)?)
                }
            },
        };

        if let Some(pk) = primary_key {
            record.set(pk, pk_value.clone());
        }
        Ok(pk_value)
    }

    /// Deletes every record matching the parsed predicates and returns the
    /// number removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeDeleteRejected`] when `params` is empty,
    /// [`Error::UnknownEntity`] for an unregistered type, or
    /// [`Error::Backend`] on backend failure.
    #[instrument(skip(self, params), level = "debug")]
    pub fn delete(&self, entity: &str, params: &Params) -> Result<usize> {
        let schema = self.registry.get(entity)?;
        let predicates = params.parse();

        match &self.backend {
            ActiveBackend::Mock(store) => store.delete(entity, &predicates),
            ActiveBackend::Sqlite(backend) => {
                let compiled = compile_delete(&schema, &predicates)?;
                backend.execute_delete(&compiled)
            },
        }
    }

    /// Deletes one persisted record by its primary key and returns the
    /// number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeDeleteRejected`] when the record has no
    /// numeric primary key, or [`Error::Backend`] on backend failure.
    pub fn delete_record(&self, record: &Record) -> Result<usize> {
        let schema = record.schema();
        let (Some(pk), true) = (schema.primary_key.clone(), record.is_persisted()) else {
            return Err(Error::UnsafeDeleteRejected {
                entity: record.entity().to_string(),
            });
        };

        let mut params = Params::new();
        params.insert(
            pk,
            record.primary_key_value().cloned().unwrap_or(Value::Null),
        );
        self.delete(record.entity(), &params)
    }

    /// Begins a transaction on the active backend.
    ///
    /// Transactions do not nest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if one is already open.
    pub fn begin_transaction(&self) -> Result<()> {
        match &self.backend {
            ActiveBackend::Mock(store) => store.begin_transaction(),
            ActiveBackend::Sqlite(backend) => backend.begin_transaction(),
        }
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if none is open.
    pub fn commit(&self) -> Result<()> {
        match &self.backend {
            ActiveBackend::Mock(store) => store.commit(),
            ActiveBackend::Sqlite(backend) => backend.commit(),
        }
    }

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionState`] if none is open.
    pub fn rollback(&self) -> Result<()> {
        match &self.backend {
            ActiveBackend::Mock(store) => store.rollback(),
            ActiveBackend::Sqlite(backend) => backend.rollback(),
        }
    }
}

impl std::fmt::Debug for QueryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            ActiveBackend::Mock(_) => "mock",
            ActiveBackend::Sqlite(_) => "sqlite",
        };
        f.debug_struct("QueryGateway")
            .field("backend", &backend)
            .finish_non_exhaustive()
    }
}

/// Sorts rows by one field, nulls (and missing fields) first in ascending
/// order. Matches the relational backend, where NULL sorts before every
/// value.
fn sort_rows(rows: &mut [FieldMap], sort_by: &str, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let left = a.get(sort_by);
        let right = b.get(sort_by);
        let ordering = match (left, right) {
            (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
            (None | Some(Value::Null), Some(_)) => Ordering::Less,
            (Some(_), None | Some(Value::Null)) => Ordering::Greater,
            (Some(l), Some(r)) => l.compare(r).unwrap_or(Ordering::Equal),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PredicateValue;

    fn mock_gateway() -> QueryGateway {
        let mut gateway = QueryGateway::mock();
        gateway
            .register_schema("user", Schema::new("users", "u").with_primary_key("id"))
            .unwrap();
        gateway
    }

    fn seed_users(gateway: &QueryGateway) {
        for name in ["Ann", "Bo"] {
            let mut record = gateway.create("user", [("name", name)]).unwrap();
            gateway.save(&mut record).unwrap();
        }
    }

    fn params(pairs: &[(&str, PredicateValue)]) -> Params {
        let mut params = Params::new();
        for (key, value) in pairs {
            params.insert(*key, value.clone());
        }
        params
    }

    #[test]
    fn test_create_requires_registered_entity() {
        let gateway = mock_gateway();
        assert!(gateway.create("user", [("name", "Ann")]).is_ok());
        assert!(matches!(
            gateway.create("order", [("total", 10)]).unwrap_err(),
            Error::UnknownEntity(_)
        ));
    }

    #[test]
    fn test_save_inserts_then_updates() {
        let gateway = mock_gateway();

        let mut record = gateway.create("user", [("name", "Ann")]).unwrap();
        assert!(!record.is_persisted());
        gateway.save(&mut record).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Int(1)));

        record.set("name", "Anna");
        gateway.save(&mut record).unwrap();
        assert_eq!(gateway.mock_store().unwrap().row_count("user"), 1);

        let fetched = gateway
            .get_one("user", &params(&[("id", PredicateValue::from(1))]), false)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.get("name"), Some(&Value::from("Anna")));
    }

    #[test]
    fn test_get_one_with_negated_predicate() {
        let gateway = mock_gateway();
        seed_users(&gateway);

        let found = gateway
            .get_one("user", &params(&[("not_id", PredicateValue::from(1))]), false)
            .unwrap()
            .unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("Bo")));
    }

    #[test]
    fn test_get_many_sorts_and_paginates_with_total() {
        let gateway = mock_gateway();
        for name in ["Cy", "Ann", "Bo", "Di"] {
            let mut record = gateway.create("user", [("name", name)]).unwrap();
            gateway.save(&mut record).unwrap();
        }

        let result = gateway
            .get_many(
                "user",
                &Params::new(),
                &QueryOptions::default()
                    .with_sort("name", SortDirection::Asc)
                    .with_offset(1)
                    .with_limit(2),
            )
            .unwrap();

        assert_eq!(result.total_count, 4);
        let names: Vec<_> = result
            .records
            .iter()
            .map(|r| r.get("name").cloned().unwrap())
            .collect();
        assert_eq!(names, vec![Value::from("Bo"), Value::from("Cy")]);
    }

    #[test]
    fn test_mock_sort_puts_nulls_first_ascending() {
        let gateway = mock_gateway();
        for age in [Value::Int(30), Value::Null, Value::Int(20)] {
            let mut record = gateway.create("user", [("age", age)]).unwrap();
            gateway.save(&mut record).unwrap();
        }

        let result = gateway
            .get_many(
                "user",
                &Params::new(),
                &QueryOptions::default().with_sort("age", SortDirection::Asc),
            )
            .unwrap();
        let ages: Vec<_> = result
            .records
            .iter()
            .map(|r| r.get("age").cloned().unwrap())
            .collect();
        assert_eq!(ages, vec![Value::Null, Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn test_raw_query_on_mock_returns_whole_table() {
        let gateway = mock_gateway();
        seed_users(&gateway);

        let records = gateway
            .get_many_by_raw_query("user", "SELECT * FROM users WHERE name = ?", &[])
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_delete_record_by_primary_key() {
        let gateway = mock_gateway();
        seed_users(&gateway);

        let record = gateway
            .get_one("user", &params(&[("name", PredicateValue::from("Ann"))]), false)
            .unwrap()
            .unwrap();
        assert_eq!(gateway.delete_record(&record).unwrap(), 1);
        assert_eq!(gateway.mock_store().unwrap().row_count("user"), 1);

        let unsaved = gateway.create("user", [("name", "Ghost")]).unwrap();
        assert!(matches!(
            gateway.delete_record(&unsaved).unwrap_err(),
            Error::UnsafeDeleteRejected { .. }
        ));
    }

    #[test]
    fn test_delete_requires_predicates_on_both_paths() {
        let gateway = mock_gateway();
        seed_users(&gateway);
        assert!(matches!(
            gateway.delete("user", &Params::new()).unwrap_err(),
            Error::UnsafeDeleteRejected { .. }
        ));
    }

    #[test]
    fn test_transaction_rollback_restores_state() {
        let gateway = mock_gateway();
        seed_users(&gateway);

        gateway.begin_transaction().unwrap();
        gateway
            .delete("user", &params(&[("id", PredicateValue::from(1))]))
            .unwrap();
        gateway.rollback().unwrap();
        assert_eq!(gateway.mock_store().unwrap().row_count("user"), 2);
    }

    #[test]
    fn test_from_config_selects_backend() {
        let config = GatewayConfig {
            backend: BackendKind::Mock,
            ..GatewayConfig::default()
        };
        let gateway = QueryGateway::from_config(&config).unwrap();
        assert!(gateway.mock_store().is_some());

        let config = GatewayConfig {
            backend: BackendKind::Sqlite,
            database_path: None,
        };
        let gateway = QueryGateway::from_config(&config).unwrap();
        assert!(gateway.sqlite_backend().is_some());
    }
}
