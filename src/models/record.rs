//! Persisted rows: ordered field map, primary-key state, content hashing.

use crate::models::{Schema, Value};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Ordered mapping from field name to scalar value.
///
/// Insertion order is preserved; the mock store and the SQL backend both
/// materialize rows in column order.
pub type FieldMap = IndexMap<String, Value>;

/// One persisted (or to-be-persisted) row of an entity type.
///
/// A record carries the entity-type name it was created under and a shared
/// reference to its [`Schema`]. The primary-key value, once non-null and
/// numeric, marks the record as persisted: saving it then updates in place
/// instead of inserting.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: String,
    schema: Arc<Schema>,
    fields: FieldMap,
}

impl Record {
    /// Creates an empty record for an entity type.
    pub fn new(entity: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self {
            entity: entity.into(),
            schema,
            fields: FieldMap::new(),
        }
    }

    /// Creates a record from an existing field map (a fetched row).
    pub fn from_fields(entity: impl Into<String>, schema: Arc<Schema>, fields: FieldMap) -> Self {
        Self {
            entity: entity.into(),
            schema,
            fields,
        }
    }

    /// The entity-type name this record belongs to.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The schema this record was materialized under.
    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns a field value, or `None` if the field was never set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field value, preserving first-insertion order.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Borrowed view of the full field map.
    #[must_use]
    pub const fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Owned copy of the full field map.
    #[must_use]
    pub fn to_map(&self) -> FieldMap {
        self.fields.clone()
    }

    /// The current primary-key value, if the schema names one and it is set.
    #[must_use]
    pub fn primary_key_value(&self) -> Option<&Value> {
        self.schema
            .primary_key
            .as_deref()
            .and_then(|pk| self.fields.get(pk))
    }

    /// Whether this record already exists in the backing store.
    ///
    /// True when the primary-key field is set, non-null, and numeric; a save
    /// then performs an update keyed by that value instead of an insert.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.primary_key_value().is_some_and(Value::is_numeric)
    }

    /// Deterministic content hash of the record's fields.
    ///
    /// Hashes a canonical, order-stable serialization: field names sorted,
    /// each paired with its type-tagged token (floats coerced to a fixed
    /// rendering, see [`Value::canonical_token`]). With `fields` given, only
    /// the allowlisted fields participate, so edits outside the allowlist
    /// leave the hash unchanged.
    #[must_use]
    pub fn content_hash(&self, fields: Option<&[&str]>) -> String {
        let mut pairs: Vec<(&str, String)> = self
            .fields
            .iter()
            .filter(|(name, _)| fields.is_none_or(|allow| allow.contains(&name.as_str())))
            .map(|(name, value)| (name.as_str(), value.canonical_token()))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha256::new();
        for (name, token) in pairs {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(token.as_bytes());
            hasher.update(b";");
        }
        hex::encode(hasher.finalize())
    }
}
