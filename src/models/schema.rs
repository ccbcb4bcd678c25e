//! Entity schemas, join descriptors, and the schema registry.
//!
//! A [`Schema`] describes one entity type: its table, alias, optional
//! primary-key field, and an ordered list of single-level joins. Schemas are
//! immutable after registration; the gateway hands out `Arc` clones.

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Join kind for a [`JoinDefinition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    /// LEFT OUTER JOIN.
    Left,
    /// RIGHT OUTER JOIN.
    Right,
    /// INNER JOIN.
    Inner,
}

impl JoinKind {
    /// SQL keyword for this join kind.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Inner => "INNER",
        }
    }
}

/// One single-level join hanging off a schema.
///
/// `columns` maps source columns on the joined table to output aliases.
/// Those aliases are "synthetic columns": populated by the join on read,
/// never written back to the owning table on update. The ON clause is a
/// template; `{alias}` is substituted with the synthetic table alias
/// (`<table_alias><declaration index>`) at compile time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinDefinition {
    /// Join kind (LEFT/RIGHT/INNER).
    pub kind: JoinKind,
    /// Target table name.
    pub table_name: String,
    /// Target table alias; the per-query alias appends the join index.
    pub table_alias: String,
    /// Source column on the joined table → output alias in the result row.
    pub columns: IndexMap<String, String>,
    /// ON-clause template with an `{alias}` placeholder.
    pub on: String,
}

impl JoinDefinition {
    /// Creates a join descriptor with an empty column mapping.
    pub fn new(
        kind: JoinKind,
        table_name: impl Into<String>,
        table_alias: impl Into<String>,
        on: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table_name: table_name.into(),
            table_alias: table_alias.into(),
            columns: IndexMap::new(),
            on: on.into(),
        }
    }

    /// Adds one source-column → output-alias mapping.
    #[must_use]
    pub fn with_column(mut self, source: impl Into<String>, alias: impl Into<String>) -> Self {
        self.columns.insert(source.into(), alias.into());
        self
    }

    /// Checks that every required attribute is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJoinConfiguration`] with the descriptor
    /// serialized into the message when the target table, column mapping,
    /// or ON template is empty.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() || self.on.is_empty() || self.columns.is_empty() {
            return Err(Error::InvalidJoinConfiguration {
                detail: serde_json::to_string(self)
                    .unwrap_or_else(|_| "<unserializable join>".to_string()),
            });
        }
        Ok(())
    }
}

/// Immutable description of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Backing table name.
    pub table_name: String,
    /// Alias used for the table in compiled queries.
    pub table_alias: String,
    /// Primary-key field, if the entity has one.
    pub primary_key: Option<String>,
    /// Joins, emitted in declaration order.
    pub joins: Vec<JoinDefinition>,
}

impl Schema {
    /// Creates a schema with no primary key and no joins.
    pub fn new(table_name: impl Into<String>, table_alias: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            table_alias: table_alias.into(),
            primary_key: None,
            joins: Vec::new(),
        }
    }

    /// Sets the primary-key field.
    #[must_use]
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Appends a join descriptor.
    #[must_use]
    pub fn with_join(mut self, join: JoinDefinition) -> Self {
        self.joins.push(join);
        self
    }

    /// All join output aliases.
    ///
    /// These fields are populated by joins on read and must never appear in
    /// an UPDATE's SET list.
    #[must_use]
    pub fn synthetic_columns(&self) -> Vec<&str> {
        self.joins
            .iter()
            .flat_map(|j| j.columns.values().map(String::as_str))
            .collect()
    }

    /// Validates every join descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJoinConfiguration`] for the first invalid
    /// descriptor.
    pub fn validate_joins(&self) -> Result<()> {
        for join in &self.joins {
            join.validate()?;
        }
        Ok(())
    }
}

/// Maps entity-type names to registered schemas.
///
/// Registration is set-once: re-registering a name is an error, keeping
/// schema metadata immutable for the lifetime of the gateway.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under an entity-type name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJoinConfiguration`] if a join descriptor is
    /// invalid, or [`Error::Backend`] if the name is already taken.
    pub fn register(&mut self, entity: impl Into<String>, schema: Schema) -> Result<()> {
        let entity = entity.into();
        schema.validate_joins()?;
        if self.schemas.contains_key(&entity) {
            return Err(Error::Backend {
                operation: "register_schema".to_string(),
                cause: format!("entity type '{entity}' is already registered"),
            });
        }
        self.schemas.insert(entity, Arc::new(schema));
        Ok(())
    }

    /// Looks up the schema for an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] if the name was never registered.
    pub fn get(&self, entity: &str) -> Result<Arc<Schema>> {
        self.schemas
            .get(entity)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    /// Returns `true` if the entity type is registered.
    #[must_use]
    pub fn contains(&self, entity: &str) -> bool {
        self.schemas.contains_key(entity)
    }
}
