//! # Rowgate
//!
//! A record-persistence layer with two interchangeable backing stores behind
//! one interface: a relational backend (`SQLite` via prepared statements) and
//! an in-process mock store that makes data-access code testable without a
//! live database.
//!
//! Both backends consume the same predicate grammar: a map from encoded field
//! names (`not_id`, `greater_age`, `like_name`, ...) to values is parsed once
//! into tagged [`Predicate`](query::Predicate) terms, then either compiled to
//! parameterized SQL or evaluated directly against in-memory tables. Any
//! divergence between backends must trace to that shared parse step, never to
//! duplicated matching logic.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rowgate::{Params, QueryGateway, QueryOptions, Schema, Value};
//!
//! let mut gateway = QueryGateway::mock();
//! gateway.register_schema("user", Schema::new("users", "u").with_primary_key("id"))?;
//!
//! let mut record = gateway.create("user", [("name", Value::from("Ann"))])?;
//! gateway.save(&mut record)?; // primary key assigned on insert
//!
//! let mut params = Params::new();
//! params.insert("like_name", "An");
//! let result = gateway.get_many("user", &params, &QueryOptions::default())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod gateway;
pub mod models;
pub mod query;
pub mod storage;

// Re-exports for convenience
pub use config::{BackendKind, GatewayConfig};
pub use gateway::{QueryGateway, QueryResult};
pub use models::{JoinDefinition, JoinKind, Record, Schema, SchemaRegistry, Value};
pub use query::{Operator, Params, Predicate, QueryOptions, SortDirection};
pub use storage::{MockStore, SqliteBackend};

/// Error type for rowgate operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidJoinConfiguration` | A join descriptor is missing a required attribute |
/// | `UnsafeDeleteRejected` | Delete attempted with an empty predicate map |
/// | `TransactionState` | Nested begin, or commit/rollback with no active transaction |
/// | `UnknownEntity` | Query against an entity type never registered with the gateway |
/// | `Backend` | Opaque passthrough of connection/statement failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A join descriptor is missing a required attribute.
    ///
    /// Raised when a [`JoinDefinition`] has an empty target table, an empty
    /// column mapping, or an empty ON-clause template. The offending
    /// descriptor is serialized into the message for diagnosis.
    #[error("invalid join configuration: {detail}")]
    InvalidJoinConfiguration {
        /// JSON rendering of the offending join descriptor.
        detail: String,
    },

    /// A delete was attempted with no predicates.
    ///
    /// An unpredicated delete would wipe the whole table; both backends
    /// reject it before any statement is built or any row is touched.
    #[error("unsafe delete rejected: no predicates given for '{entity}'")]
    UnsafeDeleteRejected {
        /// The entity type the delete targeted.
        entity: String,
    },

    /// Transaction control was called in the wrong state.
    ///
    /// Raised on `begin_transaction` while a transaction is already active,
    /// or on `commit`/`rollback` with none active. Only one transaction
    /// depth is supported.
    #[error("transaction state error: {0}")]
    TransactionState(String),

    /// A query referenced an entity type with no registered schema.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// An operation failed in the underlying backend.
    ///
    /// Raised when:
    /// - `SQLite` statement preparation or execution fails
    /// - Configuration files cannot be read or parsed
    /// - Mock fault injection is armed for the operation
    #[error("backend operation '{operation}' failed: {cause}")]
    Backend {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for rowgate operations.
pub type Result<T> = std::result::Result<T, Error>;
