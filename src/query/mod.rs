//! Query layer: the predicate grammar and its SQL compiler.
//!
//! Predicates are parsed once from caller-supplied parameters and then
//! interpreted by both backends, so a given filter matches the same rows
//! in memory and in SQL.

mod predicate;
mod sql;

pub use predicate::{Operator, Params, Predicate, PredicateValue};
pub use sql::{
    compile_delete, compile_select, escape_like_wildcards, sanitize_order_column, sql_literal,
    CompiledDelete, CompiledSelect,
};

/// Sort direction for an ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// SQL keyword for this direction.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Pagination, ordering, and locking options for a multi-row fetch.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Request row locking where the backend supports it.
    pub for_update: bool,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Number of matching rows to skip.
    pub offset: Option<usize>,
    /// Column to sort by; sanitized before reaching statement text.
    pub sort_by: Option<String>,
    /// Direction for `sort_by`.
    pub sort_direction: SortDirection,
}

impl QueryOptions {
    /// Creates default options: no pagination, no ordering, no locking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of returned rows.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching rows.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Orders results by a column.
    #[must_use]
    pub fn with_sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(column.into());
        self.sort_direction = direction;
        self
    }

    /// Requests row locking on backends that support it.
    #[must_use]
    pub const fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}
