//! Tagged scalar values.
//!
//! Every record field holds a [`Value`]: string, integer, float, or null.
//! Equality is numeric across `Int`/`Float`; ordering follows SQL
//! three-valued comparison, collapsing to "no ordering" whenever null is
//! involved so that predicate evaluation matches the relational backend.

// Float equality here is intentional: the mock matcher must agree with the
// database, which compares stored REAL values exactly.
#![allow(clippy::float_cmp)]
#![allow(clippy::cast_precision_loss)]

use rusqlite::ToSql;
use rusqlite::types::{Null as SqlNull, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A tagged scalar held by a record field or bound to a statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / SQL NULL.
    #[default]
    Null,
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for `Int` and `Float` values.
    ///
    /// A record whose primary-key field is numeric counts as persisted.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(_) | Self::Null => None,
        }
    }

    /// Textual rendering used by substring (LIKE) matching.
    ///
    /// Numbers render the way `SQLite` casts them to TEXT; null has no
    /// text and therefore matches neither `LIKE` nor `NOT LIKE`.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Str(s) => Some(s.clone()),
        }
    }

    /// Ordering comparison with SQL semantics.
    ///
    /// Returns `None` when either side is null or the types are not
    /// comparable (string vs. number), so range predicates never match
    /// through null, exactly as `>` / `<` behave in SQL.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Canonical, order-stable token used by record content hashing.
    ///
    /// Floats are coerced to a fixed 6-decimal rendering so hashes stay
    /// stable across numeric formatting differences; tokens are type-tagged
    /// so `1` and `"1"` never collide.
    #[must_use]
    pub fn canonical_token(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Int(i) => format!("i:{i}"),
            Self::Float(f) => format!("f:{f:.6}"),
            Self::Str(s) => format!("s:{s}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(SqlNull),
            Self::Int(i) => ToSqlOutput::from(*i),
            Self::Float(f) => ToSqlOutput::from(*f),
            Self::Str(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Int(i),
            ValueRef::Real(f) => Self::Float(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Self::Str(String::from_utf8_lossy(t).into_owned())
            },
        }
    }
}
