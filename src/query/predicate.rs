//! The shared predicate grammar.
//!
//! Filter conditions arrive as a map from encoded field names to values:
//! `not_id => 1`, `greater_age => 30`, `like_name => "An"`. Each key is
//! parsed once into a tagged [`Predicate`]; the SQL compiler, the delete
//! path, and the mock matcher all consume the same parsed form, so the two
//! backends cannot drift apart in how they read a filter.

use crate::models::{FieldMap, Value};
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Filter operator, derived from the encoded key and value shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `field = value`.
    Equals,
    /// `field != value`.
    NotEquals,
    /// `field > value`.
    GreaterThan,
    /// `field < value`.
    LowerThan,
    /// `field IN (values)`.
    In,
    /// `field NOT IN (values)`.
    NotIn,
    /// Substring containment (`LIKE` with automatic wildcard wrapping).
    Like,
    /// Negated substring containment.
    NotLike,
    /// `field IS NULL`.
    IsNull,
    /// `field IS NOT NULL`.
    IsNotNull,
}

/// The right-hand side of a predicate: one scalar or a list of scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateValue {
    /// A single scalar (possibly [`Value::Null`]).
    Scalar(Value),
    /// A list of scalars, for membership operators.
    List(Vec<Value>),
}

impl PredicateValue {
    /// Normalizes to a list, wrapping a scalar as a one-element list.
    #[must_use]
    pub fn into_list(self) -> Self {
        match self {
            Self::Scalar(v) => Self::List(vec![v]),
            list @ Self::List(_) => list,
        }
    }
}

impl From<Value> for PredicateValue {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl From<i64> for PredicateValue {
    fn from(v: i64) -> Self {
        Self::Scalar(Value::Int(v))
    }
}

impl From<i32> for PredicateValue {
    fn from(v: i32) -> Self {
        Self::Scalar(Value::Int(i64::from(v)))
    }
}

impl From<f64> for PredicateValue {
    fn from(v: f64) -> Self {
        Self::Scalar(Value::Float(v))
    }
}

impl From<&str> for PredicateValue {
    fn from(v: &str) -> Self {
        Self::Scalar(Value::from(v))
    }
}

impl From<String> for PredicateValue {
    fn from(v: String) -> Self {
        Self::Scalar(Value::Str(v))
    }
}

impl From<Vec<Value>> for PredicateValue {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<i64>> for PredicateValue {
    fn from(v: Vec<i64>) -> Self {
        Self::List(v.into_iter().map(Value::Int).collect())
    }
}

impl From<Vec<&str>> for PredicateValue {
    fn from(v: Vec<&str>) -> Self {
        Self::List(v.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<String>> for PredicateValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v.into_iter().map(Value::Str).collect())
    }
}

/// An ordered predicate map, as supplied by callers.
#[derive(Debug, Clone, Default)]
pub struct Params(IndexMap<String, PredicateValue>);

impl Params {
    /// Creates an empty predicate map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an encoded key with its value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PredicateValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PredicateValue)> {
        self.0.iter()
    }

    /// Parses every entry into a [`Predicate`], preserving order.
    #[must_use]
    pub fn parse(&self) -> Vec<Predicate> {
        self.0
            .iter()
            .map(|(key, value)| Predicate::parse(key, value.clone()))
            .collect()
    }
}

/// Prefixes in priority order: the most specific prefix wins, so `not_like_`
/// is tested before `not_`. This order is a boundary contract; changing it
/// changes the meaning of existing predicate maps.
const PREFIXES: [(&str, Operator); 7] = [
    ("is_not_null_", Operator::IsNotNull),
    ("not_like_", Operator::NotLike),
    ("not_in_", Operator::NotIn),
    ("not_", Operator::NotEquals),
    ("like_", Operator::Like),
    ("greater_", Operator::GreaterThan),
    ("lower_", Operator::LowerThan),
];

/// A parsed filter condition: field, operator, value.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Bare field name, prefix stripped.
    pub field: String,
    /// Derived operator.
    pub operator: Operator,
    /// Right-hand side.
    pub value: PredicateValue,
}

impl Predicate {
    /// Parses an encoded key and value into a predicate.
    ///
    /// The operator is derived deterministically: the prefix table above in
    /// priority order, then value-shape fallbacks — null value means
    /// `IS NULL`, a list means `IN`, anything else `=`. The result is then
    /// normalized (see [`Self::normalize`]) so both backends read the same
    /// shape.
    #[must_use]
    pub fn parse(key: &str, value: PredicateValue) -> Self {
        for (prefix, operator) in PREFIXES {
            if let Some(field) = key.strip_prefix(prefix) {
                let (operator, value) = Self::normalize(operator, value);
                return Self {
                    field: field.to_string(),
                    operator,
                    value,
                };
            }
        }

        let operator = match &value {
            PredicateValue::Scalar(Value::Null) => Operator::IsNull,
            PredicateValue::List(_) => Operator::In,
            PredicateValue::Scalar(_) => Operator::Equals,
        };
        let (operator, value) = Self::normalize(operator, value);
        Self {
            field: key.to_string(),
            operator,
            value,
        }
    }

    /// Normalizes degenerate operator/value pairings into their canonical
    /// form.
    ///
    /// A list under an equality operator becomes the corresponding
    /// membership operator, membership values are coerced to lists, and
    /// null elements are dropped from membership lists (SQL `IN`/`NOT IN`
    /// can never match through NULL, so keeping them would only let the
    /// backends disagree).
    fn normalize(operator: Operator, value: PredicateValue) -> (Operator, PredicateValue) {
        match (operator, value) {
            (Operator::Equals, value @ PredicateValue::List(_)) => {
                (Operator::In, Self::strip_null_elements(value))
            },
            (Operator::NotEquals, value @ PredicateValue::List(_)) => {
                (Operator::NotIn, Self::strip_null_elements(value))
            },
            (Operator::In | Operator::NotIn, value) => {
                (operator, Self::strip_null_elements(value.into_list()))
            },
            (operator, value) => (operator, value),
        }
    }

    fn strip_null_elements(value: PredicateValue) -> PredicateValue {
        match value {
            PredicateValue::List(vs) => {
                PredicateValue::List(vs.into_iter().filter(|v| !v.is_null()).collect())
            },
            scalar @ PredicateValue::Scalar(_) => scalar,
        }
    }

    /// Evaluates this predicate against one in-memory row.
    ///
    /// Semantics mirror the compiled SQL exactly: a missing field reads as
    /// null; null never satisfies equality, inequality, range, membership,
    /// or substring operators (three-valued logic collapses to "no match",
    /// on either side of the comparison); `LIKE` is case-sensitive substring
    /// containment.
    #[must_use]
    pub fn matches(&self, row: &FieldMap) -> bool {
        let field_value = row.get(&self.field).cloned().unwrap_or(Value::Null);

        match (self.operator, &self.value) {
            (Operator::Equals, PredicateValue::Scalar(v)) => {
                !v.is_null() && field_value == *v
            },
            (Operator::Equals, PredicateValue::List(vs)) => {
                !field_value.is_null() && vs.contains(&field_value)
            },
            (Operator::NotEquals, PredicateValue::Scalar(v)) => {
                !field_value.is_null() && !v.is_null() && field_value != *v
            },
            (Operator::NotEquals, PredicateValue::List(vs)) => {
                !field_value.is_null() && !vs.contains(&field_value)
            },
            (Operator::GreaterThan, PredicateValue::Scalar(v)) => {
                field_value.compare(v) == Some(Ordering::Greater)
            },
            (Operator::LowerThan, PredicateValue::Scalar(v)) => {
                field_value.compare(v) == Some(Ordering::Less)
            },
            (Operator::GreaterThan | Operator::LowerThan, PredicateValue::List(_)) => false,
            (Operator::In, PredicateValue::List(vs)) => {
                !field_value.is_null() && vs.contains(&field_value)
            },
            (Operator::In, PredicateValue::Scalar(v)) => {
                !field_value.is_null() && field_value == *v
            },
            (Operator::NotIn, PredicateValue::List(vs)) => {
                !field_value.is_null() && !vs.contains(&field_value)
            },
            (Operator::NotIn, PredicateValue::Scalar(v)) => {
                !field_value.is_null() && field_value != *v
            },
            (Operator::Like, v) => Self::like_match(&field_value, v).unwrap_or(false),
            (Operator::NotLike, v) => {
                Self::like_match(&field_value, v).is_some_and(|matched| !matched)
            },
            (Operator::IsNull, _) => field_value.is_null(),
            (Operator::IsNotNull, _) => !field_value.is_null(),
        }
    }

    /// Substring containment; `None` when either side is null (or a list),
    /// which fails both `LIKE` and `NOT LIKE` as it does in SQL.
    fn like_match(field_value: &Value, pattern: &PredicateValue) -> Option<bool> {
        let PredicateValue::Scalar(pattern) = pattern else {
            return None;
        };
        let haystack = field_value.to_text()?;
        let needle = pattern.to_text()?;
        Some(haystack.contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn row(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test_case("not_id", Operator::NotEquals, "id"; "not strips prefix")]
    #[test_case("not_like_name", Operator::NotLike, "name"; "not_like wins over not")]
    #[test_case("not_in_id", Operator::NotIn, "id"; "not_in wins over not")]
    #[test_case("is_not_null_email", Operator::IsNotNull, "email"; "is_not_null is most specific")]
    #[test_case("like_name", Operator::Like, "name"; "like")]
    #[test_case("greater_age", Operator::GreaterThan, "age"; "greater")]
    #[test_case("lower_age", Operator::LowerThan, "age"; "lower")]
    fn test_prefix_priority(key: &str, operator: Operator, field: &str) {
        let predicate = Predicate::parse(key, PredicateValue::from(1));
        assert_eq!(predicate.operator, operator);
        assert_eq!(predicate.field, field);
    }

    #[test]
    fn test_value_shape_fallbacks() {
        let null = Predicate::parse("email", PredicateValue::Scalar(Value::Null));
        assert_eq!(null.operator, Operator::IsNull);

        let list = Predicate::parse("id", PredicateValue::from(vec![1_i64, 2, 3]));
        assert_eq!(list.operator, Operator::In);

        let scalar = Predicate::parse("id", PredicateValue::from(1));
        assert_eq!(scalar.operator, Operator::Equals);
    }

    #[test]
    fn test_membership_normalizes_scalar_to_list() {
        let predicate = Predicate::parse("not_in_id", PredicateValue::from(5));
        assert_eq!(
            predicate.value,
            PredicateValue::List(vec![Value::Int(5)])
        );
    }

    #[test]
    fn test_equals_and_not_equals() {
        let users = row(&[("id", Value::Int(2)), ("name", Value::from("Bo"))]);

        assert!(Predicate::parse("id", PredicateValue::from(2)).matches(&users));
        assert!(!Predicate::parse("id", PredicateValue::from(1)).matches(&users));
        assert!(Predicate::parse("not_id", PredicateValue::from(1)).matches(&users));
        assert!(!Predicate::parse("not_id", PredicateValue::from(2)).matches(&users));
    }

    #[test]
    fn test_not_equals_never_matches_null() {
        // SQL `!= ?` evaluates NULL when either side is NULL; the matcher
        // must collapse that to "no match" the same way
        let with_null = row(&[("name", Value::from("Ann")), ("age", Value::Null)]);
        assert!(!Predicate::parse("not_age", PredicateValue::from(34)).matches(&with_null));

        let missing = row(&[("name", Value::from("Ann"))]);
        assert!(!Predicate::parse("not_age", PredicateValue::from(34)).matches(&missing));

        // a null right-hand side matches no row, not even non-null ones
        let populated = row(&[("age", Value::Int(34))]);
        assert!(
            !Predicate::parse("not_age", PredicateValue::Scalar(Value::Null)).matches(&populated)
        );
        assert!(!Predicate::parse("not_age", PredicateValue::Scalar(Value::Null)).matches(&with_null));
    }

    #[test]
    fn test_list_under_negated_equality_parses_as_not_in() {
        let predicate = Predicate::parse("not_name", PredicateValue::from(vec!["Ann", "Bo"]));
        assert_eq!(predicate.operator, Operator::NotIn);
        assert_eq!(
            predicate.value,
            PredicateValue::List(vec![Value::from("Ann"), Value::from("Bo")])
        );

        let users = row(&[("name", Value::from("Cy"))]);
        assert!(predicate.matches(&users));
        let users = row(&[("name", Value::from("Bo"))]);
        assert!(!predicate.matches(&users));
    }

    #[test]
    fn test_membership_lists_drop_null_elements() {
        let predicate = Predicate::parse(
            "not_in_name",
            PredicateValue::from(vec![Value::from("Ann"), Value::Null]),
        );
        assert_eq!(predicate.value, PredicateValue::List(vec![Value::from("Ann")]));
        assert!(predicate.matches(&row(&[("name", Value::from("Bo"))])));
        assert!(!predicate.matches(&row(&[("name", Value::from("Ann"))])));

        // an all-null list leaves an empty NOT IN, which keeps every non-null value
        let predicate = Predicate::parse("not_in_name", PredicateValue::from(vec![Value::Null]));
        assert_eq!(predicate.value, PredicateValue::List(Vec::new()));
        assert!(predicate.matches(&row(&[("name", Value::from("Bo"))])));
        assert!(!predicate.matches(&row(&[("name", Value::Null)])));
    }

    #[test]
    fn test_range_operators_never_match_null() {
        let with_null = row(&[("age", Value::Null)]);
        assert!(!Predicate::parse("greater_age", PredicateValue::from(1)).matches(&with_null));
        assert!(!Predicate::parse("lower_age", PredicateValue::from(100)).matches(&with_null));

        let missing = row(&[]);
        assert!(!Predicate::parse("greater_age", PredicateValue::from(1)).matches(&missing));
    }

    #[test]
    fn test_membership() {
        let users = row(&[("id", Value::Int(2))]);
        assert!(Predicate::parse("id", PredicateValue::from(vec![1_i64, 2])).matches(&users));
        assert!(!Predicate::parse("id", PredicateValue::from(vec![3_i64, 4])).matches(&users));
        assert!(Predicate::parse("not_in_id", PredicateValue::from(vec![3_i64, 4])).matches(&users));
        assert!(!Predicate::parse("not_in_id", PredicateValue::from(vec![1_i64, 2])).matches(&users));

        // NULL is never IN, and never NOT IN, anything
        let with_null = row(&[("id", Value::Null)]);
        assert!(!Predicate::parse("id", PredicateValue::from(vec![1_i64])).matches(&with_null));
        assert!(!Predicate::parse("not_in_id", PredicateValue::from(vec![1_i64])).matches(&with_null));
    }

    #[test]
    fn test_like_is_case_sensitive_substring() {
        let users = row(&[("name", Value::from("Ann"))]);
        assert!(Predicate::parse("like_name", PredicateValue::from("n")).matches(&users));
        assert!(!Predicate::parse("like_name", PredicateValue::from("N")).matches(&users));
        assert!(Predicate::parse("not_like_name", PredicateValue::from("zz")).matches(&users));
        assert!(!Predicate::parse("not_like_name", PredicateValue::from("An")).matches(&users));

        // null matches neither LIKE nor NOT LIKE
        let with_null = row(&[("name", Value::Null)]);
        assert!(!Predicate::parse("like_name", PredicateValue::from("x")).matches(&with_null));
        assert!(!Predicate::parse("not_like_name", PredicateValue::from("x")).matches(&with_null));
    }

    #[test]
    fn test_like_casts_numbers_to_text() {
        let users = row(&[("id", Value::Int(123))]);
        assert!(Predicate::parse("like_id", PredicateValue::from("2")).matches(&users));
    }

    #[test]
    fn test_null_operators_treat_missing_as_null() {
        let users = row(&[("name", Value::from("Ann")), ("email", Value::Null)]);
        assert!(Predicate::parse("email", PredicateValue::Scalar(Value::Null)).matches(&users));
        assert!(Predicate::parse("phone", PredicateValue::Scalar(Value::Null)).matches(&users));
        assert!(Predicate::parse("is_not_null_name", PredicateValue::from(1)).matches(&users));
        assert!(!Predicate::parse("is_not_null_email", PredicateValue::from(1)).matches(&users));
    }

    #[test]
    fn test_params_parse_preserves_order() {
        let mut params = Params::new();
        params.insert("greater_age", 30);
        params.insert("like_name", "An");
        let predicates = params.parse();
        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[0].field, "age");
        assert_eq!(predicates[1].field, "name");
    }
}
