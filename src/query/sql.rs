//! Compilation of parsed predicates into parameterized SQL.
//!
//! The compiler is pure: it turns a [`Schema`], a slice of [`Predicate`]s,
//! and [`QueryOptions`] into statement text plus bind parameters, without
//! touching a connection. Execution lives in the storage layer.

use crate::models::{Schema, Value};
use crate::query::{Operator, Predicate, PredicateValue, QueryOptions};
use crate::{Error, Result};

/// A compiled SELECT: the page query, its decoupled total-match count
/// query, and the shared bind parameters.
///
/// # Sequencing requirement
///
/// `count_sql` shares `params` with `sql` and reports the number of rows the
/// WHERE clause matches before LIMIT/OFFSET. The two statements must execute
/// back-to-back on the same connection with nothing interleaved, or the
/// count may reflect an unrelated query; the `SQLite` backend runs both
/// under a single connection guard for exactly this reason.
#[derive(Debug, Clone)]
pub struct CompiledSelect {
    /// The page query.
    pub sql: String,
    /// The companion total-match count query.
    pub count_sql: String,
    /// Bind parameters, shared by both statements.
    pub params: Vec<Value>,
    /// Whether the caller asked for row locking.
    pub row_lock: bool,
}

impl CompiledSelect {
    /// The page query with a `FOR UPDATE` row-locking clause appended when
    /// requested.
    ///
    /// `SQLite` has no row-level locks (writes take a database-level lock
    /// inside a transaction), so its executor runs the plain `sql`; dialects
    /// with row locking execute this form instead. The mock path ignores
    /// locking entirely.
    #[must_use]
    pub fn locking_sql(&self) -> String {
        if self.row_lock {
            format!("{} FOR UPDATE", self.sql)
        } else {
            self.sql.clone()
        }
    }
}

/// A compiled DELETE statement with its bind parameters.
#[derive(Debug, Clone)]
pub struct CompiledDelete {
    /// The DELETE statement.
    pub sql: String,
    /// Bind parameters.
    pub params: Vec<Value>,
}

/// Compiles a SELECT over a schema's table and joins.
///
/// Shape: `SELECT <alias>.*, <joined columns AS output aliases> FROM
/// "<table>" <alias> <JOIN clauses> WHERE <fragments> ORDER BY ... LIMIT ...
/// OFFSET ...`. Join clauses are emitted in declaration order; each joined
/// table gets the synthetic alias `<target alias><index>` and has that alias
/// substituted into its ON template.
///
/// # Errors
///
/// Returns [`Error::InvalidJoinConfiguration`] if a join descriptor is
/// missing a required attribute.
pub fn compile_select(
    schema: &Schema,
    predicates: &[Predicate],
    opts: &QueryOptions,
) -> Result<CompiledSelect> {
    let alias = &schema.table_alias;

    let mut columns = vec![format!("{alias}.*")];
    let mut join_clauses = String::new();
    for (index, join) in schema.joins.iter().enumerate() {
        join.validate()?;
        let join_alias = format!("{}{index}", join.table_alias);
        for (source, output) in &join.columns {
            columns.push(format!("{join_alias}.{source} AS {output}"));
        }
        let on = join.on.replace("{alias}", &join_alias);
        join_clauses.push_str(&format!(
            " {} JOIN \"{}\" {join_alias} ON ({on})",
            join.kind.as_sql(),
            join.table_name
        ));
    }

    let from = format!("FROM \"{}\" {alias}", schema.table_name);
    let (where_clause, params) = build_where_clause(Some(alias), predicates);

    let mut sql = format!("SELECT {} {from}{join_clauses}", columns.join(", "));
    sql.push_str(&where_clause);

    if let Some(sort_by) = opts.sort_by.as_deref() {
        let column = sanitize_order_column(sort_by);
        sql.push_str(&format!(
            " ORDER BY \"{alias}\".\"{column}\" {}",
            opts.sort_direction.as_sql()
        ));
    }

    if opts.limit.is_some() || opts.offset.is_some() {
        // LIMIT -1 means "no limit"; it carries an OFFSET given without one.
        let limit = opts.limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = opts.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    let count_sql = format!("SELECT COUNT(*) {from}{join_clauses}{where_clause}");

    Ok(CompiledSelect {
        sql,
        count_sql,
        params,
        row_lock: opts.for_update,
    })
}

/// Compiles a DELETE over a schema's table.
///
/// # Errors
///
/// Returns [`Error::UnsafeDeleteRejected`] when `predicates` is empty — an
/// unpredicated delete would wipe the table, and is refused before any
/// statement text is built.
pub fn compile_delete(schema: &Schema, predicates: &[Predicate]) -> Result<CompiledDelete> {
    if predicates.is_empty() {
        return Err(Error::UnsafeDeleteRejected {
            entity: schema.table_name.clone(),
        });
    }

    let (where_clause, params) = build_where_clause(None, predicates);
    let sql = format!("DELETE FROM \"{}\"{where_clause}", schema.table_name);
    Ok(CompiledDelete { sql, params })
}

/// Builds the WHERE clause (with leading ` WHERE `, or empty) and collects
/// bind parameters. `alias` qualifies column references for SELECTs; DELETE
/// passes `None` since standard DELETE takes no table alias.
fn build_where_clause(alias: Option<&str>, predicates: &[Predicate]) -> (String, Vec<Value>) {
    if predicates.is_empty() {
        return (String::new(), Vec::new());
    }

    let qualifier = alias.map_or(String::new(), |a| format!("{a}."));
    let mut fragments = Vec::with_capacity(predicates.len());
    let mut params = Vec::new();

    for predicate in predicates {
        let (fragment, mut fragment_params) = compile_fragment(predicate, &qualifier);
        fragments.push(fragment);
        params.append(&mut fragment_params);
    }

    (format!(" WHERE {}", fragments.join(" AND ")), params)
}

/// Compiles one predicate into a WHERE fragment.
///
/// IN/NOT IN inline their list values as SQL literals; every other operator
/// binds through a placeholder. LIKE/NOT LIKE wrap the (wildcard-escaped)
/// value in `%...%` — substring containment is the one authoritative
/// semantics, shared with the mock matcher.
fn compile_fragment(predicate: &Predicate, qualifier: &str) -> (String, Vec<Value>) {
    let column = format!("{qualifier}{}", predicate.field);

    match (predicate.operator, &predicate.value) {
        (Operator::IsNull, _) => (format!("{column} IS NULL"), Vec::new()),
        (Operator::IsNotNull, _) => (format!("{column} IS NOT NULL"), Vec::new()),
        (Operator::In, value) => {
            let list = list_values(value);
            if list.is_empty() {
                // IN over an empty list matches nothing; `IN ()` is a syntax error.
                ("1 = 0".to_string(), Vec::new())
            } else {
                (format!("{column} IN ({})", literal_list(list)), Vec::new())
            }
        },
        (Operator::NotIn, value) => {
            let list = list_values(value);
            if list.is_empty() {
                // NOT IN over an empty list matches every non-null value.
                (format!("{column} IS NOT NULL"), Vec::new())
            } else {
                (
                    format!("{column} NOT IN ({})", literal_list(list)),
                    Vec::new(),
                )
            }
        },
        (Operator::Like, value) => (
            format!("{column} LIKE ? ESCAPE '\\'"),
            vec![contains_pattern(value)],
        ),
        (Operator::NotLike, value) => (
            format!("{column} NOT LIKE ? ESCAPE '\\'"),
            vec![contains_pattern(value)],
        ),
        // a list never satisfies a scalar comparison, on either backend
        (_, PredicateValue::List(_)) => ("1 = 0".to_string(), Vec::new()),
        (operator, PredicateValue::Scalar(v)) => {
            let symbol = match operator {
                Operator::Equals => "=",
                Operator::NotEquals => "!=",
                Operator::GreaterThan => ">",
                Operator::LowerThan => "<",
                // handled above
                _ => unreachable!("operator compiled earlier"),
            };
            (format!("{column} {symbol} ?"), vec![v.clone()])
        },
    }
}

fn list_values(value: &PredicateValue) -> &[Value] {
    match value {
        PredicateValue::List(vs) => vs.as_slice(),
        PredicateValue::Scalar(v) => std::slice::from_ref(v),
    }
}

fn literal_list(values: &[Value]) -> String {
    values
        .iter()
        .map(sql_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the `%...%` bind value for substring matching, with SQL LIKE
/// wildcards in the user value escaped so they match literally.
///
/// A pattern with no text (null, or a list) binds SQL NULL instead, which
/// satisfies neither `LIKE` nor `NOT LIKE`, the same outcome the in-memory
/// matcher produces.
fn contains_pattern(value: &PredicateValue) -> Value {
    let text = match value {
        PredicateValue::Scalar(v) => v.to_text(),
        PredicateValue::List(_) => None,
    };
    text.map_or(Value::Null, |text| {
        Value::Str(format!("%{}%", escape_like_wildcards(&text)))
    })
}

/// Renders a value as an inline SQL literal, for IN/NOT IN lists.
///
/// Strings are single-quoted with embedded quotes doubled; numbers are
/// rendered bare; null renders as `NULL`.
#[must_use]
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// Escapes SQL LIKE wildcards (`%`, `_`, `\`) so a user-supplied value
/// matches literally inside a `LIKE ... ESCAPE '\'` pattern.
///
/// # Examples
///
/// ```
/// use rowgate::query::escape_like_wildcards;
///
/// assert_eq!(escape_like_wildcards("25% off"), "25\\% off");
/// assert_eq!(escape_like_wildcards("snake_case"), "snake\\_case");
/// ```
#[must_use]
pub fn escape_like_wildcards(s: &str) -> String {
    s.chars().fold(String::with_capacity(s.len()), |mut out, c| {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
        out
    })
}

/// Sanitizes a caller-supplied ORDER BY column by stripping every character
/// outside `[A-Za-z0-9_-]` before interpolation. This is the compiler's only
/// defense against injection through a sort column; predicate values never
/// reach statement text unescaped.
///
/// # Examples
///
/// ```
/// use rowgate::query::sanitize_order_column;
///
/// assert_eq!(sanitize_order_column("created_at"), "created_at");
/// assert_eq!(sanitize_order_column("name; DROP TABLE users"), "nameDROPTABLEusers");
/// ```
#[must_use]
pub fn sanitize_order_column(column: &str) -> String {
    column
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
