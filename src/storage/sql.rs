//! SQL translation for filter conditions
//!
//! Every condition becomes a parameterized predicate over the `records`
//! table. Field names are checked against a fixed column allowlist and never
//! interpolated from input.
//!
//! Predicates accept exactly the records `query::filter::Filter` accepts.
//! Where SQLite's native comparison would disagree with `compare_values`
//! (mixed numeric/text operands, NULL ordering) the predicate falls back to
//! the `lens_compare` function registered on every connection.

use crate::query::compare::{as_number, compare_values, stringify};
use crate::storage::error::{StorageError, StorageResult};
use crate::types::{FilterCondition, FilterType, CANONICAL_FIELDS};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Resolve a field name to its physical column. Matching is case-sensitive.
pub fn column(field: &str) -> StorageResult<&'static str> {
    CANONICAL_FIELDS
        .iter()
        .copied()
        .find(|c| *c == field)
        .ok_or_else(|| StorageError::InvalidField(field.to_string()))
}

/// A WHERE clause and its positional parameters
#[derive(Debug, Default)]
pub struct WhereClause {
    /// Empty when there are no conditions, else starts with ` WHERE `
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Translate conditions into a conjunctive WHERE clause
pub fn build_where(filters: &[FilterCondition]) -> StorageResult<WhereClause> {
    let mut predicates = Vec::with_capacity(filters.len());
    let mut params = Vec::new();

    for filter in filters {
        let col = column(&filter.field)?;
        predicates.push(predicate(col, filter, &mut params));
    }

    if predicates.is_empty() {
        return Ok(WhereClause::default());
    }

    Ok(WhereClause {
        sql: format!(" WHERE {}", predicates.join(" AND ")),
        params,
    })
}

fn predicate(col: &str, filter: &FilterCondition, params: &mut Vec<SqlValue>) -> String {
    match filter.filter_type {
        FilterType::Equality | FilterType::Exclusion => {
            let negate = filter.filter_type == FilterType::Exclusion;
            match native_operand(col, &filter.value) {
                Some(bound) => {
                    params.push(bound);
                    if negate {
                        format!("{} IS NOT ?", col)
                    } else {
                        format!("{} IS ?", col)
                    }
                }
                None => {
                    params.push(compare_operand(&filter.value));
                    let op = if negate { "!=" } else { "=" };
                    format!("lens_compare({}, ?) {} 0", col, op)
                }
            }
        }
        FilterType::Contains => {
            params.push(SqlValue::Text(format!(
                "%{}%",
                escape_like(&stringify(&filter.value))
            )));
            format!("{} LIKE ? ESCAPE '\\'", col)
        }
        FilterType::Regexp => {
            params.push(SqlValue::Text(stringify(&filter.value)));
            format!("{} REGEXP ?", col)
        }
        FilterType::Range => {
            let Some(op) = filter.range_op() else {
                return "1 = 0".to_string();
            };
            match native_operand(col, &filter.value) {
                Some(bound) => {
                    params.push(bound);
                    format!("{} {} ?", col, op.sql())
                }
                None => {
                    params.push(compare_operand(&filter.value));
                    format!(
                        "({} IS NOT NULL AND lens_compare({}, ?) {} 0)",
                        col,
                        col,
                        op.sql()
                    )
                }
            }
        }
    }
}

/// Operand for a plain SQL comparison, when SQLite's own ordering agrees
/// with `compare_values` for every value the column can hold.
fn native_operand(col: &str, value: &Value) -> Option<SqlValue> {
    if col == "timestamp" {
        return as_number(value).map(number_value);
    }
    match value {
        Value::String(s) if as_number(value).is_none() => Some(SqlValue::Text(s.clone())),
        _ => None,
    }
}

fn number_value(n: f64) -> SqlValue {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        SqlValue::Integer(n as i64)
    } else {
        SqlValue::Real(n)
    }
}

/// Operand handed to `lens_compare`
fn compare_operand(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// ORDER BY clause, defaulting to newest first
pub fn order_by(sort_by: Option<&str>, desc: bool) -> StorageResult<String> {
    match sort_by.filter(|s| !s.is_empty()) {
        Some(field) => {
            let col = column(field)?;
            Ok(format!(" ORDER BY {} {}", col, if desc { "DESC" } else { "ASC" }))
        }
        None => Ok(" ORDER BY timestamp DESC".to_string()),
    }
}

/// LIMIT/OFFSET clause; parameters are appended to `params`
pub fn limit_offset(limit: Option<i64>, offset: Option<i64>, params: &mut Vec<SqlValue>) -> String {
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(limit), None) => {
            params.push(SqlValue::Integer(limit));
            " LIMIT ?".to_string()
        }
        (None, Some(offset)) => {
            params.push(SqlValue::Integer(offset));
            " LIMIT -1 OFFSET ?".to_string()
        }
        (Some(limit), Some(offset)) => {
            params.push(SqlValue::Integer(limit));
            params.push(SqlValue::Integer(offset));
            " LIMIT ? OFFSET ?".to_string()
        }
    }
}

fn json_value(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(Value::from(i)),
        ValueRef::Real(f) => Some(Value::from(f)),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Some(Value::String(String::from_utf8_lossy(t).into_owned()))
        }
    }
}

fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(Value::from(f).to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Register `regexp` and `lens_compare` on a connection
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    // `X REGEXP Y` calls regexp(Y, X)
    conn.create_scalar_function("regexp", 2, flags, |ctx| {
        let regex: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
            Ok(Regex::new(vr.as_str()?)?)
        })?;
        Ok(text_value(ctx.get_raw(1)).is_some_and(|text| regex.is_match(&text)))
    })?;

    conn.create_scalar_function("lens_compare", 2, flags, |ctx| {
        let a = json_value(ctx.get_raw(0));
        let b = json_value(ctx.get_raw(1));
        Ok(compare_values(a.as_ref(), b.as_ref()) as i64)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_allowlist() {
        assert_eq!(column("level").unwrap(), "level");
        assert!(matches!(column("Level"), Err(StorageError::InvalidField(_))));
        assert!(matches!(
            column("level; DROP TABLE records"),
            Err(StorageError::InvalidField(_))
        ));
    }

    #[test]
    fn test_native_and_fallback_predicates() {
        let clause = build_where(&[
            FilterCondition::equality("level", "ERROR"),
            FilterCondition::range("timestamp", "gte", "1000"),
            FilterCondition::equality("message", 42),
            FilterCondition::range("service", "lt", 5),
        ])
        .unwrap();

        assert_eq!(
            clause.sql,
            " WHERE level IS ? AND timestamp >= ? AND lens_compare(message, ?) = 0 \
             AND (service IS NOT NULL AND lens_compare(service, ?) < 0)"
        );
        assert_eq!(clause.params[1], SqlValue::Integer(1000));
    }

    #[test]
    fn test_unsupported_operator_matches_nothing() {
        let clause = build_where(&[FilterCondition::range("timestamp", "between", 1)]).unwrap();
        assert_eq!(clause.sql, " WHERE 1 = 0");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_like_escaping() {
        let clause = build_where(&[FilterCondition::contains("message", "100%_done\\")]).unwrap();
        assert_eq!(
            clause.params[0],
            SqlValue::Text("%100\\%\\_done\\\\%".to_string())
        );
    }

    #[test]
    fn test_order_and_paging() {
        assert_eq!(order_by(None, false).unwrap(), " ORDER BY timestamp DESC");
        assert_eq!(order_by(Some("level"), false).unwrap(), " ORDER BY level ASC");
        assert!(order_by(Some("user"), true).is_err());

        let mut params = Vec::new();
        assert_eq!(limit_offset(None, Some(5), &mut params), " LIMIT -1 OFFSET ?");
        assert_eq!(params, vec![SqlValue::Integer(5)]);
    }

    #[test]
    fn test_registered_functions() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let matched: bool = conn
            .query_row("SELECT 'user 42' REGEXP '^user \\d+$'", [], |r| r.get(0))
            .unwrap();
        assert!(matched);

        let null_match: bool = conn
            .query_row("SELECT NULL REGEXP 'x'", [], |r| r.get(0))
            .unwrap();
        assert!(!null_match);

        let cmp: i64 = conn
            .query_row("SELECT lens_compare('10', 9.5)", [], |r| r.get(0))
            .unwrap();
        assert_eq!(cmp, 1);

        let cmp: i64 = conn
            .query_row("SELECT lens_compare(NULL, '')", [], |r| r.get(0))
            .unwrap();
        assert_eq!(cmp, -1);
    }

    #[test]
    fn test_compare_operand_encoding() {
        assert_eq!(compare_operand(&json!(true)), SqlValue::Text("true".into()));
        assert_eq!(compare_operand(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(compare_operand(&Value::Null), SqlValue::Null);
    }
}
