//! Page-level aggregations
//!
//! Aggregations run over the records already returned for a page, not over
//! the whole matching set. Callers that want global figures ask for an
//! unbounded page.

use crate::query::compare::{as_number, compare_values};
use crate::query::error::{EngineResult, QueryError};
use crate::types::{Aggregation, Record};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Aggregation functions available in queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationFunc {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregationFunc {
    /// Parse from the wire name; matching is exact (`count`, not `COUNT`)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "avg" => Some(Self::Avg),
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }
}

impl std::fmt::Display for AggregationFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Avg => write!(f, "avg"),
            Self::Sum => write!(f, "sum"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// Compute every requested aggregation over `records`, keyed by resolved alias
pub fn compute_aggregations(
    aggregations: &[Aggregation],
    records: &[Record],
) -> EngineResult<HashMap<String, Value>> {
    let mut results = HashMap::with_capacity(aggregations.len());

    for agg in aggregations {
        let func = AggregationFunc::parse(&agg.function)
            .ok_or_else(|| QueryError::InvalidAggregation(agg.function.clone()))?;
        let field = agg.target();

        let value = match (func, field) {
            (AggregationFunc::Count, None) => Value::from(records.len()),
            (AggregationFunc::Count, Some(field)) => Value::from(count_distinct(records, field)),
            (AggregationFunc::Avg, field) => Value::from(average(records, field)),
            (AggregationFunc::Sum, field) => Value::from(sum(records, field)),
            (AggregationFunc::Min, field) => extreme(records, field, Ordering::Less),
            (AggregationFunc::Max, field) => extreme(records, field, Ordering::Greater),
        };

        results.insert(agg.resolved_alias(), value);
    }

    Ok(results)
}

fn field_values<'a>(
    records: &'a [Record],
    field: Option<&'a str>,
) -> impl Iterator<Item = Option<Value>> + 'a {
    records
        .iter()
        .map(move |r| field.and_then(|f| r.get_field(f)))
}

fn count_distinct(records: &[Record], field: &str) -> usize {
    field_values(records, Some(field))
        .flatten()
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len()
}

fn numeric_values(records: &[Record], field: Option<&str>) -> Vec<f64> {
    field_values(records, field)
        .flatten()
        .filter_map(|v| as_number(&v))
        .collect()
}

fn sum(records: &[Record], field: Option<&str>) -> f64 {
    numeric_values(records, field).iter().sum()
}

fn average(records: &[Record], field: Option<&str>) -> f64 {
    let values = numeric_values(records, field);
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Min (`Less`) or max (`Greater`).
///
/// Seeded with the first record's value even when it is absent; later records
/// replace the current pick only when present and strictly beyond it.
fn extreme(records: &[Record], field: Option<&str>, wanted: Ordering) -> Value {
    let mut values = field_values(records, field);
    let Some(mut best) = values.next() else {
        return Value::Null;
    };

    for value in values.flatten() {
        if compare_values(Some(&value), best.as_ref()) == wanted {
            best = Some(value);
        }
    }

    best.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> Vec<Record> {
        vec![
            Record::new("1", "a").level("ERROR").field("latency", 120).field("user", "bob"),
            Record::new("2", "b").level("INFO").field("latency", "30").field("user", "amy"),
            Record::new("3", "c").level("ERROR").field("latency", "n/a").field("user", "bob"),
            Record::new("4", "d").level("WARN"),
        ]
    }

    fn run(agg: Aggregation) -> Value {
        let alias = agg.resolved_alias();
        compute_aggregations(&[agg], &page()).unwrap().remove(&alias).unwrap()
    }

    #[test]
    fn test_count_star_is_page_size() {
        assert_eq!(run(Aggregation::new("count")), json!(4));
        assert_eq!(run(Aggregation::new("count").on("*")), json!(4));
    }

    #[test]
    fn test_count_field_is_distinct_non_null() {
        assert_eq!(run(Aggregation::new("count").on("user")), json!(2));
        assert_eq!(run(Aggregation::new("count").on("level")), json!(3));
    }

    #[test]
    fn test_sum_and_avg_skip_non_numeric() {
        assert_eq!(run(Aggregation::new("sum").on("latency")), json!(150.0));
        assert_eq!(run(Aggregation::new("avg").on("latency")), json!(75.0));
        assert_eq!(run(Aggregation::new("avg").on("missing")), json!(0.0));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(run(Aggregation::new("max").on("level")), json!("WARN"));
        assert_eq!(run(Aggregation::new("min").on("level")), json!("ERROR"));
    }

    #[test]
    fn test_min_seeded_by_absent_first_value() {
        let records = vec![
            Record::new("1", "a"),
            Record::new("2", "b").field("n", 5),
            Record::new("3", "c").field("n", 2),
        ];
        let result =
            compute_aggregations(&[Aggregation::new("min").on("n"), Aggregation::new("max").on("n")], &records)
                .unwrap();

        // absent seed sorts below every present value
        assert_eq!(result["min_n"], Value::Null);
        assert_eq!(result["max_n"], json!(5));
    }

    #[test]
    fn test_aliases_and_empty_page() {
        let result = compute_aggregations(
            &[Aggregation::new("count").alias("hits"), Aggregation::new("max").on("level")],
            &[],
        )
        .unwrap();
        assert_eq!(result["hits"], json!(0));
        assert_eq!(result["max_level"], Value::Null);
    }

    #[test]
    fn test_unknown_function() {
        let result = compute_aggregations(&[Aggregation::new("median")], &page());
        assert!(matches!(result, Err(QueryError::InvalidAggregation(_))));
    }
}
