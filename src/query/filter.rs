//! Filter Engine - in-memory record predicates
//!
//! Compiles `FilterCondition`s into a `Filter` tree and applies it either to a
//! single record or to a record stream.
//!
//! ```text
//! [level = ERROR, message contains "timeout"]
//!        ↓ build_filter
//! And([Equality(level, "ERROR"), Contains(message, "timeout")])
//! ```
//!
//! The same semantics are reproduced by the SQL translation in
//! `storage::sql`; both must accept the same records.

use crate::query::compare::{compare_values, stringify};
use crate::query::error::{EngineResult, QueryError};
use crate::types::{FilterCondition, FilterType, RangeOp, Record};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A compiled predicate over records
#[derive(Debug, Clone)]
pub enum Filter {
    /// Accepts every record
    MatchAll,
    Equality { field: String, value: Value },
    Exclusion { field: String, value: Value },
    /// `needle` is stored ASCII-lowercased
    Contains { field: String, needle: String },
    Regexp { field: String, regex: Regex },
    /// `op` is `None` for an unsupported operator, which never matches
    Range {
        field: String,
        op: Option<RangeOp>,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Evaluate the predicate against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::MatchAll => true,
            Filter::Equality { field, value } => {
                compare_values(record.get_field(field).as_ref(), Some(value)) == Ordering::Equal
            }
            Filter::Exclusion { field, value } => {
                compare_values(record.get_field(field).as_ref(), Some(value)) != Ordering::Equal
            }
            Filter::Contains { field, needle } => match record.get_field(field) {
                Some(v) => stringify(&v).to_ascii_lowercase().contains(needle.as_str()),
                None => false,
            },
            Filter::Regexp { field, regex } => match record.get_field(field) {
                Some(v) => regex.is_match(&stringify(&v)),
                None => false,
            },
            Filter::Range { field, op, value } => {
                let Some(op) = op else {
                    return false;
                };
                match record.get_field(field) {
                    Some(v) => op.accepts(compare_values(Some(&v), Some(value))),
                    None => false,
                }
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }

    /// Conjunction of two filters
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::MatchAll => other,
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Disjunction of two filters
    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut filters) => {
                filters.push(other);
                Filter::Or(filters)
            }
            first => Filter::Or(vec![first, other]),
        }
    }
}

/// Builds filters from conditions and runs them over record streams
#[derive(Debug, Clone)]
pub struct FilterEngine {
    /// Capacity of the channel produced by `apply_filter`
    channel_capacity: usize,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl FilterEngine {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Compile a list of conditions into one filter.
    ///
    /// No conditions yields `MatchAll`, one yields its own predicate, several
    /// yield an `And` in request order.
    pub fn build_filter(&self, conditions: &[FilterCondition]) -> EngineResult<Filter> {
        match conditions {
            [] => Ok(Filter::MatchAll),
            [single] => build_single(single),
            many => Ok(Filter::And(
                many.iter().map(build_single).collect::<EngineResult<Vec<_>>>()?,
            )),
        }
    }

    /// Forward the records accepted by `filter`, preserving order.
    ///
    /// Stops when the input closes, the consumer goes away, or `cancel` fires.
    pub fn apply_filter(
        &self,
        filter: Filter,
        mut records: mpsc::Receiver<Record>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Record> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = records.recv() => match next {
                        Some(record) => record,
                        None => break,
                    },
                };

                if filter.matches(&record) && tx.send(record).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

fn build_single(condition: &FilterCondition) -> EngineResult<Filter> {
    let field = condition.field.clone();
    let filter = match condition.filter_type {
        FilterType::Equality => Filter::Equality {
            field,
            value: condition.value.clone(),
        },
        FilterType::Exclusion => Filter::Exclusion {
            field,
            value: condition.value.clone(),
        },
        FilterType::Contains => Filter::Contains {
            field,
            needle: stringify(&condition.value).to_ascii_lowercase(),
        },
        FilterType::Regexp => {
            let pattern = stringify(&condition.value);
            let regex = Regex::new(&pattern).map_err(|e| {
                QueryError::InvalidFilter(format!("invalid regexp for {}: {}", condition.field, e))
            })?;
            Filter::Regexp { field, regex }
        }
        FilterType::Range => Filter::Range {
            field,
            op: condition.range_op(),
            value: condition.value.clone(),
        },
    };
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, level: &str, message: &str) -> Record {
        Record::new(id, message).level(level).message(message)
    }

    fn engine() -> FilterEngine {
        FilterEngine::default()
    }

    #[test]
    fn test_empty_conditions_match_all() {
        let filter = engine().build_filter(&[]).unwrap();
        assert!(filter.matches(&record("1", "INFO", "hello")));
    }

    #[test]
    fn test_equality_and_exclusion() {
        let error = record("1", "ERROR", "boom");
        let info = record("2", "INFO", "ok");

        let eq = engine()
            .build_filter(&[FilterCondition::equality("level", "ERROR")])
            .unwrap();
        assert!(eq.matches(&error));
        assert!(!eq.matches(&info));

        let ne = engine()
            .build_filter(&[FilterCondition::exclusion("level", "ERROR")])
            .unwrap();
        assert!(!ne.matches(&error));
        assert!(ne.matches(&info));
    }

    #[test]
    fn test_exclusion_matches_absent_field() {
        let filter = engine()
            .build_filter(&[FilterCondition::exclusion("service", "api")])
            .unwrap();
        assert!(filter.matches(&record("1", "INFO", "no service")));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let filter = engine()
            .build_filter(&[FilterCondition::contains("message", "TimeOut")])
            .unwrap();
        assert!(filter.matches(&record("1", "WARN", "request timeout after 30s")));
        assert!(!filter.matches(&record("2", "WARN", "request ok")));
    }

    #[test]
    fn test_contains_absent_field_never_matches() {
        let filter = engine()
            .build_filter(&[FilterCondition::contains("user", "")])
            .unwrap();
        assert!(!filter.matches(&record("1", "INFO", "x")));
    }

    #[test]
    fn test_regexp() {
        let filter = engine()
            .build_filter(&[FilterCondition::regexp("message", r"^user \d+ logged in$")])
            .unwrap();
        assert!(filter.matches(&record("1", "INFO", "user 42 logged in")));
        assert!(!filter.matches(&record("2", "INFO", "user bob logged in")));
    }

    #[test]
    fn test_invalid_regexp_fails_build() {
        let result = engine().build_filter(&[FilterCondition::regexp("message", "(unclosed")]);
        assert!(matches!(result, Err(QueryError::InvalidFilter(_))));
    }

    #[test]
    fn test_range_numeric_and_fields() {
        let slow = record("1", "INFO", "slow").field("latency_ms", 250);
        let fast = record("2", "INFO", "fast").field("latency_ms", "20");
        let none = record("3", "INFO", "none");

        let filter = engine()
            .build_filter(&[FilterCondition::range("latency_ms", "gte", 100)])
            .unwrap();
        assert!(filter.matches(&slow));
        assert!(!filter.matches(&fast));
        assert!(!filter.matches(&none));
    }

    #[test]
    fn test_range_on_timestamp() {
        let old = record("1", "INFO", "old").timestamp(500);
        let new = record("2", "INFO", "new").timestamp(1500);

        let filter = engine()
            .build_filter(&[FilterCondition::range("timestamp", "gte", json!(1000))])
            .unwrap();
        assert!(!filter.matches(&old));
        assert!(filter.matches(&new));
    }

    #[test]
    fn test_unsupported_range_operator_never_matches() {
        let filter = engine()
            .build_filter(&[FilterCondition::range("timestamp", "between", 0)])
            .unwrap();
        assert!(!filter.matches(&record("1", "INFO", "x")));
    }

    #[test]
    fn test_multiple_conditions_are_conjunctive() {
        let filter = engine()
            .build_filter(&[
                FilterCondition::equality("level", "ERROR"),
                FilterCondition::contains("message", "disk"),
            ])
            .unwrap();

        assert!(matches!(filter, Filter::And(ref f) if f.len() == 2));
        assert!(filter.matches(&record("1", "ERROR", "disk full")));
        assert!(!filter.matches(&record("2", "ERROR", "network down")));
        assert!(!filter.matches(&record("3", "INFO", "disk ok")));
    }

    #[test]
    fn test_or_combinator() {
        let filter = Filter::Equality {
            field: "level".into(),
            value: json!("ERROR"),
        }
        .or(Filter::Equality {
            field: "level".into(),
            value: json!("FATAL"),
        });

        assert!(filter.matches(&record("1", "FATAL", "x")));
        assert!(filter.matches(&record("2", "ERROR", "x")));
        assert!(!filter.matches(&record("3", "INFO", "x")));
    }

    #[tokio::test]
    async fn test_apply_filter_preserves_order() {
        let (tx, rx) = mpsc::channel(16);
        for i in 0..10 {
            let level = if i % 2 == 0 { "ERROR" } else { "INFO" };
            tx.send(record(&i.to_string(), level, "m")).await.unwrap();
        }
        drop(tx);

        let filter = engine()
            .build_filter(&[FilterCondition::equality("level", "ERROR")])
            .unwrap();
        let mut out = engine().apply_filter(filter, rx, CancellationToken::new());

        let mut ids = Vec::new();
        while let Some(r) = out.recv().await {
            ids.push(r.id);
        }
        assert_eq!(ids, vec!["0", "2", "4", "6", "8"]);
    }

    #[tokio::test]
    async fn test_apply_filter_stops_on_cancel() {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut out = engine().apply_filter(Filter::MatchAll, rx, cancel);
        tx.send(record("1", "INFO", "m")).await.ok();

        assert!(out.recv().await.is_none());
    }
}
