//! Query Engine
//!
//! Validates queries, delegates filtering/sorting/pagination to storage and
//! aggregates the returned page.
//!
//! # Execution Pipeline
//!
//! ```text
//! Query → Validate → Storage (page + total) → Aggregate (page) → QueryResult
//! ```

use crate::query::aggregate::{compute_aggregations, AggregationFunc};
use crate::query::error::{EngineResult, QueryError};
use crate::storage::SqliteStorage;
use crate::types::{FilterType, Query, QueryResult};
use regex::Regex;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

/// Query engine over a single storage instance
pub struct QueryEngine {
    storage: Arc<SqliteStorage>,
}

impl QueryEngine {
    /// Create a new query engine
    pub fn new(storage: Arc<SqliteStorage>) -> Self {
        Self { storage }
    }

    /// Validate and execute a query
    pub async fn execute(&self, query: Query) -> EngineResult<QueryResult> {
        let start = Instant::now();
        validate_query(&query)?;

        let storage = Arc::clone(&self.storage);
        let page_query = query.clone();
        let mut result = tokio::task::spawn_blocking(move || storage.query(&page_query)).await??;

        if !query.aggregations.is_empty() {
            result.aggregations = compute_aggregations(&query.aggregations, &result.records)?;
        }

        result.took = start.elapsed().as_millis() as i64;
        tracing::debug!(
            "Query returned {} of {} records in {}ms",
            result.records.len(),
            result.total,
            result.took
        );

        Ok(result)
    }

    /// Describe how a query would run. Diagnostics only.
    pub fn explain(&self, query: &Query) -> String {
        explain_query(query)
    }
}

/// Reject malformed queries before any storage access
pub fn validate_query(query: &Query) -> EngineResult<()> {
    for filter in &query.filters {
        if filter.field.is_empty() {
            return Err(QueryError::Validation(
                "filter field cannot be empty".to_string(),
            ));
        }

        match filter.filter_type {
            FilterType::Range => match filter.operator.as_deref() {
                None | Some("") => {
                    return Err(QueryError::Validation(format!(
                        "range filter on {} requires operator",
                        filter.field
                    )))
                }
                Some(op) if filter.range_op().is_none() => {
                    return Err(QueryError::Validation(format!(
                        "invalid range operator: {}",
                        op
                    )))
                }
                Some(_) => {}
            },
            FilterType::Regexp => {
                let pattern = crate::query::compare::stringify(&filter.value);
                if let Err(e) = Regex::new(&pattern) {
                    return Err(QueryError::Validation(format!(
                        "invalid regexp for {}: {}",
                        filter.field, e
                    )));
                }
            }
            _ => {}
        }
    }

    for agg in &query.aggregations {
        if AggregationFunc::parse(&agg.function).is_none() {
            return Err(QueryError::Validation(format!(
                "invalid aggregation function: {}",
                agg.function
            )));
        }
    }

    if query.limit.is_some_and(|l| l < 0) {
        return Err(QueryError::Validation("limit cannot be negative".to_string()));
    }
    if query.offset.is_some_and(|o| o < 0) {
        return Err(QueryError::Validation("offset cannot be negative".to_string()));
    }

    Ok(())
}

/// Render a deterministic execution plan
pub fn explain_query(query: &Query) -> String {
    let mut plan = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(plan, "Query Execution Plan:");
    let _ = writeln!(plan, "====================");
    let _ = writeln!(plan);

    if !query.filters.is_empty() {
        let _ = writeln!(plan, "Filters:");
        for (i, filter) in query.filters.iter().enumerate() {
            match (&filter.filter_type, filter.operator.as_deref()) {
                (FilterType::Range, Some(op)) => {
                    let _ = writeln!(
                        plan,
                        "  {}. {} {} {} {}",
                        i + 1,
                        filter.field,
                        filter.filter_type,
                        op,
                        filter.value
                    );
                }
                _ => {
                    let _ = writeln!(
                        plan,
                        "  {}. {} {} {}",
                        i + 1,
                        filter.field,
                        filter.filter_type,
                        filter.value
                    );
                }
            }
        }
        let _ = writeln!(plan);
    }

    match query.sort_by.as_deref() {
        Some(field) => {
            let direction = if query.sort_desc { "DESC" } else { "ASC" };
            let _ = writeln!(plan, "Sort: {} {}", field, direction);
        }
        None => {
            let _ = writeln!(plan, "Sort: timestamp DESC (default)");
        }
    }
    let _ = writeln!(plan);

    if query.limit.is_some() || query.offset.is_some() {
        if let Some(limit) = query.limit {
            let _ = writeln!(plan, "Limit: {}", limit);
        }
        if let Some(offset) = query.offset {
            let _ = writeln!(plan, "Offset: {}", offset);
        }
        let _ = writeln!(plan);
    }

    if !query.aggregations.is_empty() {
        let _ = writeln!(plan, "Aggregations:");
        for (i, agg) in query.aggregations.iter().enumerate() {
            let _ = writeln!(
                plan,
                "  {}. {}({}) AS {}",
                i + 1,
                agg.function,
                agg.target().unwrap_or("*"),
                agg.resolved_alias()
            );
        }
        let _ = writeln!(plan);
    }

    plan
}
