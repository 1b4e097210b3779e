//! LogLens Query Engine
//!
//! Filtering, validation, aggregation and plan explanation over records:
//!
//! - **compare**: The single value-ordering rule used everywhere
//! - **filter**: Compile `FilterCondition`s into in-memory predicates
//! - **aggregate**: count/avg/sum/min/max over a result page
//! - **engine**: Validate, execute against storage, explain
//!
//! # Examples
//!
//! ```rust,ignore
//! use loglens::query::QueryEngine;
//! use loglens::types::{Aggregation, FilterCondition, Query};
//!
//! let query = Query::new()
//!     .filter(FilterCondition::equality("level", "ERROR"))
//!     .filter(FilterCondition::range("timestamp", "gte", 1_700_000_000_000i64))
//!     .aggregate(Aggregation::new("count"))
//!     .limit(50);
//!
//! println!("{}", engine.explain(&query));
//! let result = engine.execute(query).await?;
//! ```

pub mod aggregate;
pub mod compare;
pub mod engine;
mod error;
pub mod filter;

pub use aggregate::{compute_aggregations, AggregationFunc};
pub use compare::compare_values;
pub use engine::{explain_query, validate_query, QueryEngine};
pub use error::{EngineResult, QueryError};
pub use filter::{Filter, FilterEngine};
