//! LogLens Storage Engine
//!
//! - **sqlite**: the record store (batched writes, queries, timeline)
//! - **sql**: filter-to-SQL translation and the registered SQL functions
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Record stream → Batch → Transaction (writer connection)
//!
//! Read Path:
//!   Query → Allowlist → Parameterized SELECT + COUNT(*) (reader connection)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use loglens::storage::{SqliteStorage, StorageConfig};
//! use loglens::types::{FilterCondition, Query, Record};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = SqliteStorage::open(StorageConfig::new("./loglens.db"))?;
//!
//!     storage.insert_batch(&[Record::new("1", "boom").level("error").message("boom")])?;
//!
//!     let query = Query::new()
//!         .filter(FilterCondition::equality("level", "ERROR"))
//!         .limit(10);
//!     let page = storage.query(&query)?;
//!     println!("{} of {}", page.records.len(), page.total);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod sql;
pub mod sqlite;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use sqlite::{SqliteStorage, StorageConfig};
