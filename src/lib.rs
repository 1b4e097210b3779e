//! # LogLens
//!
//! Log ingestion and query engine: parse heterogeneous log text into
//! normalized records, persist them in SQLite and query them safely.
//!
//! ## Features
//!
//! - **Streaming parsers**: plain-text, JSON-lines and regex formats, cancellable, per-line fault tolerant
//! - **Safe queries**: allowlisted columns, parameterized values, correct pagination totals
//! - **One filter language**: the same conditions run in memory and as SQL
//! - **Timelines**: fixed-width time bucket histograms
//!
//! ## Modules
//!
//! - [`parser`]: Parsers, format detection and the streaming driver
//! - [`query`]: Filter compiler, query validation, aggregation and explain
//! - [`storage`]: SQLite record store
//! - [`app`]: The `LogLens` facade tying them together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loglens::{Config, FilterCondition, LogLens, ParserConfig, ParserKind, Query};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lens = LogLens::open(Config::load_default())?;
//!
//!     let file = tokio::fs::File::open("app.log").await?;
//!     let imported = lens
//!         .import_stream(&ParserConfig::new(ParserKind::Json), file, CancellationToken::new())
//!         .await?;
//!     println!("Stored {} records", imported.processed);
//!
//!     let errors = lens
//!         .execute_query(Query::new().filter(FilterCondition::equality("level", "ERROR")).limit(10))
//!         .await?;
//!     println!("{} errors in total", errors.total);
//!
//!     lens.close()?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod parser;
pub mod query;
pub mod storage;
pub mod types;

// Re-export top-level types for convenience
pub use app::{LensError, LensResult, LogLens};

pub use config::{generate_default_config, Config, ConfigError};

pub use parser::{ParseError, ParseResult, Parser, ParserConfig, ParserKind, RecordStream};

pub use query::{EngineResult, Filter, FilterEngine, QueryEngine, QueryError};

pub use storage::{SqliteStorage, StorageConfig, StorageError, StorageResult};

pub use types::{
    Aggregation, FilterCondition, FilterType, ImportResult, Query, QueryResult, RangeOp, Record,
    Stats, TimelinePoint, TimelineRequest,
};
