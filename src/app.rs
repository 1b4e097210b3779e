//! Application facade
//!
//! `LogLens` owns the record store and the engines around it and exposes the
//! operations an embedding shell (or the CLI) calls:
//!
//! ```text
//! import:   source → Parser → [FilterEngine] → SqliteStorage::store → ImportResult
//! retrieve: Query → QueryEngine (validate) → SqliteStorage::query → aggregate → QueryResult
//! ```

use crate::config::{Config, ConfigError};
use crate::parser::{factory, ParseError, Parser, ParserConfig, ParserKind};
use crate::query::{FilterEngine, QueryEngine, QueryError};
use crate::storage::{SqliteStorage, StorageError, StorageResult};
use crate::types::{
    now_millis, FilterCondition, ImportResult, Query, QueryResult, Record, Stats,
    TimelinePoint, TimelineRequest,
};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Levels reported by [`LogLens::stats`]
const STATS_LEVELS: [&str; 4] = ["ERROR", "WARN", "INFO", "DEBUG"];

/// Errors surfaced by the facade
#[derive(Error, Debug)]
pub enum LensError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A blocking storage task panicked or was aborted
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type LensResult<T> = Result<T, LensError>;

/// Log ingestion and query service over one record store
pub struct LogLens {
    storage: Arc<SqliteStorage>,
    engine: QueryEngine,
    filters: FilterEngine,
    config: Config,
}

impl LogLens {
    /// Open the store named by `config.storage`
    pub fn open(config: Config) -> LensResult<Self> {
        let storage = SqliteStorage::open(config.storage.to_storage())?;
        Ok(Self::with_storage(Arc::new(storage), config))
    }

    /// Private in-memory store, mostly for tests and one-off analysis
    pub fn open_in_memory(config: Config) -> LensResult<Self> {
        let storage = SqliteStorage::open_in_memory()?;
        Ok(Self::with_storage(Arc::new(storage), config))
    }

    fn with_storage(storage: Arc<SqliteStorage>, config: Config) -> Self {
        Self {
            engine: QueryEngine::new(Arc::clone(&storage)),
            filters: FilterEngine::new(config.import.channel_capacity),
            storage,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<SqliteStorage> {
        &self.storage
    }

    /// Parse `source` with the configured parser and persist every record
    pub async fn import_stream<R>(
        &self,
        parser_config: &ParserConfig,
        source: R,
        cancel: CancellationToken,
    ) -> LensResult<ImportResult>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.import(parser_config, None, source, cancel).await
    }

    /// Like [`import_stream`](Self::import_stream), keeping only records
    /// accepted by `filters`
    pub async fn import_stream_filtered<R>(
        &self,
        parser_config: &ParserConfig,
        filters: &[FilterCondition],
        source: R,
        cancel: CancellationToken,
    ) -> LensResult<ImportResult>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.import(parser_config, Some(filters), source, cancel).await
    }

    /// Import a file with an explicit parser configuration
    pub async fn import_file(
        &self,
        path: &Path,
        parser_config: &ParserConfig,
        cancel: CancellationToken,
    ) -> LensResult<ImportResult> {
        let file = tokio::fs::File::open(path).await?;
        tracing::info!("Importing {:?} as {}", path, parser_config.kind);
        self.import_stream(parser_config, file, cancel).await
    }

    /// Sample the head of a file, detect its format, then import it whole
    pub async fn auto_import_file(
        &self,
        path: &Path,
        cancel: CancellationToken,
    ) -> LensResult<(ParserKind, ImportResult)> {
        let mut file = tokio::fs::File::open(path).await?;

        let mut sample = Vec::with_capacity(self.config.import.sample_size);
        (&mut file)
            .take(self.config.import.sample_size as u64)
            .read_to_end(&mut sample)
            .await?;
        file.seek(SeekFrom::Start(0)).await?;

        let kind = self.auto_detect_format(&sample);
        tracing::info!("Detected {} format for {:?}", kind, path);

        let result = self
            .import_stream(&ParserConfig::new(kind), file, cancel)
            .await?;
        Ok((kind, result))
    }

    async fn import<R>(
        &self,
        parser_config: &ParserConfig,
        filters: Option<&[FilterCondition]>,
        source: R,
        cancel: CancellationToken,
    ) -> LensResult<ImportResult>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let parser = factory::create(parser_config)?;
        // compile filters before any input is consumed
        let filter = match filters {
            Some(conditions) => Some(self.filters.build_filter(conditions)?),
            None => None,
        };

        let stream = parser.parse_with_options(
            source,
            cancel.clone(),
            self.config.import.stream_options(),
        )?;
        let (records, report) = stream.into_parts();

        let records: mpsc::Receiver<Record> = match filter {
            Some(filter) => self.filters.apply_filter(filter, records, cancel.clone()),
            None => records,
        };

        let mut result = self.storage.store(records, cancel).await?;

        let mut errors = report.errors();
        errors.append(&mut result.errors);
        result.errors = errors;

        tracing::info!(
            "Import finished: {} records, {} stored, {} lines skipped, {} errors in {}ms",
            result.total_records,
            result.processed,
            report.lines_skipped(),
            result.errors.len(),
            result.duration
        );

        Ok(result)
    }

    /// Best-effort format guess from a sample of the input
    pub fn auto_detect_format(&self, sample: &[u8]) -> ParserKind {
        factory::auto_detect(sample)
    }

    pub async fn execute_query(&self, query: Query) -> LensResult<QueryResult> {
        Ok(self.engine.execute(query).await?)
    }

    pub fn explain_query(&self, query: &Query) -> String {
        self.engine.explain(query)
    }

    pub async fn get_record(&self, id: &str) -> LensResult<Record> {
        let id = id.to_string();
        match self.blocking(move |storage| storage.get_record(&id)).await {
            Err(LensError::Storage(StorageError::NotFound(id))) => Err(LensError::NotFound(id)),
            other => other,
        }
    }

    pub async fn get_timeline(&self, request: TimelineRequest) -> LensResult<Vec<TimelinePoint>> {
        self.blocking(move |storage| storage.timeline(&request.filters, request.bucket_ms))
            .await
    }

    /// Total record count and counts for the common levels
    pub async fn stats(&self) -> LensResult<Stats> {
        self.blocking(|storage| {
            let total_records = storage.count(&[])?;

            let mut level_counts = HashMap::new();
            for level in STATS_LEVELS {
                let count = storage.count(&[FilterCondition::equality("level", level)])?;
                level_counts.insert(level.to_string(), count);
            }

            Ok(Stats {
                total_records,
                level_counts,
                last_updated: now_millis(),
            })
        })
        .await
    }

    pub fn supported_parser_types(&self) -> Vec<ParserKind> {
        factory::supported_types()
    }

    pub fn create_parser(&self, config: &ParserConfig) -> LensResult<Parser> {
        Ok(factory::create(config)?)
    }

    /// Close the store. Later operations fail with `StorageError::Closed`.
    pub fn close(&self) -> LensResult<()> {
        self.storage.close()?;
        tracing::info!("LogLens closed");
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> LensResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStorage) -> StorageResult<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        Ok(tokio::task::spawn_blocking(move || f(&storage)).await??)
    }
}
