//! SQLite record store
//!
//! One `records` table keyed by id. Writes go through a dedicated writer
//! connection in batched transactions; reads use a separate connection so
//! that, in WAL mode, queries never wait on an import.
//!
//! ```text
//! Record stream → batch (batch_size) → BEGIN; INSERT OR REPLACE ...; COMMIT
//! Query → WHERE (sql::build_where) → page + COUNT(*) → QueryResult
//! ```

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::sql::{build_where, limit_offset, order_by, register_functions};
use crate::types::{FilterCondition, ImportResult, Query, QueryResult, Record, TimelinePoint};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        service TEXT,
        fields BLOB,
        raw TEXT NOT NULL,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp);
    CREATE INDEX IF NOT EXISTS idx_records_timestamp_level ON records(timestamp, level);
    CREATE INDEX IF NOT EXISTS idx_records_timestamp_service ON records(timestamp, service);
    CREATE INDEX IF NOT EXISTS idx_records_level ON records(level);
    CREATE INDEX IF NOT EXISTS idx_records_service ON records(service);
    CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
";

const SELECT_COLUMNS: &str = "SELECT id, timestamp, level, message, service, fields, raw FROM records";

/// Configuration for the record store
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Records per write transaction (default: 1000)
    pub batch_size: usize,
    /// How long a connection waits on a locked database (default: 5000)
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("loglens.db"),
            batch_size: 1000,
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Builder method: set batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Connection slot; `None` once the store is closed.
/// (std::sync::Mutex because rusqlite::Connection is !Sync)
type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// SQLite-backed record store
pub struct SqliteStorage {
    writer: SharedConnection,
    reader: SharedConnection,
    batch_size: usize,
}

impl SqliteStorage {
    /// Open (or create) a database file
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        if config.batch_size == 0 {
            return Err(StorageError::Config("batch_size must be > 0".to_string()));
        }

        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);

        let writer = Connection::open(&config.database_path)?;
        writer.busy_timeout(busy_timeout)?;
        writer.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        writer.execute_batch(SCHEMA)?;
        register_functions(&writer)?;

        let reader = open_reader(&config.database_path, busy_timeout)?;

        tracing::info!("Opened record store at {:?}", config.database_path);

        Ok(Self {
            writer: Arc::new(Mutex::new(Some(writer))),
            reader: Arc::new(Mutex::new(Some(reader))),
            batch_size: config.batch_size,
        })
    }

    /// Open a private in-memory store. Reader and writer share one connection.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        register_functions(&conn)?;

        let shared = Arc::new(Mutex::new(Some(conn)));
        Ok(Self {
            writer: Arc::clone(&shared),
            reader: shared,
            batch_size: StorageConfig::default().batch_size,
        })
    }

    /// Consume a record stream, writing it in batched transactions.
    ///
    /// A failed batch is recorded in `errors` and the stream keeps draining.
    /// On cancellation the pending partial batch is dropped.
    pub async fn store(
        &self,
        mut records: mpsc::Receiver<Record>,
        cancel: CancellationToken,
    ) -> StorageResult<ImportResult> {
        let start = Instant::now();
        let mut result = ImportResult::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        if lock(&self.writer)?.is_none() {
            return Err(StorageError::Closed);
        }

        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        "Import cancelled, discarding {} pending records",
                        batch.len()
                    );
                    batch.clear();
                    result.errors.push("import cancelled".to_string());
                    break;
                }
                next = records.recv() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            batch.push(record);
            result.total_records += 1;

            if batch.len() >= self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.flush_batch(full, &mut result).await;
            }
        }

        if !batch.is_empty() {
            self.flush_batch(batch, &mut result).await;
        }

        result.duration = start.elapsed().as_millis() as i64;
        tracing::info!(
            "Stored {}/{} records in {}ms ({} errors)",
            result.processed,
            result.total_records,
            result.duration,
            result.errors.len()
        );

        Ok(result)
    }

    async fn flush_batch(&self, batch: Vec<Record>, result: &mut ImportResult) {
        let writer = Arc::clone(&self.writer);
        let size = batch.len();

        let outcome = tokio::task::spawn_blocking(move || write_batch(&writer, &batch)).await;

        match outcome {
            Ok(Ok(written)) => {
                tracing::debug!("Committed batch of {} records", written);
                result.processed += written as i64;
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to store batch of {} records: {}", size, e);
                result.errors.push(format!("batch of {} records failed: {}", size, e));
            }
            Err(e) => {
                tracing::error!("Batch writer task failed: {}", e);
                result.errors.push(format!("batch of {} records failed: {}", size, e));
            }
        }
    }

    /// Write records in one transaction, returning the number written
    pub fn insert_batch(&self, records: &[Record]) -> StorageResult<usize> {
        write_batch(&self.writer, records)
    }

    /// Filtered, sorted, paginated read with the total matching count
    pub fn query(&self, query: &Query) -> StorageResult<QueryResult> {
        let start = Instant::now();

        let clause = build_where(&query.filters)?;
        let order = order_by(query.sort_by.as_deref(), query.sort_desc)?;

        let mut params = clause.params.clone();
        let paging = limit_offset(query.limit, query.offset, &mut params);

        let guard = lock(&self.reader)?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        // page and total read one snapshot
        let tx = conn.unchecked_transaction()?;

        let sql = format!("{}{}{}{}", SELECT_COLUMNS, clause.sql, order, paging);
        let records = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let count_sql = format!("SELECT COUNT(*) FROM records{}", clause.sql);
        let total: i64 =
            tx.query_row(&count_sql, params_from_iter(clause.params.iter()), |row| row.get(0))?;
        tx.commit()?;

        Ok(QueryResult {
            records,
            aggregations: HashMap::new(),
            total,
            took: start.elapsed().as_millis() as i64,
        })
    }

    /// Point lookup by id
    pub fn get_record(&self, id: &str) -> StorageResult<Record> {
        let guard = lock(&self.reader)?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        let mut stmt = conn.prepare_cached(&format!("{} WHERE id = ?", SELECT_COLUMNS))?;
        let record = stmt.query_row(params![id], row_to_record).optional()?;

        record.ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    /// Record counts per fixed-width time bucket, ascending
    pub fn timeline(
        &self,
        filters: &[FilterCondition],
        bucket_ms: i64,
    ) -> StorageResult<Vec<TimelinePoint>> {
        if bucket_ms <= 0 {
            return Err(StorageError::InvalidBucket(bucket_ms));
        }

        let clause = build_where(filters)?;

        let guard = lock(&self.reader)?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        // floor division without intermediate overflow: truncate, then step
        // down one bucket when a negative timestamp leaves a remainder
        let sql = format!(
            "SELECT (timestamp / ?) * ? - CASE WHEN timestamp % ? < 0 THEN ? ELSE 0 END AS bucket_start,
                    COUNT(*)
             FROM records{} GROUP BY bucket_start ORDER BY bucket_start ASC",
            clause.sql
        );

        let mut params = vec![SqlValue::Integer(bucket_ms); 4];
        params.extend(clause.params.iter().cloned());

        let mut stmt = conn.prepare(&sql)?;
        let points = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                Ok(TimelinePoint {
                    bucket_start: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(points)
    }

    /// Number of records matching the filters
    pub fn count(&self, filters: &[FilterCondition]) -> StorageResult<i64> {
        let clause = build_where(filters)?;

        let guard = lock(&self.reader)?;
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;

        let sql = format!("SELECT COUNT(*) FROM records{}", clause.sql);
        let count = conn.query_row(&sql, params_from_iter(clause.params.iter()), |row| row.get(0))?;

        Ok(count)
    }

    /// Release both connections. Closing twice is a no-op.
    pub fn close(&self) -> StorageResult<()> {
        for slot in [&self.reader, &self.writer] {
            let taken = lock(slot)?.take();
            if let Some(conn) = taken {
                conn.close().map_err(|(_, e)| StorageError::Database(e))?;
            }
        }
        Ok(())
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        lock(&self.writer).map(|g| g.is_none()).unwrap_or(true)
    }
}

fn open_reader(path: &Path, busy_timeout: Duration) -> StorageResult<Connection> {
    let reader = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    reader.busy_timeout(busy_timeout)?;
    register_functions(&reader)?;
    Ok(reader)
}

fn lock(slot: &SharedConnection) -> StorageResult<MutexGuard<'_, Option<Connection>>> {
    slot.lock().map_err(|e| StorageError::Lock(e.to_string()))
}

fn write_batch(slot: &SharedConnection, records: &[Record]) -> StorageResult<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut guard = lock(slot)?;
    let conn = guard.as_mut().ok_or(StorageError::Closed)?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR REPLACE INTO records (id, timestamp, level, message, service, fields, raw)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;

        for record in records {
            let fields = serde_json::to_vec(&record.fields)?;
            stmt.execute(params![
                record.id,
                record.timestamp,
                record.level,
                record.message,
                record.service,
                fields,
                record.raw,
            ])?;
        }
    }
    tx.commit()?;

    Ok(records.len())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: String = row.get(0)?;
    let fields = decode_fields(&id, row.get_ref(5)?);

    Ok(Record {
        id,
        timestamp: row.get(1)?,
        level: row.get(2)?,
        message: row.get(3)?,
        service: row.get(4)?,
        fields,
        raw: row.get(6)?,
    })
}

fn decode_fields(id: &str, value: ValueRef<'_>) -> HashMap<String, Value> {
    let bytes = match value {
        ValueRef::Blob(b) | ValueRef::Text(b) => b,
        _ => return HashMap::new(),
    };
    if bytes.is_empty() {
        return HashMap::new();
    }

    match serde_json::from_slice(bytes) {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!("Undecodable fields for record {}: {}", id, e);
            HashMap::new()
        }
    }
}
