//! Line-oriented streaming driver shared by every parser
//!
//! The source is moved into a spawned task, so it is dropped exactly once
//! when the task ends: at end of input, on a read error, on cancellation or
//! when the consumer goes away.

use crate::parser::error::{ParseError, ParseResult};
use crate::types::Record;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Byte source accepted by parsers
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Per-line parsing, driven by [`spawn_line_stream`]
pub trait LineParser: Send + Sync + 'static {
    /// Turn one non-blank line into a record. `line_no` is 1-based.
    fn parse_line(&self, line: &str, line_no: usize) -> ParseResult<Record>;
}

/// Tuning for a parse run
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Bound of the record channel (default: 1000)
    pub channel_capacity: usize,
    /// Per-line errors kept in the report (default: 100)
    pub max_recorded_errors: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            max_recorded_errors: 100,
        }
    }
}

/// Counters for a parse run, readable while it is in progress
#[derive(Debug, Default)]
pub struct ParseReport {
    lines_read: AtomicUsize,
    lines_skipped: AtomicUsize,
    errors: Mutex<Vec<String>>,
    max_errors: usize,
}

impl ParseReport {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            ..Default::default()
        }
    }

    /// Lines read so far, blank ones included
    pub fn lines_read(&self) -> usize {
        self.lines_read.load(Ordering::Relaxed)
    }

    /// Lines that failed to parse
    pub fn lines_skipped(&self) -> usize {
        self.lines_skipped.load(Ordering::Relaxed)
    }

    /// Recorded error messages, oldest first
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn skipped(&self, message: String) {
        self.lines_skipped.fetch_add(1, Ordering::Relaxed);
        self.record_error(message);
    }

    fn record_error(&self, message: String) {
        if let Ok(mut errors) = self.errors.lock() {
            if errors.len() < self.max_errors {
                errors.push(message);
            }
        }
    }
}

/// Lazy, one-pass stream of parsed records
pub struct RecordStream {
    records: mpsc::Receiver<Record>,
    report: Arc<ParseReport>,
}

impl RecordStream {
    /// Next record, `None` once the producer has finished
    pub async fn recv(&mut self) -> Option<Record> {
        self.records.recv().await
    }

    pub fn report(&self) -> Arc<ParseReport> {
        Arc::clone(&self.report)
    }

    /// Split into the raw channel and the shared report
    pub fn into_parts(self) -> (mpsc::Receiver<Record>, Arc<ParseReport>) {
        (self.records, self.report)
    }

    /// Drain the stream into a vector
    pub async fn collect(mut self) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(record) = self.recv().await {
            records.push(record);
        }
        records
    }
}

/// Spawn the producer task for a line parser.
///
/// Fails with [`ParseError::NoRuntime`] when called outside a Tokio runtime.
pub fn spawn_line_stream<P: LineParser>(
    parser: P,
    source: ByteSource,
    cancel: CancellationToken,
    options: StreamOptions,
) -> ParseResult<RecordStream> {
    let runtime = Handle::try_current().map_err(|_| ParseError::NoRuntime)?;

    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    let report = Arc::new(ParseReport::new(options.max_recorded_errors));
    let task_report = Arc::clone(&report);

    runtime.spawn(async move {
        let report = task_report;
        let mut reader = BufReader::new(source);
        let mut buf = Vec::with_capacity(4096);
        let mut line_no = 0usize;
        let mut emitted = 0usize;

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Read failed after line {}: {}", line_no, e);
                    report.record_error(format!("read failed after line {}: {}", line_no, e));
                    break;
                }
            }

            line_no += 1;
            report.lines_read.fetch_add(1, Ordering::Relaxed);

            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }

            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }

            match parser.parse_line(&line, line_no) {
                Ok(record) => {
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = tx.send(record) => sent,
                    };
                    if sent.is_err() {
                        break;
                    }
                    emitted += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping line {}: {}", line_no, e);
                    report.skipped(e.to_string());
                }
            }
        }

        tracing::debug!(
            "Parser finished: {} lines read, {} records, {} skipped",
            line_no,
            emitted,
            report.lines_skipped()
        );
    });

    Ok(RecordStream { records: rx, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::ReadBuf;

    /// Echoes each line; lines starting with `!` fail
    struct EchoParser;

    impl LineParser for EchoParser {
        fn parse_line(&self, line: &str, line_no: usize) -> ParseResult<Record> {
            if line.starts_with('!') {
                return Err(ParseError::line(line_no, "bang"));
            }
            Ok(Record::new(format!("echo_{}", line_no), line).message(line))
        }
    }

    fn source(text: &'static str) -> ByteSource {
        Box::new(text.as_bytes())
    }

    /// Never reaches end of input; counts how often it is dropped
    struct EndlessLines {
        drops: Arc<AtomicUsize>,
    }

    impl AsyncRead for EndlessLines {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let chunk = b"line\n";
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for EndlessLines {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_line_numbering_and_blank_lines() {
        let stream = spawn_line_stream(
            EchoParser,
            source("first\r\n\n   \nsecond\nthird"),
            CancellationToken::new(),
            StreamOptions::default(),
        )
        .unwrap();
        let report = stream.report();
        let records = stream.collect().await;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["echo_1", "echo_4", "echo_5"]);
        assert_eq!(records[0].raw, "first");
        assert_eq!(report.lines_read(), 5);
        assert_eq!(report.lines_skipped(), 0);
    }

    #[tokio::test]
    async fn test_bad_lines_are_skipped_and_recorded() {
        let stream = spawn_line_stream(
            EchoParser,
            source("ok\n!bad\n!worse\nfine\n"),
            CancellationToken::new(),
            StreamOptions {
                channel_capacity: 1,
                max_recorded_errors: 1,
            },
        )
        .unwrap();
        let report = stream.report();
        let records = stream.collect().await;

        assert_eq!(records.len(), 2);
        assert_eq!(report.lines_skipped(), 2);
        assert_eq!(report.errors(), vec!["Line 2: bang".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let bytes: &'static [u8] = b"caf\xe9 ok\n";
        let stream = spawn_line_stream(
            EchoParser,
            Box::new(bytes),
            CancellationToken::new(),
            StreamOptions::default(),
        )
        .unwrap();
        let records = stream.collect().await;
        assert_eq!(records[0].message, "caf\u{FFFD} ok");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stream = spawn_line_stream(
            EchoParser,
            source("a\nb\nc\n"),
            cancel,
            StreamOptions::default(),
        )
        .unwrap();
        assert!(stream.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_releases_source_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let mut stream = spawn_line_stream(
            EchoParser,
            Box::new(EndlessLines {
                drops: Arc::clone(&drops),
            }),
            cancel.clone(),
            StreamOptions {
                channel_capacity: 1,
                max_recorded_errors: 10,
            },
        )
        .unwrap();
        let report = stream.report();

        for _ in 0..3 {
            let record = stream.recv().await.unwrap();
            assert_eq!(record.message, "line");
        }
        cancel.cancel();

        let mut received = 3;
        while stream.recv().await.is_some() {
            received += 1;
        }
        assert!(received <= 5, "stream kept producing after cancel: {}", received);

        for _ in 0..100 {
            if drops.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(report.lines_read() >= 3);
    }
}
