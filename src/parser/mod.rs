//! LogLens Parsers
//!
//! Turn a byte source into a lazy stream of normalized records:
//!
//! - **plain**: Heuristic timestamp/level/service extraction from text
//! - **json**: One JSON object per line, alias-based attribute lookup
//! - **regex**: Caller-supplied pattern with named capture groups
//! - **grok**: Declared, not implemented
//! - **factory**: Build parsers from configuration, detect formats
//! - **stream**: The streaming driver shared by all line parsers
//!
//! # Example
//!
//! ```rust,ignore
//! use loglens::parser::{factory, ParserConfig, ParserKind};
//! use tokio_util::sync::CancellationToken;
//!
//! let parser = factory::create(&ParserConfig::new(ParserKind::Json))?;
//! let file = tokio::fs::File::open("app.log").await?;
//! let mut stream = parser.parse(file, CancellationToken::new())?;
//!
//! while let Some(record) = stream.recv().await {
//!     println!("{} {}", record.level, record.message);
//! }
//! ```

pub mod error;
pub mod factory;
pub mod grok;
pub mod json;
pub mod plain;
pub mod regex;
pub mod stream;
pub mod time;

pub use error::{ParseError, ParseResult};
pub use stream::{ByteSource, LineParser, ParseReport, RecordStream, StreamOptions};

use self::grok::GrokParser;
use self::json::JsonParser;
use self::plain::PlainParser;
use self::regex::RegexParser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Declared parser types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    #[default]
    Plain,
    Json,
    Regex,
    Grok,
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Regex => write!(f, "regex"),
            Self::Grok => write!(f, "grok"),
        }
    }
}

impl FromStr for ParserKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "regex" => Ok(Self::Regex),
            "grok" => Ok(Self::Grok),
            _ => Err(ParseError::UnsupportedType(s.to_string())),
        }
    }
}

/// How to parse a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserConfig {
    #[serde(rename = "type")]
    pub kind: ParserKind,
    /// Regex pattern (regex parser only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Capture group renames (regex parser only)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    /// strftime layout tried first for captured timestamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_format: Option<String>,
}

impl ParserConfig {
    pub fn new(kind: ParserKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Builder method: set regex pattern
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Builder method: set time layout
    pub fn time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = Some(format.into());
        self
    }

    /// Builder method: rename a capture group
    pub fn rename(mut self, group: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.insert(group.into(), target.into());
        self
    }
}

/// A configured parser
#[derive(Debug, Clone)]
pub enum Parser {
    Plain(PlainParser),
    Json(JsonParser),
    Regex(RegexParser),
    Grok(GrokParser),
}

impl Parser {
    pub fn kind(&self) -> ParserKind {
        match self {
            Parser::Plain(_) => ParserKind::Plain,
            Parser::Json(_) => ParserKind::Json,
            Parser::Regex(_) => ParserKind::Regex,
            Parser::Grok(_) => ParserKind::Grok,
        }
    }

    /// Parse a source with default stream options
    pub fn parse<R>(&self, source: R, cancel: CancellationToken) -> ParseResult<RecordStream>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.parse_with_options(source, cancel, StreamOptions::default())
    }

    /// Parse a source. The source is consumed and released when parsing ends.
    ///
    /// Records are produced by a spawned task, so this must be called from
    /// within a Tokio runtime; otherwise it returns [`ParseError::NoRuntime`].
    pub fn parse_with_options<R>(
        &self,
        source: R,
        cancel: CancellationToken,
        options: StreamOptions,
    ) -> ParseResult<RecordStream>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let source: ByteSource = Box::new(source);
        match self {
            Parser::Plain(p) => stream::spawn_line_stream(p.clone(), source, cancel, options),
            Parser::Json(p) => stream::spawn_line_stream(p.clone(), source, cancel, options),
            Parser::Regex(p) => stream::spawn_line_stream(p.clone(), source, cancel, options),
            Parser::Grok(p) => p.parse(),
        }
    }
}
