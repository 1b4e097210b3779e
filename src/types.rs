//! Core data types shared by every LogLens stage
//!
//! - `Record`: one normalized log line
//! - `FilterCondition`, `Query`, `Aggregation`: query description
//! - `QueryResult`, `ImportResult`, `TimelinePoint`: results handed back to callers
//!
//! Field names serialize in camelCase to match the desktop shell's wire format.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Level assigned when a line carries no recognizable level
pub const DEFAULT_LEVEL: &str = "INFO";

/// Level keywords in detection priority order
pub const LEVELS: [&str; 7] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR", "FATAL", "PANIC"];

/// Canonical record attributes that map to physical columns
pub const CANONICAL_FIELDS: [&str; 6] = ["id", "timestamp", "level", "message", "service", "raw"];

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A single normalized log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within a store; re-storing the same id overwrites
    pub id: String,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Upper-cased severity
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Open set of extra attributes
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    /// The original line
    pub raw: String,
}

impl Record {
    /// Create a record stamped with the ingestion time and the default level
    pub fn new(id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: now_millis(),
            level: DEFAULT_LEVEL.to_string(),
            message: String::new(),
            service: None,
            fields: HashMap::new(),
            raw: raw.into(),
        }
    }

    /// Builder method: set timestamp (epoch ms)
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder method: set level, normalized to upper case
    pub fn level(mut self, level: impl AsRef<str>) -> Self {
        self.level = level.as_ref().to_uppercase();
        self
    }

    /// Builder method: set message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Builder method: set service
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Builder method: add an extra field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Resolve a field name to its value.
    ///
    /// Canonical names map to first-class attributes; anything else is looked
    /// up in `fields`. Returns `None` when the value is absent.
    pub fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "timestamp" => Some(Value::from(self.timestamp)),
            "level" => Some(Value::String(self.level.clone())),
            "message" => Some(Value::String(self.message.clone())),
            "service" => self.service.clone().map(Value::String),
            "raw" => Some(Value::String(self.raw.clone())),
            other => match self.fields.get(other) {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.clone()),
            },
        }
    }
}

/// Kind of filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Equality,
    Exclusion,
    Contains,
    Regexp,
    Range,
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equality => write!(f, "equality"),
            Self::Exclusion => write!(f, "exclusion"),
            Self::Contains => write!(f, "contains"),
            Self::Regexp => write!(f, "regexp"),
            Self::Range => write!(f, "range"),
        }
    }
}

/// Comparison operator for range filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    /// Parse from the wire names gt/gte/lt/lte
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    /// Whether a three-way comparison result satisfies this operator
    pub fn accepts(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Gt => ordering == Greater,
            Self::Gte => ordering != Less,
            Self::Lt => ordering == Less,
            Self::Lte => ordering != Greater,
        }
    }

    /// SQL comparison operator
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub field: String,
    #[serde(default)]
    pub value: Value,
    /// Range operator: gt, gte, lt, lte
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

impl FilterCondition {
    pub fn new(filter_type: FilterType, field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            filter_type,
            field: field.into(),
            value: value.into(),
            operator: None,
        }
    }

    pub fn equality(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterType::Equality, field, value)
    }

    pub fn exclusion(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterType::Exclusion, field, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(FilterType::Contains, field, value)
    }

    pub fn regexp(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(FilterType::Regexp, field, Value::String(pattern.into()))
    }

    pub fn range(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            operator: Some(operator.into()),
            ..Self::new(FilterType::Range, field, value)
        }
    }

    /// Parsed range operator, `None` when missing or unsupported
    pub fn range_op(&self) -> Option<RangeOp> {
        self.operator.as_deref().and_then(RangeOp::parse)
    }
}

/// An aggregation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// count, avg, sum, min or max
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Aggregation {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            field: None,
            alias: None,
        }
    }

    /// Builder method: aggregate over a field
    pub fn on(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Builder method: set an explicit result name
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Aggregated field, with `*` and empty treated as "whole record"
    pub fn target(&self) -> Option<&str> {
        self.field
            .as_deref()
            .filter(|f| !f.is_empty() && *f != "*")
    }

    /// Result name: explicit alias, else `<function>` or `<function>_<field>`
    pub fn resolved_alias(&self) -> String {
        if let Some(alias) = self.alias.as_deref().filter(|a| !a.is_empty()) {
            return alias.to_string();
        }
        match self.field.as_deref().filter(|f| !f.is_empty()) {
            Some(field) => format!("{}_{}", self.function, field),
            None => self.function.clone(),
        }
    }
}

/// A structured query over stored records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Conjunctively combined conditions
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_desc: bool,
    /// Page size; `None` means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a filter condition
    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Builder method: add an aggregation
    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Builder method: sort by a column
    pub fn sort(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.sort_by = Some(field.into());
        self.sort_desc = desc;
        self
    }

    /// Builder method: set a limit
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Builder method: set an offset
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }
}

/// Result of a query execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// The requested page
    pub records: Vec<Record>,
    /// Aggregations computed over `records`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub aggregations: HashMap<String, Value>,
    /// Size of the full filtered set
    pub total: i64,
    /// Execution time in milliseconds
    pub took: i64,
}

/// Summary of an import run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    /// Records received from the parser
    pub total_records: i64,
    /// Records committed to storage
    pub processed: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Elapsed time in milliseconds
    pub duration: i64,
}

/// Timeline histogram request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRequest {
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    pub bucket_ms: i64,
}

/// One timeline bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub bucket_start: i64,
    pub count: i64,
}

/// Store-wide counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_records: i64,
    pub level_counts: HashMap<String, i64>,
    pub last_updated: i64,
}
