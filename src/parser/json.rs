//! JSON-lines parser
//!
//! Each line is one JSON object. Canonical attributes are looked up through
//! alias lists (first present alias wins); every other key is copied into
//! `fields` as-is.

use crate::parser::error::{ParseError, ParseResult};
use crate::parser::stream::LineParser;
use crate::parser::time::{epoch_seconds_to_millis, parse_first, JSON_LAYOUTS};
use crate::types::{now_millis, Record, DEFAULT_LEVEL};
use serde_json::{Map, Value};

const TIMESTAMP_KEYS: [&str; 5] = ["timestamp", "time", "@timestamp", "ts", "datetime"];
const LEVEL_KEYS: [&str; 4] = ["level", "severity", "priority", "loglevel"];
const SERVICE_KEYS: [&str; 5] = ["service", "service_name", "application", "app", "component"];
const MESSAGE_KEYS: [&str; 5] = ["message", "msg", "text", "content", "log"];

/// Parser for newline-delimited JSON objects
#[derive(Debug, Clone, Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }
}

fn is_standard_key(key: &str) -> bool {
    key == "id"
        || TIMESTAMP_KEYS.contains(&key)
        || LEVEL_KEYS.contains(&key)
        || SERVICE_KEYS.contains(&key)
        || MESSAGE_KEYS.contains(&key)
}

/// First alias holding a non-empty string
fn first_string<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| value.as_str().filter(|s| !s.is_empty()))
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_first(s, &JSON_LAYOUTS),
        Value::Number(n) => n.as_f64().map(epoch_seconds_to_millis),
        _ => None,
    }
}

impl LineParser for JsonParser {
    fn parse_line(&self, line: &str, line_no: usize) -> ParseResult<Record> {
        let line = line.trim();

        let object = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(ParseError::line(line_no, "not a JSON object")),
            Err(e) => return Err(ParseError::line(line_no, format!("invalid JSON: {}", e))),
        };

        let id = first_string(&object, &["id"])
            .map(str::to_string)
            .unwrap_or_else(|| format!("json_{}", line_no));

        let timestamp = TIMESTAMP_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(parse_timestamp)
            .unwrap_or_else(now_millis);

        let message = match first_string(&object, &MESSAGE_KEYS) {
            Some(message) => message.to_string(),
            None => Value::Object(object.clone()).to_string(),
        };

        let mut record = Record::new(id, line)
            .timestamp(timestamp)
            .level(first_string(&object, &LEVEL_KEYS).unwrap_or(DEFAULT_LEVEL))
            .message(message);
        record.service = first_string(&object, &SERVICE_KEYS).map(str::to_string);

        for (key, value) in object {
            if !is_standard_key(&key) {
                record.fields.insert(key, value);
            }
        }

        Ok(record)
    }
}
