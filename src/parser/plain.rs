//! Plain-text log parser
//!
//! Heuristic extraction from free-form lines:
//!
//! ```text
//! 2024-01-15 10:30:45 ERROR [auth-service] Failed login for user admin
//! └──── timestamp ──┘ └lvl┘ └─ service ──┘ └──────── message ────────┘
//! ```
//!
//! Level detection is a substring scan in priority order, so a word such as
//! `INFORMATION` reads as `INFO`.

use crate::parser::error::{ParseError, ParseResult};
use crate::parser::stream::LineParser;
use crate::parser::time::{parse_first, PLAIN_LAYOUTS};
use crate::types::{now_millis, Record, DEFAULT_LEVEL, LEVELS};
use regex::Regex;

const TIMESTAMP_SHAPES: [&str; 5] = [
    r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}",
    r"\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}",
    r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}",
    r"[A-Z][a-z]{2} \d{2} \d{2}:\d{2}:\d{2}",
    r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}",
];

/// Fractional seconds and zone letters trailing a timestamp
const TIMESTAMP_SUFFIX: &str = r"^[\.\d]*[A-Z]*";

const SERVICE_PATTERNS: [&str; 3] = [
    r"\[([a-zA-Z0-9_-]+)\]",
    r"([a-zA-Z0-9_-]+):",
    r"service=([a-zA-Z0-9_-]+)",
];

/// Parser for unstructured text lines
#[derive(Debug, Clone)]
pub struct PlainParser {
    timestamp_shapes: Vec<Regex>,
    timestamp_suffix: Regex,
    level_words: Vec<(&'static str, Regex)>,
    service_patterns: Vec<Regex>,
}

struct Timestamp {
    millis: i64,
    start: usize,
    end: usize,
}

fn compile(pattern: &str) -> ParseResult<Regex> {
    Regex::new(pattern).map_err(|e| ParseError::Config(e.to_string()))
}

impl PlainParser {
    pub fn new() -> ParseResult<Self> {
        Ok(Self {
            timestamp_shapes: TIMESTAMP_SHAPES
                .iter()
                .map(|p| compile(p))
                .collect::<ParseResult<_>>()?,
            timestamp_suffix: compile(TIMESTAMP_SUFFIX)?,
            level_words: LEVELS
                .iter()
                .map(|level| -> ParseResult<(&'static str, Regex)> {
                    Ok((*level, compile(&format!(r"(?i)\[?\b{}\b\]?:?", level))?))
                })
                .collect::<ParseResult<_>>()?,
            service_patterns: SERVICE_PATTERNS
                .iter()
                .map(|p| compile(p))
                .collect::<ParseResult<_>>()?,
        })
    }

    fn extract_timestamp(&self, line: &str) -> Option<Timestamp> {
        for shape in &self.timestamp_shapes {
            let Some(m) = shape.find(line) else {
                continue;
            };
            if let Some(millis) = parse_first(m.as_str(), &PLAIN_LAYOUTS) {
                let suffix = self
                    .timestamp_suffix
                    .find(&line[m.end()..])
                    .map_or(0, |s| s.end());
                return Some(Timestamp {
                    millis,
                    start: m.start(),
                    end: m.end() + suffix,
                });
            }
        }
        None
    }

    fn extract_level(line: &str) -> Option<&'static str> {
        let upper = line.to_uppercase();
        LEVELS.iter().copied().find(|level| upper.contains(level))
    }

    /// Returns (service, matched text)
    fn extract_service(&self, line: &str) -> Option<(String, String)> {
        for pattern in &self.service_patterns {
            for caps in pattern.captures_iter(line) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let upper = name.as_str().to_uppercase();
                if LEVELS.contains(&upper.as_str()) {
                    continue;
                }
                return Some((name.as_str().to_string(), whole.as_str().to_string()));
            }
        }
        None
    }
}

impl LineParser for PlainParser {
    fn parse_line(&self, line: &str, line_no: usize) -> ParseResult<Record> {
        let timestamp = self.extract_timestamp(line);

        // timestamp digits and colons must not read as a service
        let mut message = line.to_string();
        let mut scan = line.to_string();
        if let Some(ts) = &timestamp {
            message.replace_range(ts.start..ts.end, "");
            scan.replace_range(ts.start..ts.end, &" ".repeat(ts.end - ts.start));
        }

        let level = Self::extract_level(line);
        if let Some(level) = level {
            if let Some((_, word)) = self.level_words.iter().find(|(l, _)| *l == level) {
                message = word.replacen(&message, 1, "").into_owned();
            }
        }

        let service = self.extract_service(&scan);
        if let Some((_, matched)) = &service {
            message = message.replacen(matched.as_str(), "", 1);
        }

        let mut record = Record::new(format!("line_{}", line_no), line)
            .timestamp(timestamp.map_or_else(now_millis, |ts| ts.millis))
            .level(level.unwrap_or(DEFAULT_LEVEL))
            .message(message.trim());
        record.service = service.map(|(name, _)| name);

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Record {
        PlainParser::new().unwrap().parse_line(line, 1).unwrap()
    }

    #[test]
    fn test_full_line() {
        let record = parse("2024-01-15 10:30:45 ERROR [auth-service] Failed login for user admin");

        assert_eq!(record.id, "line_1");
        assert_eq!(record.timestamp, 1_705_314_645_000);
        assert_eq!(record.level, "ERROR");
        assert_eq!(record.service.as_deref(), Some("auth-service"));
        assert_eq!(record.message, "Failed login for user admin");
        assert_eq!(
            record.raw,
            "2024-01-15 10:30:45 ERROR [auth-service] Failed login for user admin"
        );
    }

    #[test]
    fn test_bracketed_level_is_not_a_service() {
        let record = parse("2024/01/15 10:30:45 [WARN] [db] slow query");
        assert_eq!(record.level, "WARN");
        assert_eq!(record.service.as_deref(), Some("db"));
        assert_eq!(record.message, "slow query");

        let record = parse("[ERROR] disk full");
        assert_eq!(record.level, "ERROR");
        assert!(record.service.is_none());
    }

    #[test]
    fn test_colon_service_ignores_timestamp() {
        let record = parse("2024-01-15 10:30:45 INFO api: request served");
        assert_eq!(record.service.as_deref(), Some("api"));
        assert_eq!(record.message, "request served");
    }

    #[test]
    fn test_service_equals_pattern() {
        let record = parse("debug something happened service=billing");
        assert_eq!(record.level, "DEBUG");
        assert_eq!(record.service.as_deref(), Some("billing"));
        assert_eq!(record.message, "something happened");
    }

    #[test]
    fn test_defaults_when_nothing_detected() {
        let before = now_millis();
        let record = parse("just some text");

        assert_eq!(record.level, "INFO");
        assert!(record.timestamp >= before);
        assert_eq!(record.service, None);
        assert_eq!(record.message, "just some text");
    }

    #[test]
    fn test_level_substring_heuristic() {
        let record = parse("INFORMATION only");
        assert_eq!(record.level, "INFO");
        // not a whole word, so it stays in the message
        assert_eq!(record.message, "INFORMATION only");
    }

    #[test]
    fn test_fractional_suffix_stripped_from_message() {
        let record = parse("2024-01-15T10:30:45.123Z TRACE entering handler");
        assert_eq!(record.timestamp, 1_705_314_645_000);
        assert_eq!(record.level, "TRACE");
        assert_eq!(record.message, "entering handler");
    }

    #[test]
    fn test_month_day_first() {
        let record = parse("01/15/2024 10:30:45 FATAL out of memory");
        assert_eq!(record.timestamp, 1_705_314_645_000);
        assert_eq!(record.level, "FATAL");
    }
}
