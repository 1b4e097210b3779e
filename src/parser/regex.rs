//! Regex-driven parser
//!
//! Lines must match the whole pattern. Capture groups map onto record
//! attributes by name:
//!
//! | group name (case-insensitive)   | attribute   |
//! |---------------------------------|-------------|
//! | `timestamp`, `time`, `ts`       | timestamp   |
//! | `level`, `severity`, `priority` | level       |
//! | `service`, `app`, `application` | service     |
//! | `message`, `msg`, `text`        | message     |
//! | anything else                   | `fields`    |
//!
//! Unnamed groups land in `fields` as `field_<index>`.

use crate::parser::error::{ParseError, ParseResult};
use crate::parser::stream::LineParser;
use crate::parser::time::{parse_first, parse_with_format, REGEX_LAYOUTS};
use crate::parser::ParserConfig;
use crate::types::{now_millis, Record, DEFAULT_LEVEL};
use regex::Regex;
use std::collections::HashMap;

/// Parser driven by a caller-supplied pattern
#[derive(Debug, Clone)]
pub struct RegexParser {
    regex: Regex,
    time_format: Option<String>,
    /// Group name → target name, applied before canonical mapping
    renames: HashMap<String, String>,
}

impl RegexParser {
    /// Compile the configured pattern; empty or invalid patterns are rejected
    pub fn new(config: &ParserConfig) -> ParseResult<Self> {
        let pattern = config
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ParseError::Config("regex pattern is required".to_string()))?;

        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| ParseError::Config(format!("invalid regex pattern: {}", e)))?;

        Ok(Self {
            regex,
            time_format: config.time_format.clone().filter(|f| !f.is_empty()),
            renames: config.fields.clone(),
        })
    }

    fn parse_timestamp(&self, value: &str) -> Option<i64> {
        if let Some(format) = &self.time_format {
            if let Some(ts) = parse_with_format(value, format) {
                return Some(ts);
            }
        }
        parse_first(value, &REGEX_LAYOUTS)
    }
}

impl LineParser for RegexParser {
    fn parse_line(&self, line: &str, line_no: usize) -> ParseResult<Record> {
        let line = line.trim();
        let caps = self
            .regex
            .captures(line)
            .ok_or_else(|| ParseError::line(line_no, "line doesn't match regex pattern"))?;

        let mut record = Record::new(format!("regex_{}", line_no), line).level(DEFAULT_LEVEL);
        let mut timestamp = None;
        let mut message = None;

        for (index, name) in self.regex.capture_names().enumerate().skip(1) {
            let Some(m) = caps.get(index) else {
                continue;
            };
            let value = m.as_str();

            let group = name
                .map(str::to_string)
                .unwrap_or_else(|| format!("field_{}", index));
            let target = self.renames.get(&group).cloned().unwrap_or(group);

            match target.to_lowercase().as_str() {
                "timestamp" | "time" | "ts" => {
                    timestamp = Some(self.parse_timestamp(value).unwrap_or_else(now_millis));
                }
                // empty level or service captures keep the defaults
                "level" | "severity" | "priority" | "service" | "app" | "application"
                    if value.is_empty() => {}
                "level" | "severity" | "priority" => record = record.level(value),
                "service" | "app" | "application" => record.service = Some(value.to_string()),
                "message" | "msg" | "text" => message = Some(value.to_string()),
                _ => {
                    record.fields.insert(target, value.into());
                }
            }
        }

        if let Some(ts) = timestamp {
            record.timestamp = ts;
        }
        record.message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| line.to_string());

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserKind;
    use serde_json::json;

    fn parser(pattern: &str) -> RegexParser {
        RegexParser::new(&ParserConfig::new(ParserKind::Regex).pattern(pattern)).unwrap()
    }

    #[test]
    fn test_named_groups() {
        let p = parser(
            r"(?P<ts>\S+ \S+) \[(?P<Severity>\w+)\] (?P<app>[\w-]+): (?P<msg>.*) took=(?P<took>\d+)ms",
        );
        let record = p
            .parse_line("2024-01-01 00:00:00 [error] billing: charge failed took=35ms", 7)
            .unwrap();

        assert_eq!(record.id, "regex_7");
        assert_eq!(record.timestamp, 1_704_067_200_000);
        assert_eq!(record.level, "ERROR");
        assert_eq!(record.service.as_deref(), Some("billing"));
        assert_eq!(record.message, "charge failed");
        assert_eq!(record.fields["took"], json!("35"));
    }

    #[test]
    fn test_unnamed_groups_and_default_message() {
        let p = parser(r"(\w+) (\d+)");
        let record = p.parse_line("alpha 42", 1).unwrap();

        assert_eq!(record.fields["field_1"], json!("alpha"));
        assert_eq!(record.fields["field_2"], json!("42"));
        assert_eq!(record.message, "alpha 42");
        assert_eq!(record.level, "INFO");
    }

    #[test]
    fn test_must_match_whole_line() {
        let p = parser(r"\d+");
        assert!(p.parse_line("123", 1).is_ok());
        assert!(matches!(
            p.parse_line("abc 123", 2),
            Err(ParseError::Line { line: 2, .. })
        ));
    }

    #[test]
    fn test_optional_group_is_omitted() {
        let p = parser(r"(?P<word>\w+)(?: (?P<extra>\d+))?");
        let record = p.parse_line("hello", 1).unwrap();
        assert!(record.fields.contains_key("word"));
        assert!(!record.fields.contains_key("extra"));
    }

    #[test]
    fn test_empty_level_and_service_keep_defaults() {
        let p = parser(r"(?P<level>[A-Z]*)\|(?P<service>\w*)\|(?P<msg>.*)");
        let record = p.parse_line("||hello", 1).unwrap();

        assert_eq!(record.level, "INFO");
        assert!(record.service.is_none());
        assert_eq!(record.message, "hello");

        let record = p.parse_line("WARN|api|hello", 2).unwrap();
        assert_eq!(record.level, "WARN");
        assert_eq!(record.service.as_deref(), Some("api"));
    }

    #[test]
    fn test_custom_time_format_and_renames() {
        let config = ParserConfig::new(ParserKind::Regex)
            .pattern(r"(?P<when>\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}) (?P<body>.*)")
            .time_format("%d.%m.%Y %H:%M")
            .rename("when", "timestamp")
            .rename("body", "message");
        let record = RegexParser::new(&config)
            .unwrap()
            .parse_line("02.01.2024 00:00 rotated logs", 1)
            .unwrap();

        assert_eq!(record.timestamp, 1_704_153_600_000);
        assert_eq!(record.message, "rotated logs");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_unparsable_time_uses_now() {
        let before = now_millis();
        let record = parser(r"(?P<time>\w+) (?P<msg>.*)").parse_line("soon hi", 1).unwrap();
        assert!(record.timestamp >= before);
    }

    #[test]
    fn test_pattern_validation() {
        let empty = RegexParser::new(&ParserConfig::new(ParserKind::Regex));
        assert!(matches!(empty, Err(ParseError::Config(_))));

        let invalid = RegexParser::new(&ParserConfig::new(ParserKind::Regex).pattern("(unclosed"));
        assert!(matches!(invalid, Err(ParseError::Config(_))));
    }
}
