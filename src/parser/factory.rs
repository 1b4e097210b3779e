//! Parser factory and format detection
//!
//! Detection order:
//! 1. The whole sample is one JSON document → JSON
//! 2. Every complete line is a JSON object → JSON
//! 3. Timestamp / bracketed level / bracketed token anchors → Plain
//! 4. Anything else → Plain

use crate::parser::error::ParseResult;
use crate::parser::grok::GrokParser;
use crate::parser::json::JsonParser;
use crate::parser::plain::PlainParser;
use crate::parser::regex::RegexParser;
use crate::parser::{Parser, ParserConfig, ParserKind};
use regex::Regex;
use serde_json::Value;

const PLAIN_ANCHORS: [&str; 3] = [
    r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}",
    r"\[(TRACE|DEBUG|INFO|WARN|ERROR|FATAL|PANIC)\]",
    r"\[([a-zA-Z0-9_-]+)\]",
];

/// Build the parser a configuration asks for
pub fn create(config: &ParserConfig) -> ParseResult<Parser> {
    let parser = match config.kind {
        ParserKind::Plain => Parser::Plain(PlainParser::new()?),
        ParserKind::Json => Parser::Json(JsonParser::new()),
        ParserKind::Regex => Parser::Regex(RegexParser::new(config)?),
        ParserKind::Grok => Parser::Grok(GrokParser::new()),
    };
    tracing::debug!("Created {} parser", config.kind);
    Ok(parser)
}

/// Every parser type the factory accepts
pub fn supported_types() -> Vec<ParserKind> {
    vec![
        ParserKind::Plain,
        ParserKind::Json,
        ParserKind::Regex,
        ParserKind::Grok,
    ]
}

/// Best-effort format guess from the first bytes of a source
pub fn auto_detect(sample: &[u8]) -> ParserKind {
    if serde_json::from_slice::<Value>(sample).is_ok() || is_json_lines(sample) {
        return ParserKind::Json;
    }

    let text = String::from_utf8_lossy(sample);
    if has_plain_anchor(&text) {
        tracing::debug!("Detected structured plain-text sample");
    }

    ParserKind::Plain
}

/// Complete, non-blank lines are all JSON objects; a cut-off last line is ignored
fn is_json_lines(sample: &[u8]) -> bool {
    let mut lines: Vec<&[u8]> = sample.split(|b| *b == b'\n').collect();
    if !sample.ends_with(b"\n") {
        lines.pop();
    }

    let mut objects = 0;
    for line in lines {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(_)) => objects += 1,
            _ => return false,
        }
    }
    objects > 0
}

fn has_plain_anchor(text: &str) -> bool {
    PLAIN_ANCHORS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::error::ParseError;

    #[test]
    fn test_detect_whole_json_document() {
        assert_eq!(auto_detect(br#"{"level":"info","msg":"ok"}"#), ParserKind::Json);
        assert_eq!(auto_detect(b"[1, 2, 3]"), ParserKind::Json);
    }

    #[test]
    fn test_detect_json_lines_with_truncated_tail() {
        let sample = b"{\"msg\":\"a\"}\n{\"msg\":\"b\"}\n{\"msg\":\"c";
        assert_eq!(auto_detect(sample), ParserKind::Json);
    }

    #[test]
    fn test_detect_plain() {
        assert_eq!(
            auto_detect(b"2024-01-01 10:00:00 [ERROR] [api] boom\n"),
            ParserKind::Plain
        );
        assert_eq!(auto_detect(b"free text without anchors"), ParserKind::Plain);
        assert_eq!(auto_detect(b"{\"msg\":\"a\"}\nplain line\n"), ParserKind::Plain);
        assert_eq!(auto_detect(b""), ParserKind::Plain);
    }

    #[test]
    fn test_anchors() {
        assert!(has_plain_anchor("[INFO] started"));
        assert!(has_plain_anchor("[worker-1] started"));
        assert!(!has_plain_anchor("started"));
    }

    #[test]
    fn test_create() {
        assert_eq!(create(&ParserConfig::new(ParserKind::Json)).unwrap().kind(), ParserKind::Json);
        assert!(matches!(
            create(&ParserConfig::new(ParserKind::Regex)),
            Err(ParseError::Config(_))
        ));
        assert_eq!(create(&ParserConfig::new(ParserKind::Grok)).unwrap().kind(), ParserKind::Grok);
        assert_eq!(supported_types().len(), 4);
    }
}
