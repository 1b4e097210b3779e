//! Grok parser placeholder
//!
//! Accepted by the factory so configurations round-trip, but parsing always
//! fails with `ParseError::NotImplemented`.

use crate::parser::error::{ParseError, ParseResult};
use crate::parser::stream::RecordStream;

#[derive(Debug, Clone, Default)]
pub struct GrokParser;

impl GrokParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self) -> ParseResult<RecordStream> {
        Err(ParseError::NotImplemented("grok".to_string()))
    }
}
