//! Conversion of raw remote events into records.
//!
//! With a [`TextParser`] configured the parser owns the conversion. Without one
//! the built-in policy applies: take the span from the first `{` to the last
//! `}` in the message and use it when it parses as a JSON object, otherwise
//! wrap the raw line. The span heuristic mis-extracts lines that carry several
//! JSON fragments or braces inside string literals; that imprecision is
//! accepted.

use crate::runtime::sink::Record;
use crate::source::RawEvent;
use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const MESSAGE_FIELD: &str = "message";
pub const LOG_NAME_FIELD: &str = "@log_name";

/// Pluggable conversion of a raw message into `(timestamp_seconds, fields)`.
pub trait TextParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<(i64, Map<String, Value>)>;
}

/// Skipped vs. total counts for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    pub total: u64,
    pub skipped: u64,
}

impl ExtractionStats {
    pub fn emitted(&self) -> u64 {
        self.total.saturating_sub(self.skipped)
    }
}

#[derive(Clone)]
pub struct RecordExtractor {
    tag: String,
    parser: Option<Arc<dyn TextParser>>,
}

impl RecordExtractor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            parser: None,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn TextParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Converts one event. Failures are counted in `stats` and yield `None`;
    /// they never abort the surrounding batch.
    pub fn extract(&self, event: &RawEvent, stats: &mut ExtractionStats) -> Option<Record> {
        stats.total += 1;
        match self.try_extract(event) {
            Ok(record) => Some(record),
            Err(err) => {
                stats.skipped += 1;
                tracing::debug!(
                    error = %err,
                    timestamp_millis = event.timestamp_millis,
                    "skipping event that could not be extracted"
                );
                None
            }
        }
    }

    fn try_extract(&self, event: &RawEvent) -> Result<Record> {
        if let Some(parser) = &self.parser {
            let (time, fields) = parser.parse(&event.message)?;
            return Ok(Record::new(self.tag.clone(), time, fields));
        }

        let time = event.timestamp_millis.div_euclid(1000);
        let fields = json_object_span(&event.message)
            .and_then(parse_object)
            .unwrap_or_else(|| self.wrap_raw(&event.message));
        Ok(Record::new(self.tag.clone(), time, fields))
    }

    fn wrap_raw(&self, message: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(MESSAGE_FIELD.to_owned(), Value::String(message.to_owned()));
        fields.insert(LOG_NAME_FIELD.to_owned(), Value::String(self.tag.clone()));
        fields
    }
}

/// Span from the first `{` through the last `}`, if both exist in that order.
pub fn json_object_span(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    (end > start).then(|| &line[start..=end])
}

fn parse_object(span: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(fields)) => Some(fields),
        _ => None,
    }
}
