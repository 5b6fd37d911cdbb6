//! Log line parsing: one line of worker output → one [`LogRecord`].
//!
//! # Formats (first match wins)
//! 1. a JSON object (`severity`, `message`, `datetime`, `channel`, `context`, `extra`)
//! 2. `[datetime] channel.LEVEL: message {context} {extra}`
//! 3. `datetime LEVEL [channel] message [context] [extra]`
//! 4. anything else: the trimmed line becomes the message, other fields stay empty
//!
//! Parsing is total. Undecodable context/extra text is kept verbatim.

mod formats;
pub mod literal;

use regex::Captures;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::LogRecord;
use crate::domain::log_record::normalize_fields;

pub use self::formats::parse_timestamp;
pub use self::literal::{LiteralError, parse_literal};

const DEFAULT_JSON_SEVERITY: &str = "DEBUG";

/// Parser for worker log lines.
///
/// `relaxed` is off by default. When on, context/extra text that is not JSON
/// is given a second chance through [`parse_literal`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogParser {
    relaxed: bool,
}

impl LogParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    pub fn is_relaxed(&self) -> bool {
        self.relaxed
    }

    pub fn parse(&self, line: &str) -> LogRecord {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(record) = self.parse_json(line) {
            return record;
        }
        if let Some(caps) = formats::CHANNEL_LEVEL.captures(line) {
            return self.from_captures(&caps);
        }
        if let Some(caps) = formats::LEVEL_CHANNEL.captures(line) {
            return self.from_captures(&caps);
        }

        debug!(line, "log line matched no known format");
        LogRecord::new("", line.trim())
    }

    fn parse_json(&self, line: &str) -> Option<LogRecord> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(trimmed) else {
            return None;
        };

        let level = take_text(&mut fields, "severity")
            .unwrap_or_else(|| DEFAULT_JSON_SEVERITY.to_string());
        let message = take_text(&mut fields, "message").unwrap_or_default();
        let timestamp = take_text(&mut fields, "datetime")
            .as_deref()
            .and_then(parse_timestamp);
        let channel = take_text(&mut fields, "channel");
        let context = fields.remove("context").unwrap_or(Value::Null);
        let extra = fields.remove("extra").unwrap_or(Value::Null);

        Some(
            LogRecord::new(level, message)
                .with_timestamp(timestamp)
                .with_channel(channel)
                .with_context(context)
                .with_extra(extra),
        )
    }

    fn from_captures(&self, caps: &Captures<'_>) -> LogRecord {
        let text = |name: &str| caps.name(name).map(|m| m.as_str());

        let timestamp = text("datetime").and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                debug!(datetime = raw, "unparseable log timestamp");
            }
            parsed
        });

        LogRecord::new(text("level").unwrap_or_default(), text("message").unwrap_or_default())
            .with_timestamp(timestamp)
            .with_channel(text("channel").map(str::to_string))
            .with_context(self.decode_fields("context", text("context")))
            .with_extra(self.decode_fields("extra", text("extra")))
    }

    /// Strict JSON, then (opt-in) the literal parser, then the raw text.
    fn decode_fields(&self, field: &'static str, raw: Option<&str>) -> Value {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Value::Object(Map::new());
        };

        let json_err = match serde_json::from_str::<Value>(raw) {
            Ok(value) => return normalize_fields(value),
            Err(err) => err,
        };

        if self.relaxed {
            match parse_literal(raw) {
                Ok(value) => return normalize_fields(value),
                Err(err) => {
                    warn!(field, raw, error = %err, "could not decode log field, keeping raw text");
                }
            }
        } else {
            warn!(field, raw, error = %json_err, "log field is not JSON, keeping raw text");
        }
        Value::String(raw.to_string())
    }
}

fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() && key == "datetime" => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn json_line() {
        let line = r#"{"severity":"ERROR","message":"boom","datetime":"2024-01-01T00:00:00Z","context":{"x":1},"extra":{}}"#;
        let r = LogParser::new().parse(line);

        assert_eq!(r.level(), "ERROR");
        assert_eq!(r.message(), "boom");
        assert_eq!(
            r.timestamp(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(r.channel(), None);
        assert_eq!(r.context(), &json!({"x": 1}));
        assert_eq!(r.extra(), &json!({}));
    }

    #[test]
    fn json_line_defaults() {
        let r = LogParser::new().parse(r#"{"message":"quiet","datetime":""}"#);
        assert_eq!(r.level(), "DEBUG");
        assert_eq!(r.timestamp(), None);
        assert_eq!(r.context(), &json!({}));
        assert_eq!(r.extra(), &json!({}));
    }

    #[test]
    fn json_line_keeps_all_keys_verbatim() {
        let line = json!({
            "severity": "NOTICE",
            "message": "order shipped",
            "channel": "shop",
            "context": {"order": {"id": 99, "lines": [1, 2]}, "ok": true},
            "extra": {"process_id": "1704067200-00ff00ff", "memory": 1024},
        })
        .to_string();
        let r = LogParser::new().parse(&line);
        assert_eq!(r.level(), "NOTICE");
        assert_eq!(r.message(), "order shipped");
        assert_eq!(r.channel(), Some("shop"));
        assert_eq!(
            r.context(),
            &json!({"order": {"id": 99, "lines": [1, 2]}, "ok": true})
        );
        assert_eq!(
            r.extra(),
            &json!({"process_id": "1704067200-00ff00ff", "memory": 1024})
        );
    }

    #[test]
    fn json_array_is_not_a_json_record() {
        let r = LogParser::new().parse("[1, 2, 3]");
        assert_eq!(r.level(), "");
        assert_eq!(r.message(), "[1, 2, 3]");
    }

    #[test]
    fn channel_level_line() {
        let r = LogParser::new().parse("[2024-01-01T00:00:00+00:00] app.INFO: hello {} []");
        assert_eq!(r.level(), "INFO");
        assert_eq!(r.channel(), Some("app"));
        assert_eq!(r.message(), "hello");
        assert_eq!(
            r.timestamp(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(r.context(), &json!({}));
        assert_eq!(r.extra(), &json!({}));
    }

    #[test]
    fn channel_level_line_with_context() {
        let r = LogParser::new().parse(
            r#"[2024-03-02 10:00:00] console.ERROR: Import failed for file {"file":"a.csv","rows":3} {"process_id":"1-abc"}"#,
        );
        assert_eq!(r.level(), "ERROR");
        assert_eq!(r.channel(), Some("console"));
        assert_eq!(r.message(), "Import failed for file");
        assert_eq!(r.context(), &json!({"file": "a.csv", "rows": 3}));
        assert_eq!(r.extra(), &json!({"process_id": "1-abc"}));
    }

    #[rstest]
    #[case::with_extra(
        r#"2024-01-01T00:00:00Z INFO [billing] invoice sent {"id":4} {"pid":1}"#,
        json!({"pid": 1})
    )]
    #[case::without_extra(r#"2024-01-01T00:00:00Z INFO [billing] invoice sent {"id":4}"#, json!({}))]
    fn level_channel_line(#[case] line: &str, #[case] extra: Value) {
        let r = LogParser::new().parse(line);
        assert_eq!(r.level(), "INFO");
        assert_eq!(r.channel(), Some("billing"));
        assert_eq!(r.message(), "invoice sent");
        assert_eq!(r.context(), &json!({"id": 4}));
        assert_eq!(r.extra(), &extra);
    }

    #[test]
    fn unmatched_line_keeps_text_as_message() {
        let r = LogParser::new().parse("  PHP Warning: something odd  \n");
        assert_eq!(r.level(), "");
        assert_eq!(r.message(), "PHP Warning: something odd");
        assert_eq!(r.timestamp(), None);
        assert_eq!(r.channel(), None);
        assert_eq!(r.context(), &json!({}));
    }

    #[test]
    fn strict_mode_keeps_non_json_context_raw() {
        let r = LogParser::new().parse("[2024-01-01 00:00:00] app.INFO: hi {user: 'bob'} []");
        assert_eq!(r.message(), "hi");
        assert_eq!(r.context(), &json!("{user: 'bob'}"));
        assert_eq!(r.extra(), &json!({}));
    }

    #[test]
    fn relaxed_mode_recovers_literals() {
        let parser = LogParser::new().with_relaxed(true);
        let r = parser.parse("[2024-01-01 00:00:00] app.INFO: hi {user: 'bob'} []");
        assert_eq!(r.context(), &json!({"user": "bob"}));

        let r = parser.parse("2024-01-01 00:00:00 DEBUG [app] cache warm ['hits' => 3, 'misses' => 0]");
        assert_eq!(r.context(), &json!({"hits": 3, "misses": 0}));
    }

    #[test]
    fn relaxed_mode_survives_largest_integer_key() {
        let parser = LogParser::new().with_relaxed(true);
        let r = parser.parse("[2024-01-01 00:00:00] app.INFO: hi {9223372036854775807: 'a'} []");
        assert_eq!(r.message(), "hi");
        assert_eq!(r.context(), &json!({"9223372036854775807": "a"}));
    }

    #[test]
    fn relaxed_mode_keeps_garbage_raw() {
        let parser = LogParser::new().with_relaxed(true);
        let r = parser.parse("[2024-01-01 00:00:00] app.INFO: hi {exec($x)} []");
        assert_eq!(r.context(), &json!("{exec($x)}"));
    }

    #[test]
    fn unparseable_timestamp_is_dropped() {
        let r = LogParser::new().parse("[not a date] app.INFO: hi {} []");
        assert_eq!(r.level(), "INFO");
        assert_eq!(r.timestamp(), None);
    }
}
