//! LogRecord: the canonical shape of one re-ingested worker log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured log line.
///
/// `context` and `extra` are JSON objects (insertion ordered). When the text
/// a line carried for them could not be decoded at all, the field holds the
/// raw text as a JSON string instead, so nothing the worker wrote is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    level: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default = "empty_object")]
    context: Value,
    #[serde(default = "empty_object")]
    extra: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            level: String::new(),
            message: String::new(),
            timestamp: None,
            channel: None,
            context: empty_object(),
            extra: empty_object(),
        }
    }
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_channel(mut self, channel: Option<String>) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = normalize_fields(context);
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = normalize_fields(extra);
        self
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn extra(&self) -> &Value {
        &self.extra
    }

    pub fn context_map(&self) -> Option<&Map<String, Value>> {
        self.context.as_object()
    }

    pub fn extra_map(&self) -> Option<&Map<String, Value>> {
        self.extra.as_object()
    }

    /// Context with `extra` nested under the `extra` key, as re-emitted by the
    /// consumer's own logger.
    pub fn merged_context(&self) -> Map<String, Value> {
        let mut merged = match &self.context {
            Value::Object(map) => map.clone(),
            raw => {
                let mut map = Map::new();
                map.insert("context".to_string(), raw.clone());
                map
            }
        };
        merged.insert("extra".to_string(), self.extra.clone());
        merged
    }
}

/// Coerces a decoded context/extra value into the record's invariant:
/// objects stay, lists become index-keyed objects, null becomes empty, raw
/// strings are kept, other scalars are kept as their JSON text.
pub fn normalize_fields(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::String(_) => value,
        Value::Null => empty_object(),
        Value::Array(items) => Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        ),
        scalar => Value::String(scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_record_has_empty_maps() {
        let r = LogRecord::default();
        assert_eq!(r.level(), "");
        assert_eq!(r.context(), &json!({}));
        assert_eq!(r.extra(), &json!({}));
    }

    #[test]
    fn lists_become_index_keyed_maps() {
        let r = LogRecord::new("INFO", "m").with_context(json!(["a", "b"]));
        assert_eq!(r.context(), &json!({"0": "a", "1": "b"}));
        let r = r.with_extra(Value::Null);
        assert_eq!(r.extra(), &json!({}));
    }

    #[test]
    fn merged_context_nests_extra() {
        let r = LogRecord::new("INFO", "m")
            .with_context(json!({"user": 3}))
            .with_extra(json!({"pid": 12}));
        let merged = r.merged_context();
        assert_eq!(Value::Object(merged), json!({"user": 3, "extra": {"pid": 12}}));
    }

    #[test]
    fn merged_context_keeps_raw_context() {
        let r = LogRecord::new("INFO", "m").with_context(json!("{broken"));
        let merged = r.merged_context();
        assert_eq!(merged["context"], json!("{broken"));
        assert_eq!(merged["extra"], json!({}));
    }

    #[test]
    fn preserves_key_order() {
        let r = LogRecord::new("INFO", "m").with_context(json!({"z": 1, "a": 2}));
        let keys: Vec<_> = r.context_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }
}
