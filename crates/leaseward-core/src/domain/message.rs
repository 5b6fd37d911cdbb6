//! Message - what a subscription delivers and what a topic accepts.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle the queue uses to identify one delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(String);

impl AckId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A delivered message.
///
/// The consumer never mutates it: it only forwards it to the gateway (ack,
/// lease changes) and to the worker process (payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    message_id: String,
    ack_id: AckId,
    #[serde(with = "payload")]
    data: Vec<u8>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ordering_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    delivery_attempt: u32,
}

impl Message {
    pub fn new(message_id: impl Into<String>, ack_id: AckId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: message_id.into(),
            ack_id,
            data: data.into(),
            attributes: BTreeMap::new(),
            ordering_key: None,
            publish_time: None,
            delivery_attempt: 1,
        }
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_ordering_key(mut self, key: Option<String>) -> Self {
        self.ordering_key = key;
        self
    }

    pub fn with_publish_time(mut self, at: DateTime<Utc>) -> Self {
        self.publish_time = Some(at);
        self
    }

    pub fn with_delivery_attempt(mut self, attempt: u32) -> Self {
        self.delivery_attempt = attempt;
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn ack_id(&self) -> &AckId {
        &self.ack_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload as text (lossy for non UTF-8 bytes).
    pub fn data_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn ordering_key(&self) -> Option<&str> {
        self.ordering_key.as_deref()
    }

    pub fn publish_time(&self) -> Option<DateTime<Utc>> {
        self.publish_time
    }

    /// 1 on first delivery, incremented by the queue on each redelivery.
    pub fn delivery_attempt(&self) -> u32 {
        self.delivery_attempt
    }
}

/// A message about to be published (no ids yet, the queue assigns them).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(with = "payload")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<String>,
}

impl OutboundMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = Some(key.into());
        self
    }
}

/// Payloads are carried as UTF-8 text in JSON form, which is what the seed
/// files and the `parse-log`/demo tooling exchange.
mod payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        Ok(text.into_bytes())
    }
}
