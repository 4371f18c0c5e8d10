use crate::types::{Fields, Record, RecordId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A record as delivered to a consumer of a group
///
/// Built from the broker record plus the delivery context; never persisted
/// by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Record identifier
    pub id: RecordId,

    /// Consumer the record is now pending under
    pub consumer: String,

    /// Consumer group the record was delivered through
    pub group: String,

    /// Stream the record belongs to
    pub stream: String,

    /// Record fields
    pub fields: Fields,
}

impl ClientMessage {
    /// Attach delivery context to a broker record
    pub fn from_record(record: Record, stream: &str, group: &str, consumer: &str) -> Self {
        Self {
            id: record.id,
            consumer: consumer.to_string(),
            group: group.to_string(),
            stream: stream.to_string(),
            fields: record.fields,
        }
    }

    /// Get a field value as raw bytes
    pub fn field(&self, key: &str) -> Option<&Bytes> {
        self.fields.get(key)
    }

    /// Get a field value as UTF-8 text
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Parse a field value, e.g. `message.field_parse::<u64>("index")`
    pub fn field_parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.field_str(key).and_then(|value| value.parse().ok())
    }

    /// Check if message has a specific field
    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Get message as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Builder for record field mappings
#[derive(Debug, Default, Clone)]
pub struct FieldsBuilder {
    fields: Fields,
}

impl FieldsBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field rendered through `Display`
    pub fn field<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.fields
            .insert(key.into(), Bytes::from(value.to_string()));
        self
    }

    /// Add a field with a raw byte value
    pub fn field_bytes<K: Into<String>, V: Into<Bytes>>(mut self, key: K, value: V) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add multiple fields
    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (key, value) in fields {
            self.fields
                .insert(key.into(), Bytes::from(value.to_string()));
        }
        self
    }

    pub fn build(self) -> Fields {
        self.fields
    }
}
