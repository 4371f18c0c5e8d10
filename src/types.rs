use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Field mapping carried by a record: field name to opaque value
pub type Fields = BTreeMap<String, Bytes>;

/// Broker-assigned record identifier (`<milliseconds>-<sequence>`)
///
/// Ordering follows the broker's ordering: by milliseconds, then sequence.
/// The default is [`RecordId::MIN`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub ms: u64,
    pub seq: u64,
}

impl RecordId {
    /// Smallest possible identifier; groups created from here see the whole stream
    pub const MIN: RecordId = RecordId { ms: 0, seq: 0 };

    /// Largest possible identifier
    pub const MAX: RecordId = RecordId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// Error parsing a record identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRecordIdError(pub String);

impl fmt::Display for ParseRecordIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid record id '{}'", self.0)
    }
}

impl std::error::Error for ParseRecordIdError {}

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseRecordIdError(s.to_string());
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, Some(seq)),
            None => (s, None),
        };
        let ms = ms.parse::<u64>().map_err(|_| invalid())?;
        let seq = match seq {
            Some(seq) => seq.parse::<u64>().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(RecordId { ms, seq })
    }
}

impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An immutable stream entry as returned by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub fields: Fields,
}

/// Entries read from one stream in a group read reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBatch {
    pub stream: String,
    pub records: Vec<Record>,
}

/// One entry of a group's pending entries list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: RecordId,
    /// Consumer that currently owns the entry
    pub consumer: String,
    /// Time since the entry was last delivered
    pub idle: Duration,
    pub delivery_count: u64,
}

/// Group metadata reported for a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub consumers: u64,
    pub pending: u64,
    pub last_delivered_id: RecordId,
}

/// Where a newly created group starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// Deliver every record already in the stream
    Beginning,
    /// Deliver only records appended after creation
    End,
    /// Deliver records after the given id
    After(RecordId),
}

impl GroupStart {
    /// Broker argument for this start position
    pub fn as_arg(&self) -> String {
        match self {
            GroupStart::Beginning => "0".to_string(),
            GroupStart::End => "$".to_string(),
            GroupStart::After(id) => id.to_string(),
        }
    }
}
