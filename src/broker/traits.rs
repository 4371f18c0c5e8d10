use crate::error::BrokerError;
use crate::types::{Fields, GroupInfo, GroupStart, PendingEntry, Record, RecordId, StreamBatch};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Broker handle shared by every component and concurrent caller
pub type SharedBroker = Arc<dyn BrokerHandle>;

/// Primitive stream operations offered by the broker.
///
/// Implementations must be safe for concurrent use; the coordination layer
/// adds no locking of its own.
#[async_trait]
pub trait BrokerHandle: Send + Sync {
    /// Create `group` on `stream`, creating the stream too when `mkstream` is set.
    /// Fails with [`BrokerError::GroupExists`] if the group is already there.
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
        mkstream: bool,
    ) -> BrokerResult<()>;

    /// Append a record and return its broker-assigned id
    async fn append(&self, stream: &str, fields: &Fields) -> BrokerResult<RecordId>;

    /// Read up to `count` never-delivered records for `group`, assigning them to
    /// `consumer` in the pending entries list. Waits up to `block` for at least
    /// one record; a zero `block` waits indefinitely. A timeout yields an empty reply.
    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<StreamBatch>>;

    /// List up to `count` pending entries with ids in `start..=end`
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        start: RecordId,
        end: RecordId,
        count: usize,
    ) -> BrokerResult<Vec<PendingEntry>>;

    /// Transfer each id to `consumer` if it has been idle at least `min_idle`.
    /// Returns the records actually transferred.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> BrokerResult<Vec<Record>>;

    /// Remove ids from the pending entries list, returning how many were pending
    async fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> BrokerResult<u64>;

    /// Describe the groups of `stream`. Fails with [`BrokerError::NoSuchStream`]
    /// when the stream does not exist.
    async fn group_info(&self, stream: &str) -> BrokerResult<Vec<GroupInfo>>;

    /// Round-trip health check
    async fn ping(&self) -> BrokerResult<()>;

    /// Release the connection. Closing an already closed handle succeeds.
    async fn close(&self) -> BrokerResult<()>;
}
