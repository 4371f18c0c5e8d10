//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rustmq_streams::broker::BrokerResult;
use rustmq_streams::{
    BrokerError, BrokerHandle, ClientConfig, Fields, FieldsBuilder, GroupInfo, GroupStart,
    MemoryBroker, PendingEntry, Record, RecordId, StreamBatch, StreamsClient,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn fields(i: usize) -> Fields {
    FieldsBuilder::new()
        .field("index", i)
        .field("body", format!("message-{}", i))
        .build()
}

/// Client over `broker` with a fixed consumer name
pub fn client(broker: Arc<dyn BrokerHandle>, consumer: &str) -> StreamsClient {
    let config = ClientConfig {
        consumer_name: Some(consumer.to_string()),
        ..Default::default()
    };
    StreamsClient::with_broker(broker, config).unwrap()
}

/// [`MemoryBroker`] wrapper that injects broker misbehaviour
#[derive(Default)]
pub struct FaultyBroker {
    pub inner: MemoryBroker,
    failing_claims: Mutex<HashSet<RecordId>>,
    duplicate_claims: AtomicBool,
    garbled_claims: AtomicBool,
    foreign_stream_reads: AtomicBool,
}

impl FaultyBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make claims of `id` fail with a connection error
    pub fn fail_claim(&self, id: RecordId) {
        self.failing_claims.lock().insert(id);
    }

    /// Make every successful claim return its record twice
    pub fn duplicate_claims(&self) {
        self.duplicate_claims.store(true, Ordering::SeqCst);
    }

    /// Make every claim fail with an undecodable reply
    pub fn garbled_claims(&self) {
        self.garbled_claims.store(true, Ordering::SeqCst);
    }

    /// Make every non-empty read also return a batch for another stream
    pub fn foreign_stream_reads(&self) {
        self.foreign_stream_reads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerHandle for FaultyBroker {
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
        mkstream: bool,
    ) -> BrokerResult<()> {
        self.inner.create_group(stream, group, start, mkstream).await
    }

    async fn append(&self, stream: &str, fields: &Fields) -> BrokerResult<RecordId> {
        self.inner.append(stream, fields).await
    }

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<StreamBatch>> {
        let mut batches = self
            .inner
            .read_group(group, consumer, stream, count, block)
            .await?;
        if !batches.is_empty() && self.foreign_stream_reads.load(Ordering::SeqCst) {
            batches.push(StreamBatch {
                stream: format!("{}-shadow", stream),
                records: batches[0].records.clone(),
            });
        }
        Ok(batches)
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        start: RecordId,
        end: RecordId,
        count: usize,
    ) -> BrokerResult<Vec<PendingEntry>> {
        self.inner.list_pending(stream, group, start, end, count).await
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> BrokerResult<Vec<Record>> {
        if self.garbled_claims.load(Ordering::SeqCst) {
            return Err(BrokerError::UnexpectedReply("garbled XCLAIM reply".to_string()));
        }
        let failing = ids.iter().any(|id| self.failing_claims.lock().contains(id));
        if failing {
            return Err(BrokerError::Connection("injected claim failure".to_string()));
        }
        let mut records = self
            .inner
            .claim(stream, group, consumer, min_idle, ids)
            .await?;
        if self.duplicate_claims.load(Ordering::SeqCst) {
            let copies = records.clone();
            records.extend(copies);
        }
        Ok(records)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> BrokerResult<u64> {
        self.inner.ack(stream, group, ids).await
    }

    async fn group_info(&self, stream: &str) -> BrokerResult<Vec<GroupInfo>> {
        self.inner.group_info(stream).await
    }

    async fn ping(&self) -> BrokerResult<()> {
        self.inner.ping().await
    }

    async fn close(&self) -> BrokerResult<()> {
        self.inner.close().await
    }
}
