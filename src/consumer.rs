use crate::broker::SharedBroker;
use crate::config::ConsumerConfig;
use crate::coordinator::{validate_group, validate_stream, GroupCoordinator};
use crate::error::{BrokerError, ClientError, Result};
use crate::message::ClientMessage;
use crate::types::{RecordId, StreamBatch};
use async_trait::async_trait;
use dashmap::DashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handler invoked once per delivered message, in delivery order.
///
/// Acknowledging is the handler's job; nothing is acked automatically.
/// An error from the handler stops the current pass and is returned to the
/// caller unchanged. Messages after the failing one stay pending.
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle(&mut self, message: ClientMessage) -> Result<()>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: FnMut(ClientMessage) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&mut self, message: ClientMessage) -> Result<()> {
        (self)(message).await
    }
}

pub(crate) fn validate_consumer(consumer: &str) -> Result<()> {
    if consumer.is_empty() {
        return Err(ClientError::InvalidArgument(
            "consumer name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Reads records never delivered to a group.
///
/// With `auto_create_group` set the group (and stream) is created on first
/// use. Pairs already ensured are cached so that costs one broker call per
/// pair. A consumer name must only be used by one reader at a time; sharing
/// it makes ownership in the pending entries list ambiguous.
#[derive(Clone)]
pub struct Poller {
    broker: SharedBroker,
    coordinator: GroupCoordinator,
    config: ConsumerConfig,
    ensured: Arc<DashSet<(String, String)>>,
}

impl Poller {
    pub fn new(broker: SharedBroker, config: ConsumerConfig) -> Self {
        Self {
            coordinator: GroupCoordinator::new(broker.clone()),
            broker,
            config,
            ensured: Arc::new(DashSet::new()),
        }
    }

    /// Fetch up to `count` new records for `consumer`, waiting up to `block`
    /// for the first one (`Duration::ZERO` waits indefinitely).
    ///
    /// Timing out with nothing to read is an empty result, not an error.
    /// Every returned record is pending under `consumer` until acked.
    pub async fn fetch_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<ClientMessage>> {
        validate_group(group)?;
        validate_stream(stream)?;
        validate_consumer(consumer)?;
        if count == 0 {
            return Err(ClientError::InvalidArgument(
                "fetch count must be at least 1".to_string(),
            ));
        }

        if self.config.auto_create_group {
            self.ensure_group(stream, group).await?;
        }

        let batches = match self
            .broker
            .read_group(group, consumer, stream, count, block)
            .await
        {
            Ok(batches) => batches,
            Err(BrokerError::NoGroup) if self.config.auto_create_group => {
                // Group vanished since we cached it (deleted or broker restarted).
                debug!(stream = %stream, group = %group, "Group missing, recreating");
                self.ensured
                    .remove(&(stream.to_string(), group.to_string()));
                self.ensure_group(stream, group).await?;
                self.broker
                    .read_group(group, consumer, stream, count, block)
                    .await
                    .map_err(|e| ClientError::transport("XREADGROUP", stream, Some(group), e))?
            }
            Err(e) => {
                return Err(ClientError::transport(
                    "XREADGROUP",
                    stream,
                    Some(group),
                    e,
                ))
            }
        };

        let messages = into_messages(batches, stream, group, consumer)?;
        if !messages.is_empty() {
            debug!(
                stream = %stream,
                group = %group,
                consumer = %consumer,
                count = messages.len(),
                "Fetched new messages"
            );
        }
        Ok(messages)
    }

    /// Fetch like [`fetch_new`](Self::fetch_new) and pass each message to
    /// `handler` in delivery order. Returns how many messages were handled.
    pub async fn fetch_new_with<H>(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
        handler: &mut H,
    ) -> Result<usize>
    where
        H: MessageHandler + ?Sized,
    {
        let messages = self.fetch_new(stream, group, consumer, count, block).await?;
        let total = messages.len();
        for message in messages {
            handler.handle(message).await?;
        }
        Ok(total)
    }

    /// Whether missing groups are created on first read
    pub fn self_heals(&self) -> bool {
        self.config.auto_create_group
    }

    /// Ensure the group exists, at most one broker call per (stream, group)
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let key = (stream.to_string(), group.to_string());
        if self.ensured.contains(&key) {
            return Ok(());
        }
        self.coordinator.ensure_group_exists(stream, group).await?;
        self.ensured.insert(key);
        Ok(())
    }
}

/// Turn a group read reply into messages, rejecting replies for any stream
/// other than the one requested
fn into_messages(
    batches: Vec<StreamBatch>,
    stream: &str,
    group: &str,
    consumer: &str,
) -> Result<Vec<ClientMessage>> {
    if batches.len() > 1 {
        return Err(ClientError::Protocol(format!(
            "read of stream {} returned results for {} streams",
            stream,
            batches.len()
        )));
    }
    let Some(batch) = batches.into_iter().next() else {
        return Ok(Vec::new());
    };
    if batch.stream != stream {
        return Err(ClientError::Protocol(format!(
            "read of stream {} returned results for stream {}",
            stream, batch.stream
        )));
    }

    Ok(batch
        .records
        .into_iter()
        .map(|record| ClientMessage::from_record(record, stream, group, consumer))
        .collect())
}

/// Marks pending records as processed.
///
/// Acking an id that is not pending (already acked, never delivered or
/// unknown) succeeds without effect.
#[derive(Clone)]
pub struct Acknowledger {
    broker: SharedBroker,
}

impl Acknowledger {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    pub async fn ack(&self, stream: &str, group: &str, id: RecordId) -> Result<()> {
        let acked = self.ack_many(stream, group, &[id]).await?;
        if acked == 0 {
            debug!(stream = %stream, group = %group, id = %id, "Ack of record that was not pending");
        } else {
            debug!(stream = %stream, group = %group, id = %id, "Acked record");
        }
        Ok(())
    }

    /// Ack a delivered message using its own stream and group
    pub async fn ack_message(&self, message: &ClientMessage) -> Result<()> {
        self.ack(&message.stream, &message.group, message.id).await
    }

    /// Ack several ids in one broker call; returns how many were pending
    pub async fn ack_many(&self, stream: &str, group: &str, ids: &[RecordId]) -> Result<u64> {
        validate_group(group)?;
        validate_stream(stream)?;
        if ids.is_empty() {
            return Ok(0);
        }

        self.broker
            .ack(stream, group, ids)
            .await
            .map_err(|e| ClientError::transport("XACK", stream, Some(group), e))
    }
}
