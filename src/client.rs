use crate::broker::{RedisBroker, SharedBroker};
use crate::config::ClientConfig;
use crate::consumer::{Acknowledger, MessageHandler, Poller};
use crate::coordinator::GroupCoordinator;
use crate::error::{ClientError, Result};
use crate::identity::ConsumerNameGenerator;
use crate::message::ClientMessage;
use crate::producer::Producer;
use crate::reclaim::{ReclaimReport, Reclaimer};
use crate::types::{Fields, GroupInfo, RecordId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Stream client bundling every component over one shared broker handle.
///
/// Cloning is cheap and clones share the handle. Reads and claims are made
/// under this client's consumer name.
#[derive(Clone)]
pub struct StreamsClient {
    config: Arc<ClientConfig>,
    broker: SharedBroker,
    consumer_name: Arc<str>,
    coordinator: GroupCoordinator,
    producer: Producer,
    poller: Poller,
    reclaimer: Reclaimer,
    acknowledger: Acknowledger,
    closed: Arc<AtomicBool>,
}

impl StreamsClient {
    /// Connect to the Redis broker described by `config`
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let broker = RedisBroker::connect(&config)
            .await
            .map_err(|e| ClientError::transport("CONNECT", "", None, e))?;
        Self::with_broker(Arc::new(broker), config)
    }

    /// Build a client over an existing handle, generating a consumer name
    /// from OS entropy when the config has none
    pub fn with_broker(broker: SharedBroker, config: ClientConfig) -> Result<Self> {
        let mut generator = ConsumerNameGenerator::from_entropy(config.append_timestamp_to_name);
        Self::with_generator(broker, config, &mut generator)
    }

    /// Build a client over an existing handle with an injected name generator
    pub fn with_generator(
        broker: SharedBroker,
        config: ClientConfig,
        generator: &mut ConsumerNameGenerator,
    ) -> Result<Self> {
        config.validate()?;
        let consumer_name = match &config.consumer_name {
            Some(name) => name.clone(),
            None => generator.generate(&config.consumer_prefix),
        };

        info!(
            address = %config.address,
            consumer = %consumer_name,
            "Created streams client"
        );
        Ok(Self {
            coordinator: GroupCoordinator::new(broker.clone()),
            producer: Producer::new(broker.clone()),
            poller: Poller::new(broker.clone(), config.consumer.clone()),
            reclaimer: Reclaimer::new(broker.clone()),
            acknowledger: Acknowledger::new(broker.clone()),
            broker,
            consumer_name: consumer_name.into(),
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Append a record to `stream`
    pub async fn produce_message(&self, stream: &str, fields: &Fields) -> Result<RecordId> {
        self.producer.append(stream, fields).await
    }

    pub async fn create_group_if_not_exists(&self, stream: &str, group: &str) -> Result<()> {
        self.coordinator.ensure_group_exists(stream, group).await
    }

    pub async fn group_exists(&self, stream: &str, group: &str) -> Result<bool> {
        self.coordinator.group_exists(stream, group).await
    }

    pub async fn group_info(&self, stream: &str) -> Result<Vec<GroupInfo>> {
        self.coordinator.group_info(stream).await
    }

    /// Fetch up to `count` new messages as this client's consumer
    pub async fn fetch_new_messages(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<ClientMessage>> {
        self.poller
            .fetch_new(stream, group, &self.consumer_name, count, block)
            .await
    }

    /// Fetch new messages and pass each to `handler` in delivery order
    pub async fn fetch_new_messages_with<H>(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        block: Duration,
        handler: &mut H,
    ) -> Result<usize>
    where
        H: MessageHandler + ?Sized,
    {
        self.poller
            .fetch_new_with(stream, group, &self.consumer_name, count, block, handler)
            .await
    }

    /// Take over up to `count` pending messages idle for at least `min_idle`
    pub async fn claim_messages_not_acked(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        min_idle: Duration,
    ) -> Result<Vec<ClientMessage>> {
        self.reclaimer
            .reclaim(stream, group, &self.consumer_name, count, min_idle)
            .await
    }

    /// Like [`claim_messages_not_acked`](Self::claim_messages_not_acked),
    /// also reporting entries whose claim failed
    pub async fn claim_messages_with_report(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        min_idle: Duration,
    ) -> Result<ReclaimReport> {
        self.reclaimer
            .reclaim_with_report(stream, group, &self.consumer_name, count, min_idle)
            .await
    }

    pub async fn ack_message(&self, stream: &str, group: &str, id: RecordId) -> Result<()> {
        self.acknowledger.ack(stream, group, id).await
    }

    /// Check the broker answers
    pub async fn health_check(&self) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        Ok(self.broker.ping().await.is_ok())
    }

    /// Release the broker handle. Closing again is a no-op; calls made after
    /// closing fail with [`ClientError::Closed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.broker
            .close()
            .await
            .map_err(|e| ClientError::transport("CLOSE", "", None, e))?;
        info!(consumer = %self.consumer_name, "Streams client closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &GroupCoordinator {
        &self.coordinator
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn reclaimer(&self) -> &Reclaimer {
        &self.reclaimer
    }

    pub fn acknowledger(&self) -> &Acknowledger {
        &self.acknowledger
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }
}
