use crate::client::StreamsClient;
use crate::config::PipelineConfig;
use crate::consumer::{MessageHandler, Poller};
use crate::error::{ClientError, Result};
use crate::message::ClientMessage;
use crate::reclaim::Reclaimer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pipeline counters, readable while the pipeline runs
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// New messages fetched
    pub delivered: AtomicU64,
    /// Messages taken over from other consumers
    pub reclaimed: AtomicU64,
    /// Messages the handler accepted
    pub handled: AtomicU64,
    pub handler_failures: AtomicU64,
}

/// Feeds fetched and reclaimed messages through a handler for one
/// (stream, group, consumer).
///
/// The handler is responsible for acking. Reclaimed messages go through the
/// same handler as new ones.
pub struct ConsumptionPipeline<H> {
    poller: Poller,
    reclaimer: Reclaimer,
    stream: String,
    group: String,
    consumer: String,
    config: PipelineConfig,
    handler: H,
    metrics: Arc<PipelineMetrics>,
}

/// Builder for creating pipelines
pub struct PipelineBuilder<H> {
    stream: Option<String>,
    group: Option<String>,
    config: Option<PipelineConfig>,
    client: Option<StreamsClient>,
    handler: Option<H>,
}

impl<H: MessageHandler> Default for PipelineBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: MessageHandler> PipelineBuilder<H> {
    pub fn new() -> Self {
        Self {
            stream: None,
            group: None,
            config: None,
            client: None,
            handler: None,
        }
    }

    pub fn stream<T: Into<String>>(mut self, stream: T) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn group<T: Into<String>>(mut self, group: T) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Override the client's pipeline configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Client whose broker handle and consumer name the pipeline uses
    pub fn client(mut self, client: StreamsClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<ConsumptionPipeline<H>> {
        let stream = self
            .stream
            .ok_or_else(|| ClientError::InvalidConfig("Pipeline stream is required".to_string()))?;
        let group = self
            .group
            .ok_or_else(|| ClientError::InvalidConfig("Pipeline group is required".to_string()))?;
        let client = self
            .client
            .ok_or_else(|| ClientError::InvalidConfig("Client is required".to_string()))?;
        let handler = self
            .handler
            .ok_or_else(|| ClientError::InvalidConfig("Message handler is required".to_string()))?;

        let config = self
            .config
            .unwrap_or_else(|| client.config().pipeline.clone());
        config.validate()?;

        Ok(ConsumptionPipeline {
            poller: client.poller().clone(),
            reclaimer: client.reclaimer().clone(),
            stream,
            group,
            consumer: client.consumer_name().to_string(),
            config,
            handler,
            metrics: Arc::new(PipelineMetrics::default()),
        })
    }
}

impl<H: MessageHandler> ConsumptionPipeline<H> {
    pub fn builder() -> PipelineBuilder<H> {
        PipelineBuilder::new()
    }

    /// Fetch one batch of new messages and hand each to the handler.
    /// Returns how many were fetched.
    pub async fn run_once(&mut self) -> Result<usize> {
        let messages = self
            .poller
            .fetch_new(
                &self.stream,
                &self.group,
                &self.consumer,
                self.config.batch_size,
                self.config.block(),
            )
            .await?;
        self.metrics
            .delivered
            .fetch_add(messages.len() as u64, Ordering::Relaxed);
        self.dispatch(messages).await
    }

    /// Reclaim one batch of idle pending entries and hand each to the handler.
    /// Returns how many were claimed.
    pub async fn reclaim_once(&mut self) -> Result<usize> {
        let messages = self
            .reclaimer
            .reclaim(
                &self.stream,
                &self.group,
                &self.consumer,
                self.config.reclaim_batch_size,
                self.config.min_idle(),
            )
            .await?;
        self.metrics
            .reclaimed
            .fetch_add(messages.len() as u64, Ordering::Relaxed);
        self.dispatch(messages).await
    }

    /// Poll and reclaim until `shutdown` is cancelled.
    ///
    /// Reclaiming runs at start-up and then every `reclaim_interval_ms`
    /// between polls. Cancellation interrupts a waiting read but never a
    /// handler call. Any error, from the broker or the handler, ends the
    /// loop and is returned.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer,
            "Starting consumption pipeline"
        );
        if self.poller.self_heals() {
            self.poller.ensure_group(&self.stream, &self.group).await?;
        }
        let reclaim_interval = self.config.reclaim_interval();
        let mut next_reclaim = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Some(period) = reclaim_interval {
                if Instant::now() >= next_reclaim {
                    let claimed = self.reclaim_once().await?;
                    if claimed > 0 {
                        debug!(stream = %self.stream, group = %self.group, claimed, "Reclaimed idle messages");
                    }
                    next_reclaim = Instant::now() + period;
                }
            }

            let fetched = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                fetched = self.poller.fetch_new(
                    &self.stream,
                    &self.group,
                    &self.consumer,
                    self.config.batch_size,
                    self.config.block(),
                ) => fetched?,
            };
            self.metrics
                .delivered
                .fetch_add(fetched.len() as u64, Ordering::Relaxed);
            self.dispatch(fetched).await?;
        }

        info!(
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer,
            "Consumption pipeline stopped"
        );
        Ok(())
    }

    async fn dispatch(&mut self, messages: Vec<ClientMessage>) -> Result<usize> {
        let total = messages.len();
        for message in messages {
            let id = message.id;
            if let Err(e) = self.handler.handle(message).await {
                self.metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(stream = %self.stream, group = %self.group, id = %id, "Handler failed: {}", e);
                return Err(e);
            }
            self.metrics.handled.fetch_add(1, Ordering::Relaxed);
        }
        Ok(total)
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}
