use crate::broker::SharedBroker;
use crate::coordinator::validate_stream;
use crate::error::{ClientError, Result};
use crate::types::{Fields, RecordId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Appends records to streams, one broker call per record
#[derive(Clone)]
pub struct Producer {
    broker: SharedBroker,
    metrics: Arc<ProducerMetrics>,
}

/// Producer counters
#[derive(Debug, Default)]
pub struct ProducerMetrics {
    pub records_sent: AtomicU64,
    pub records_failed: AtomicU64,
}

impl Producer {
    pub fn new(broker: SharedBroker) -> Self {
        Self {
            broker,
            metrics: Arc::new(ProducerMetrics::default()),
        }
    }

    /// Append a record to `stream` and return its broker-assigned id.
    ///
    /// `fields` must not be empty. Nothing is buffered; the record is on the
    /// broker when this returns `Ok`.
    pub async fn append(&self, stream: &str, fields: &Fields) -> Result<RecordId> {
        validate_stream(stream)?;
        if fields.is_empty() {
            return Err(ClientError::InvalidArgument(
                "record fields cannot be empty".to_string(),
            ));
        }

        match self.broker.append(stream, fields).await {
            Ok(id) => {
                self.metrics.records_sent.fetch_add(1, Ordering::Relaxed);
                debug!(stream = %stream, id = %id, "Produced record");
                Ok(id)
            }
            Err(e) => {
                self.metrics.records_failed.fetch_add(1, Ordering::Relaxed);
                Err(ClientError::transport("XADD", stream, None, e))
            }
        }
    }

    pub fn metrics(&self) -> &ProducerMetrics {
        &self.metrics
    }
}
