use crate::broker::SharedBroker;
use crate::consumer::validate_consumer;
use crate::coordinator::{validate_group, validate_stream};
use crate::error::{ClientError, Result};
use crate::message::ClientMessage;
use crate::types::RecordId;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one reclaim pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReclaimReport {
    /// Messages now pending under the reclaiming consumer
    pub claimed: Vec<ClientMessage>,
    /// Entries whose claim failed at the broker and were skipped
    pub failures: Vec<(RecordId, ClientError)>,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty() && self.failures.is_empty()
    }
}

/// Takes over pending entries abandoned by slow or crashed consumers
#[derive(Clone)]
pub struct Reclaimer {
    broker: SharedBroker,
}

impl Reclaimer {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    /// Claim up to `count` pending entries idle for at least `min_idle`.
    ///
    /// See [`reclaim_with_report`](Self::reclaim_with_report); this drops the
    /// list of skipped entries.
    pub async fn reclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        min_idle: Duration,
    ) -> Result<Vec<ClientMessage>> {
        let report = self
            .reclaim_with_report(stream, group, consumer, count, min_idle)
            .await?;
        Ok(report.claimed)
    }

    /// List the first `count` entries of the group's pending entries list,
    /// whoever owns them, then claim them for `consumer` one at a time.
    ///
    /// Entries not yet idle for `min_idle` are left where they are. A broker
    /// error on one entry is logged and skipped. An undecodable claim reply,
    /// or a claim that returns more than the single record asked for, aborts
    /// the whole pass with [`ClientError::Protocol`].
    pub async fn reclaim_with_report(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        min_idle: Duration,
    ) -> Result<ReclaimReport> {
        validate_group(group)?;
        validate_stream(stream)?;
        validate_consumer(consumer)?;
        if count == 0 {
            return Err(ClientError::InvalidArgument(
                "reclaim count must be at least 1".to_string(),
            ));
        }

        let pending = self
            .broker
            .list_pending(stream, group, RecordId::MIN, RecordId::MAX, count)
            .await
            .map_err(|e| ClientError::transport("XPENDING", stream, Some(group), e))?;

        let mut report = ReclaimReport::default();
        for entry in pending {
            let mut records = match self
                .broker
                .claim(stream, group, consumer, min_idle, &[entry.id])
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    let err = ClientError::transport("XCLAIM", stream, Some(group), e);
                    if matches!(err, ClientError::Protocol(_)) {
                        return Err(err);
                    }
                    warn!(
                        stream = %stream,
                        group = %group,
                        id = %entry.id,
                        "Skipping pending entry after claim failure: {}",
                        err
                    );
                    report.failures.push((entry.id, err));
                    continue;
                }
            };

            if records.len() > 1 {
                return Err(ClientError::Protocol(format!(
                    "claim of {} on stream {} returned {} records",
                    entry.id,
                    stream,
                    records.len()
                )));
            }
            if let Some(record) = records.pop() {
                debug!(
                    stream = %stream,
                    group = %group,
                    id = %record.id,
                    from = %entry.consumer,
                    to = %consumer,
                    "Claimed pending entry"
                );
                report
                    .claimed
                    .push(ClientMessage::from_record(record, stream, group, consumer));
            }
        }

        Ok(report)
    }
}
