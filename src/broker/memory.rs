use super::traits::{BrokerHandle, BrokerResult};
use crate::error::BrokerError;
use crate::types::{Fields, GroupInfo, GroupStart, PendingEntry, Record, RecordId, StreamBatch};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// In-process [`BrokerHandle`] with stream, consumer group and pending
/// entries list semantics matching the Redis streams commands.
///
/// Idle times are measured with `tokio::time::Instant`, so tests running on
/// a paused clock control them with `tokio::time::advance` or `sleep`.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    appended: Notify,
    closed: AtomicBool,
}

#[derive(Default)]
struct BrokerState {
    streams: HashMap<String, StreamState>,
}

#[derive(Default)]
struct StreamState {
    entries: BTreeMap<RecordId, Fields>,
    last_id: RecordId,
    groups: HashMap<String, GroupState>,
}

struct GroupState {
    last_delivered: RecordId,
    pending: BTreeMap<RecordId, PendingState>,
    consumers: HashSet<String>,
}

struct PendingState {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

impl StreamState {
    fn next_id(&mut self) -> RecordId {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let id = if now_ms > self.last_id.ms {
            RecordId::new(now_ms, 0)
        } else {
            RecordId::new(self.last_id.ms, self.last_id.seq + 1)
        };
        self.last_id = id;
        id
    }
}

impl GroupState {
    fn new(last_delivered: RecordId) -> Self {
        Self {
            last_delivered,
            pending: BTreeMap::new(),
            consumers: HashSet::new(),
        }
    }
}

fn limit(count: usize) -> usize {
    if count == 0 {
        usize::MAX
    } else {
        count
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    /// Number of records in `stream` (0 if absent)
    pub fn stream_len(&self, stream: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(stream)
            .map_or(0, |s| s.entries.len())
    }

    /// Number of pending entries for `group` on `stream` (0 if absent)
    pub fn pending_len(&self, stream: &str, group: &str) -> usize {
        self.state
            .lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Delete a record from the stream, leaving any pending entry dangling
    pub fn delete(&self, stream: &str, id: RecordId) -> bool {
        self.state
            .lock()
            .streams
            .get_mut(stream)
            .map_or(false, |s| s.entries.remove(&id).is_some())
    }

    /// Try to deliver new records; `None` when nothing is available yet
    fn try_read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
    ) -> BrokerResult<Option<StreamBatch>> {
        let mut state = self.state.lock();
        let StreamState {
            entries, groups, ..
        } = state.streams.get_mut(stream).ok_or(BrokerError::NoGroup)?;
        let group_state = groups.get_mut(group).ok_or(BrokerError::NoGroup)?;
        group_state.consumers.insert(consumer.to_string());

        let records: Vec<Record> = entries
            .range((Bound::Excluded(group_state.last_delivered), Bound::Unbounded))
            .take(limit(count))
            .map(|(id, fields)| Record {
                id: *id,
                fields: fields.clone(),
            })
            .collect();

        let Some(last) = records.last() else {
            return Ok(None);
        };
        group_state.last_delivered = last.id;

        let now = Instant::now();
        for record in &records {
            group_state.pending.insert(
                record.id,
                PendingState {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
        }

        Ok(Some(StreamBatch {
            stream: stream.to_string(),
            records,
        }))
    }
}

#[async_trait]
impl BrokerHandle for MemoryBroker {
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
        mkstream: bool,
    ) -> BrokerResult<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if !state.streams.contains_key(stream) {
            if !mkstream {
                return Err(BrokerError::Command(
                    "the XGROUP subcommand requires the key to exist".to_string(),
                ));
            }
            state.streams.insert(stream.to_string(), StreamState::default());
        }

        let stream_state = state
            .streams
            .get_mut(stream)
            .ok_or(BrokerError::NoSuchStream)?;
        if stream_state.groups.contains_key(group) {
            return Err(BrokerError::GroupExists);
        }

        let last_delivered = match start {
            GroupStart::Beginning => RecordId::MIN,
            GroupStart::End => stream_state.last_id,
            GroupStart::After(id) => id,
        };
        stream_state
            .groups
            .insert(group.to_string(), GroupState::new(last_delivered));
        Ok(())
    }

    async fn append(&self, stream: &str, fields: &Fields) -> BrokerResult<RecordId> {
        self.ensure_open()?;
        if fields.is_empty() {
            return Err(BrokerError::Command(
                "wrong number of arguments for 'xadd' command".to_string(),
            ));
        }

        let id = {
            let mut state = self.state.lock();
            let stream_state = state.streams.entry(stream.to_string()).or_default();
            let id = stream_state.next_id();
            stream_state.entries.insert(id, fields.clone());
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<StreamBatch>> {
        // Zero, or a window past the clock's range, waits without a deadline.
        let deadline = if block.is_zero() {
            None
        } else {
            Instant::now().checked_add(block)
        };

        loop {
            // Register interest before looking so an append in between still wakes us.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open()?;
            if let Some(batch) = self.try_read_group(group, consumer, stream, count)? {
                debug!(
                    stream = %stream,
                    group = %group,
                    consumer = %consumer,
                    delivered = batch.records.len(),
                    "Delivered new records"
                );
                return Ok(vec![batch]);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(Vec::new());
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        start: RecordId,
        end: RecordId,
        count: usize,
    ) -> BrokerResult<Vec<PendingEntry>> {
        self.ensure_open()?;
        if start > end {
            return Ok(Vec::new());
        }

        let state = self.state.lock();
        let group_state = state
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .ok_or(BrokerError::NoGroup)?;

        let now = Instant::now();
        Ok(group_state
            .pending
            .range(start..=end)
            .take(limit(count))
            .map(|(id, pending)| PendingEntry {
                id: *id,
                consumer: pending.consumer.clone(),
                idle: now.saturating_duration_since(pending.delivered_at),
                delivery_count: pending.delivery_count,
            })
            .collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> BrokerResult<Vec<Record>> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let StreamState {
            entries, groups, ..
        } = state.streams.get_mut(stream).ok_or(BrokerError::NoGroup)?;
        let group_state = groups.get_mut(group).ok_or(BrokerError::NoGroup)?;
        group_state.consumers.insert(consumer.to_string());

        let now = Instant::now();
        let mut claimed = Vec::new();
        for id in ids {
            let Some(pending) = group_state.pending.get_mut(id) else {
                continue;
            };
            if now.saturating_duration_since(pending.delivered_at) < min_idle {
                continue;
            }
            match entries.get(id) {
                Some(fields) => {
                    pending.consumer = consumer.to_string();
                    pending.delivered_at = now;
                    pending.delivery_count += 1;
                    claimed.push(Record {
                        id: *id,
                        fields: fields.clone(),
                    });
                }
                None => {
                    // Record deleted from the stream; its pending entry goes with it.
                    group_state.pending.remove(id);
                }
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> BrokerResult<u64> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let Some(group_state) = state
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        else {
            return Ok(0);
        };

        let acked = ids
            .iter()
            .filter(|id| group_state.pending.remove(*id).is_some())
            .count();
        Ok(acked as u64)
    }

    async fn group_info(&self, stream: &str) -> BrokerResult<Vec<GroupInfo>> {
        self.ensure_open()?;
        let state = self.state.lock();
        let stream_state = state.streams.get(stream).ok_or(BrokerError::NoSuchStream)?;

        let mut groups: Vec<GroupInfo> = stream_state
            .groups
            .iter()
            .map(|(name, group)| GroupInfo {
                name: name.clone(),
                consumers: group.consumers.len() as u64,
                pending: group.pending.len() as u64,
                last_delivered_id: group.last_delivered,
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn ping(&self) -> BrokerResult<()> {
        self.ensure_open()
    }

    async fn close(&self) -> BrokerResult<()> {
        self.closed.store(true, Ordering::Release);
        self.appended.notify_waiters();
        Ok(())
    }
}
