use super::traits::{BrokerHandle, BrokerResult};
use crate::config::ClientConfig;
use crate::error::BrokerError;
use crate::types::{Fields, GroupInfo, GroupStart, PendingEntry, Record, RecordId, StreamBatch};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{
    StreamClaimReply, StreamId, StreamInfoGroupsReply, StreamPendingCountReply, StreamReadOptions,
    StreamReadReply,
};
use redis::{AsyncCommands, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Idle blocking connections kept for reuse
const MAX_IDLE_BLOCKING_CONNECTIONS: usize = 8;

/// [`BrokerHandle`] backed by a Redis server.
///
/// Non-blocking commands share one auto-reconnecting connection manager.
/// Blocking group reads run on dedicated connections so a waiting consumer
/// never stalls commands issued by other callers; dropping a read future
/// drops its connection, which makes the server abandon the blocked read.
pub struct RedisBroker {
    client: redis::Client,
    manager: RwLock<Option<ConnectionManager>>,
    blocking: Mutex<Vec<MultiplexedConnection>>,
    address: String,
}

impl RedisBroker {
    /// Connect using the address, credentials and database in `config`
    pub async fn connect(config: &ClientConfig) -> BrokerResult<Self> {
        Self::connect_url(&config.redis_url(), &config.address, config.connect_timeout()).await
    }

    /// Connect to a `redis://` or `rediss://` URL
    pub async fn connect_url(url: &str, address: &str, timeout: Duration) -> BrokerResult<Self> {
        if url.starts_with("rediss://") {
            info!("Redis TLS enabled (rediss://)");
        }

        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(timeout, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| {
                BrokerError::Connection(format!(
                    "timed out after {}ms connecting to {}",
                    timeout.as_millis(),
                    address
                ))
            })??;

        info!("Connected to Redis at {}", address);
        Ok(Self {
            client,
            manager: RwLock::new(Some(manager)),
            blocking: Mutex::new(Vec::new()),
            address: address.to_string(),
        })
    }

    fn manager(&self) -> BrokerResult<ConnectionManager> {
        self.manager.read().clone().ok_or(BrokerError::Closed)
    }

    async fn checkout_blocking(&self) -> BrokerResult<MultiplexedConnection> {
        if self.manager.read().is_none() {
            return Err(BrokerError::Closed);
        }
        let idle = self.blocking.lock().pop();
        match idle {
            Some(conn) => Ok(conn),
            None => {
                debug!(address = %self.address, "Opening blocking read connection");
                Ok(self.client.get_multiplexed_async_connection().await?)
            }
        }
    }

    fn checkin_blocking(&self, conn: MultiplexedConnection) {
        if self.manager.read().is_none() {
            return;
        }
        let mut idle = self.blocking.lock();
        if idle.len() < MAX_IDLE_BLOCKING_CONNECTIONS {
            idle.push(conn);
        }
    }
}

fn parse_id(raw: &str) -> BrokerResult<RecordId> {
    raw.parse()
        .map_err(|e: crate::types::ParseRecordIdError| BrokerError::UnexpectedReply(e.to_string()))
}

fn range_arg(id: RecordId, open: &'static str, bound: RecordId) -> String {
    if id == bound {
        open.to_string()
    } else {
        id.to_string()
    }
}

/// Whole milliseconds for BLOCK and min-idle arguments. A non-zero duration
/// never rounds down to 0, which Redis reads as "block forever".
fn whole_millis(duration: Duration) -> u64 {
    if duration.is_zero() {
        return 0;
    }
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    let rounded = if duration.subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis.saturating_add(1)
    };
    rounded.max(1)
}

fn value_to_bytes(field: &str, value: Value) -> BrokerResult<Bytes> {
    match value {
        Value::BulkString(bytes) => Ok(Bytes::from(bytes)),
        Value::SimpleString(s) => Ok(Bytes::from(s)),
        Value::Int(i) => Ok(Bytes::from(i.to_string())),
        Value::Okay => Ok(Bytes::from_static(b"OK")),
        other => Err(BrokerError::UnexpectedReply(format!(
            "field '{}' has unsupported value {:?}",
            field, other
        ))),
    }
}

fn stream_id_to_record(entry: StreamId) -> BrokerResult<Record> {
    let id = parse_id(&entry.id)?;
    let mut fields = Fields::new();
    for (key, value) in entry.map {
        let value = value_to_bytes(&key, value)?;
        fields.insert(key, value);
    }
    Ok(Record { id, fields })
}

#[async_trait]
impl BrokerHandle for RedisBroker {
    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
        mkstream: bool,
    ) -> BrokerResult<()> {
        let mut conn = self.manager()?;
        let start = start.as_arg();
        let result: redis::RedisResult<()> = if mkstream {
            conn.xgroup_create_mkstream(stream, group, &start).await
        } else {
            conn.xgroup_create(stream, group, &start).await
        };
        result.map_err(BrokerError::from)
    }

    async fn append(&self, stream: &str, fields: &Fields) -> BrokerResult<RecordId> {
        let mut conn = self.manager()?;
        let items: Vec<(&str, &[u8])> = fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_ref()))
            .collect();
        let id: String = conn.xadd(stream, "*", items.as_slice()).await?;
        parse_id(&id)
    }

    async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<StreamBatch>> {
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(usize::try_from(whole_millis(block)).unwrap_or(usize::MAX));

        let mut conn = self.checkout_blocking().await?;
        let reply: Option<StreamReadReply> = conn.xread_options(&[stream], &[">"], &options).await?;
        self.checkin_blocking(conn);

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut batches = Vec::with_capacity(reply.keys.len());
        for key in reply.keys {
            let mut records = Vec::with_capacity(key.ids.len());
            for entry in key.ids {
                records.push(stream_id_to_record(entry)?);
            }
            batches.push(StreamBatch {
                stream: key.key,
                records,
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
        let mut conn = self.manager()?;
        let reply: StreamPendingCountReply = conn
            .xpending_count(
                stream,
                group,
                range_arg(start, "-", RecordId::MIN),
                range_arg(end, "+", RecordId::MAX),
                count,
            )
            .await?;

        reply
            .ids
            .into_iter()
            .map(|pending| {
                Ok(PendingEntry {
                    id: parse_id(&pending.id)?,
                    consumer: pending.consumer,
                    idle: Duration::from_millis(pending.last_delivered_ms as u64),
                    delivery_count: pending.times_delivered as u64,
                })
            })
            .collect()
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> BrokerResult<Vec<Record>> {
        let mut conn = self.manager()?;
        let ids: Vec<String> = ids.iter().map(RecordId::to_string).collect();
        let reply: StreamClaimReply = conn
            .xclaim(stream, group, consumer, whole_millis(min_idle), ids.as_slice())
            .await?;
        reply.ids.into_iter().map(stream_id_to_record).collect()
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[RecordId]) -> BrokerResult<u64> {
        let mut conn = self.manager()?;
        let ids: Vec<String> = ids.iter().map(RecordId::to_string).collect();
        let acked: i64 = conn.xack(stream, group, ids.as_slice()).await?;
        Ok(acked.max(0) as u64)
    }

    async fn group_info(&self, stream: &str) -> BrokerResult<Vec<GroupInfo>> {
        let mut conn = self.manager()?;
        let exists: bool = conn.exists(stream).await?;
        if !exists {
            return Err(BrokerError::NoSuchStream);
        }

        let reply: StreamInfoGroupsReply = conn.xinfo_groups(stream).await?;
        reply
            .groups
            .into_iter()
            .map(|group| {
                Ok(GroupInfo {
                    name: group.name,
                    consumers: group.consumers as u64,
                    pending: group.pending as u64,
                    last_delivered_id: parse_id(&group.last_delivered_id)?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> BrokerResult<()> {
        let mut conn = self.manager()?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        let manager = self.manager.write().take();
        self.blocking.lock().clear();
        if manager.is_some() {
            info!("Closed Redis connection to {}", self.address);
        }
        Ok(())
    }
}
