use crate::broker::SharedBroker;
use crate::error::{BrokerError, ClientError, Result};
use crate::types::{GroupInfo, GroupStart};
use tracing::{debug, info};

/// Ensures (stream, group) pairs exist before they are read from
#[derive(Clone)]
pub struct GroupCoordinator {
    broker: SharedBroker,
}

/// Reject empty group names before any broker call
pub(crate) fn validate_group(group: &str) -> Result<()> {
    if group.is_empty() {
        return Err(ClientError::InvalidArgument(
            "consumer group name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Reject empty stream names before any broker call
pub(crate) fn validate_stream(stream: &str) -> Result<()> {
    if stream.is_empty() {
        return Err(ClientError::InvalidArgument(
            "stream name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

impl GroupCoordinator {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    /// Describe every group on `stream`; empty if the stream does not exist yet
    pub async fn group_info(&self, stream: &str) -> Result<Vec<GroupInfo>> {
        validate_stream(stream)?;
        match self.broker.group_info(stream).await {
            Ok(groups) => Ok(groups),
            Err(BrokerError::NoSuchStream) => Ok(Vec::new()),
            Err(e) => Err(ClientError::transport("XINFO GROUPS", stream, None, e)),
        }
    }

    /// Check whether `group` exists on `stream` without creating anything.
    ///
    /// A stream that does not exist has no groups, so this returns `false`.
    pub async fn group_exists(&self, stream: &str, group: &str) -> Result<bool> {
        validate_group(group)?;
        let groups = self.group_info(stream).await?;
        Ok(groups.iter().any(|info| info.name == group))
    }

    /// Create `group` on `stream` reading from the beginning, creating the
    /// stream as well if it is missing. A group that already exists is success.
    pub async fn ensure_group_exists(&self, stream: &str, group: &str) -> Result<()> {
        self.ensure_group_exists_from(stream, group, GroupStart::Beginning)
            .await
    }

    /// Like [`ensure_group_exists`](Self::ensure_group_exists) with an explicit
    /// start position for a newly created group
    pub async fn ensure_group_exists_from(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<()> {
        validate_group(group)?;
        validate_stream(stream)?;

        match self.broker.create_group(stream, group, start, true).await {
            Ok(()) => {
                info!("Created consumer group {} on stream {}", group, stream);
                Ok(())
            }
            Err(BrokerError::GroupExists) => {
                debug!("Consumer group {} already exists on stream {}", group, stream);
                Ok(())
            }
            Err(e) => Err(ClientError::transport(
                "XGROUP CREATE",
                stream,
                Some(group),
                e,
            )),
        }
    }
}
