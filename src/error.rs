use thiserror::Error;

/// Result type alias for stream client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to callers of the stream client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Caller supplied an unusable argument; detected before any broker call
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Broker unreachable or command failed
    #[error("Transport error during {operation}{}: {reason}", target_suffix(.stream, .group))]
    Transport {
        operation: &'static str,
        stream: String,
        group: Option<String>,
        reason: String,
        retryable: bool,
    },

    /// Broker reply violated an invariant the client relies on
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The shared broker handle has been closed
    #[error("Broker connection is closed")]
    Closed,

    /// A message handler returned an error
    #[error("Handler error: {0}")]
    Handler(String),
}

fn target_suffix(stream: &str, group: &Option<String>) -> String {
    match (stream.is_empty(), group) {
        (true, _) => String::new(),
        (false, Some(group)) => format!(" on stream {} (group {})", stream, group),
        (false, None) => format!(" on stream {}", stream),
    }
}

/// Errors returned by [`BrokerHandle`](crate::broker::BrokerHandle) implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The consumer group already exists on the stream
    #[error("BUSYGROUP consumer group name already exists")]
    GroupExists,

    /// The consumer group does not exist on the stream
    #[error("NOGROUP no such consumer group")]
    NoGroup,

    /// The stream key does not exist
    #[error("no such stream")]
    NoSuchStream,

    /// Connection could not be established or was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed the command
    #[error("command error: {0}")]
    Command(String),

    /// Reply could not be decoded into the expected shape
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The handle was closed before the call
    #[error("handle closed")]
    Closed,
}

impl BrokerError {
    /// Whether the failure came from the connection rather than the command
    pub fn is_connection(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        match err.code() {
            Some("BUSYGROUP") => BrokerError::GroupExists,
            Some("NOGROUP") => BrokerError::NoGroup,
            _ if err.is_io_error()
                || err.is_connection_dropped()
                || err.is_connection_refusal()
                || err.is_timeout() =>
            {
                BrokerError::Connection(err.to_string())
            }
            _ if err.kind() == redis::ErrorKind::TypeError => {
                BrokerError::UnexpectedReply(err.to_string())
            }
            _ if err.to_string().contains("no such key") => BrokerError::NoSuchStream,
            _ => BrokerError::Command(err.to_string()),
        }
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::InvalidConfig(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::InvalidArgument(err.to_string())
    }
}

impl ClientError {
    /// Wrap a broker failure with the operation and (stream, group) it hit.
    ///
    /// A closed handle maps to [`ClientError::Closed`] and an undecodable reply
    /// to [`ClientError::Protocol`] rather than a transport error.
    pub fn transport(
        operation: &'static str,
        stream: &str,
        group: Option<&str>,
        err: BrokerError,
    ) -> Self {
        match err {
            BrokerError::Closed => return ClientError::Closed,
            BrokerError::UnexpectedReply(reason) => {
                return ClientError::Protocol(format!(
                    "{} on stream {}: {}",
                    operation, stream, reason
                ))
            }
            _ => {}
        }
        ClientError::Transport {
            operation,
            stream: stream.to_string(),
            group: group.map(str::to_string),
            retryable: err.is_connection(),
            reason: err.to_string(),
        }
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::InvalidArgument(_) => "invalid_argument",
            ClientError::InvalidConfig(_) => "configuration",
            ClientError::Transport { .. } => "transport",
            ClientError::Protocol(_) => "protocol",
            ClientError::Closed => "closed",
            ClientError::Handler(_) => "handler",
        }
    }

    /// Check if a surrounding retry policy may retry the failed call.
    ///
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::InvalidArgument(_)
            | ClientError::InvalidConfig(_)
            | ClientError::Protocol(_)
            | ClientError::Closed
            | ClientError::Handler(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_carries_context() {
        let err = ClientError::transport(
            "XREADGROUP",
            "orders",
            Some("billing"),
            BrokerError::Connection("connection refused".to_string()),
        );

        assert_eq!(err.category(), "transport");
        assert!(err.is_retryable());
        let text = err.to_string();
        assert!(text.contains("XREADGROUP"));
        assert!(text.contains("orders"));
        assert!(text.contains("group billing"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_command_failures_are_not_retryable() {
        let err = ClientError::transport(
            "XADD",
            "orders",
            None,
            BrokerError::Command("WRONGTYPE".to_string()),
        );
        assert!(!err.is_retryable());
        assert!(!err.to_string().contains("group"));
    }

    #[test]
    fn test_connection_failure_without_stream() {
        let err = ClientError::transport(
            "CONNECT",
            "",
            None,
            BrokerError::Connection("timed out".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Transport error during CONNECT: connection error: timed out"
        );
    }

    #[test]
    fn test_closed_handle_maps_to_closed() {
        let err = ClientError::transport("XACK", "orders", Some("g"), BrokerError::Closed);
        assert_eq!(err, ClientError::Closed);
        assert_eq!(err.category(), "closed");
    }

    #[test]
    fn test_protocol_and_argument_errors_are_fatal() {
        assert!(!ClientError::Protocol("two streams".into()).is_retryable());
        assert!(!ClientError::InvalidArgument("empty group".into()).is_retryable());
        assert_eq!(ClientError::Handler("boom".into()).category(), "handler");
    }
}
