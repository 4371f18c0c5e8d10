//! RustMQ Streams
//!
//! At-least-once consumption of append-only streams through named consumer
//! groups: group bootstrap, bounded-blocking polling, reclaiming idle pending
//! entries and acknowledgment, over Redis or an in-process broker.

pub mod broker;
pub mod client;
pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod message;
pub mod pipeline;
pub mod producer;
pub mod reclaim;
pub mod types;

pub use broker::{BrokerHandle, MemoryBroker, RedisBroker, SharedBroker};
pub use client::StreamsClient;
pub use config::{ClientConfig, ConsumerConfig, PipelineConfig};
pub use consumer::{Acknowledger, MessageHandler, Poller};
pub use coordinator::GroupCoordinator;
pub use error::{BrokerError, ClientError, Result};
pub use identity::ConsumerNameGenerator;
pub use message::{ClientMessage, FieldsBuilder};
pub use pipeline::{ConsumptionPipeline, PipelineBuilder, PipelineMetrics};
pub use producer::{Producer, ProducerMetrics};
pub use reclaim::{ReclaimReport, Reclaimer};
pub use types::*;
