//! Broker primitives consumed by the coordination layer.
//!
//! [`BrokerHandle`] is the seam: the Redis implementation talks to a real
//! server, the in-memory implementation keeps the same stream, group and
//! pending-entries semantics inside the process.

pub mod memory;
pub mod redis_broker;
pub mod traits;

pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;
pub use traits::{BrokerHandle, BrokerResult, SharedBroker};
