//! Transport collaborator: the wire side of the outbound queue.
//!
//! The queue hands each message to a [`Transport`] by destination and key.
//! Retries, backoff and partition selection belong to the transport, which
//! keeps the queue transport-agnostic.

mod memory;
mod router;

pub use memory::{DeliveredRecord, MemoryTransport};
pub use router::PartitionRouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Confirmation of a handed-off message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub topic: String,
    pub key: String,
    pub partition: u32,
    /// Monotonic per-transport offset.
    pub offset: u64,
}

/// Outbound transport (message-broker client or equivalent).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open connections; called from the queue's `start()`.
    async fn start(&self) -> Result<()>;

    /// Flush in-flight messages and release connections.
    async fn stop(&self) -> Result<()>;

    /// Send one payload. Failures surface only after the transport's own retries.
    async fn send(&self, destination: &str, key: &str, payload: &[u8]) -> Result<Delivery>;
}
