//! In-process transport.
//!
//! Records every delivery instead of talking to a broker. Used by the binary
//! when no external broker is wired in, and by tests to observe drain order.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Delivery, PartitionRouter, Transport};
use crate::types::{Error, Result};

/// One recorded delivery with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredRecord {
    pub delivery: Delivery,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct MemoryTransport {
    router: PartitionRouter,
    started: AtomicBool,
    log: Mutex<Vec<DeliveredRecord>>,
}

impl MemoryTransport {
    pub fn new(router: PartitionRouter) -> Self {
        Self {
            router,
            started: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Snapshot of everything delivered so far, in delivery order.
    pub fn deliveries(&self) -> Vec<DeliveredRecord> {
        self.log.lock().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.log.lock().len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(PartitionRouter::default())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::Release);
        tracing::info!(
            num_partitions = self.router.num_partitions(),
            "memory_transport_started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            tracing::warn!("memory_transport_stop_without_start");
            return Ok(());
        }
        tracing::info!(delivered = self.delivered_count(), "memory_transport_stopped");
        Ok(())
    }

    async fn send(&self, destination: &str, key: &str, payload: &[u8]) -> Result<Delivery> {
        if !self.is_started() {
            return Err(Error::transport("transport is not started"));
        }
        if !self.router.is_pinned(key) {
            tracing::debug!(key, "key is not a recognized category, using hash partitioning");
        }

        let partition = self.router.partition_for(key);
        let mut log = self.log.lock();
        let delivery = Delivery {
            topic: destination.to_string(),
            key: key.to_string(),
            partition,
            offset: log.len() as u64,
        };
        log.push(DeliveredRecord {
            delivery: delivery.clone(),
            payload: payload.to_vec(),
        });

        tracing::debug!(
            topic = destination,
            partition,
            offset = delivery.offset,
            "message_delivered"
        );
        Ok(delivery)
    }
}
