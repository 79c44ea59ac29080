//! Outbound priority queue draining into a [`Transport`].
//!
//! Any component may enqueue; a single drain task pops the lowest priority
//! value first and hands each message to the transport. The drain task
//! sleeps on a [`Notify`] while the queue is empty and wakes on enqueue or
//! shutdown.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::message::Message;
use super::priority::{PrioritizedMessage, PriorityBuffer};
use crate::health::{HealthReport, Status};
use crate::kernel::{Manager, MessageSink};
use crate::transport::{Delivery, Transport};
use crate::types::{Error, QueueConfig, Result};

/// Registry name of the queue manager.
pub const QUEUE_MANAGER: &str = "QueueManager";

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub messages_enqueued: u64,
    pub messages_processed: u64,
    pub messages_sent: u64,
    pub error_count: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    sent: AtomicU64,
    errors: AtomicU64,
}

/// State shared between the manager and its drain task.
struct QueueShared {
    buffer: Mutex<PriorityBuffer>,
    wake: Notify,
    transport: Arc<dyn Transport>,
    counters: QueueCounters,
    /// Generation of the live drain task, `0` when none is running.
    active_drain: AtomicU64,
    /// Last generation handed out by `start()`.
    drain_generation: AtomicU64,
}

impl fmt::Debug for QueueShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueShared")
            .field("depth", &self.buffer.lock().len())
            .field("counters", &self.counters)
            .field("active_drain", &self.active_drain)
            .finish_non_exhaustive()
    }
}

impl QueueShared {
    fn push(&self, message: Message, priority: i32) {
        // Counter updates happen under the buffer lock so that
        // enqueued == processed + depth holds whenever the lock is free.
        {
            let mut buffer = self.buffer.lock();
            buffer.push(message, priority);
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        self.wake.notify_one();
    }

    fn pop(&self) -> Option<PrioritizedMessage> {
        let mut buffer = self.buffer.lock();
        let item = buffer.pop()?;
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    async fn deliver(&self, message: &Message) -> Result<Delivery> {
        let route = message.route()?;
        let payload = message.payload_bytes()?;
        self.transport.send(&route.topic, &route.key, &payload).await
    }

    async fn process(&self, item: PrioritizedMessage) {
        match self.deliver(&item.message).await {
            Ok(delivery) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    message_id = %item.message.id,
                    priority = item.priority,
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    "message_routed"
                );
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    message_id = %item.message.id,
                    message_type = %item.message.kind,
                    error = %e,
                    "message_delivery_failed"
                );
            }
        }
    }

    /// Clear the live-drain marker if it still belongs to `generation`.
    fn retire_drain(&self, generation: u64) {
        let _ = self.active_drain.compare_exchange(
            generation,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn stats(&self) -> QueueStats {
        let buffer = self.buffer.lock();
        QueueStats {
            queue_size: buffer.len(),
            messages_enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            messages_processed: self.counters.processed.load(Ordering::Relaxed),
            messages_sent: self.counters.sent.load(Ordering::Relaxed),
            error_count: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

/// Marks its generation as stopped however the drain task exits.
///
/// A guard only clears the flag it set, so a stale task finishing late
/// cannot hide a newer drain task.
struct DrainGuard {
    shared: Arc<QueueShared>,
    generation: u64,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.shared.retire_drain(self.generation);
    }
}

async fn drain_loop(shared: Arc<QueueShared>, cancel: CancellationToken, generation: u64) {
    let _guard = DrainGuard {
        shared: shared.clone(),
        generation,
    };
    tracing::info!("queue_drain_started");

    loop {
        if cancel.is_cancelled() {
            break;
        }
        match shared.pop() {
            Some(item) => shared.process(item).await,
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }

    tracing::info!(remaining = shared.buffer.lock().len(), "queue_drain_stopped");
}

#[derive(Debug)]
struct DrainTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    generation: u64,
}

/// Manager owning the outbound queue and its transport.
#[derive(Debug)]
pub struct QueueManager {
    name: String,
    config: QueueConfig,
    shared: Arc<QueueShared>,
    drain: tokio::sync::Mutex<Option<DrainTask>>,
}

impl QueueManager {
    pub fn new(transport: Arc<dyn Transport>, config: QueueConfig) -> Self {
        Self {
            name: QUEUE_MANAGER.to_string(),
            config,
            shared: Arc::new(QueueShared {
                buffer: Mutex::new(PriorityBuffer::new()),
                wake: Notify::new(),
                transport,
                counters: QueueCounters::default(),
                active_drain: AtomicU64::new(0),
                drain_generation: AtomicU64::new(0),
            }),
            drain: tokio::sync::Mutex::new(None),
        }
    }

    /// Add a message; never blocks on the drain task.
    pub fn enqueue(&self, message: Message, priority: i32) {
        tracing::debug!(message_id = %message.id, priority, "message_enqueued");
        self.shared.push(message, priority);
    }

    pub fn depth(&self) -> usize {
        self.shared.buffer.lock().len()
    }

    pub fn is_draining(&self) -> bool {
        self.shared.active_drain.load(Ordering::Acquire) != 0
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.shared.stats()
    }
}

#[async_trait]
impl Manager for QueueManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        let mut drain = self.drain.lock().await;
        if drain.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            tracing::warn!("{} is already running", self.name);
            return Ok(());
        }

        tracing::info!("Starting {}...", self.name);
        self.shared.transport.start().await?;

        let cancel = CancellationToken::new();
        let generation = self.shared.drain_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.active_drain.store(generation, Ordering::Release);
        let handle = tokio::spawn(drain_loop(self.shared.clone(), cancel.clone(), generation));
        *drain = Some(DrainTask {
            cancel,
            handle,
            generation,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(task) = self.drain.lock().await.take() else {
            tracing::warn!("{} is not running", self.name);
            return Ok(());
        };

        tracing::info!("Stopping {}...", self.name);
        task.cancel.cancel();
        let mut handle = task.handle;
        match tokio::time::timeout(self.config.flush_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "queue_drain_task_failed");
            }
            Err(_) => {
                tracing::warn!("queue drain did not stop in time, aborting");
                handle.abort();
            }
        }
        self.shared.retire_drain(task.generation);

        tokio::time::timeout(self.config.flush_timeout, self.shared.transport.stop())
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "transport flush exceeded {:?}",
                    self.config.flush_timeout
                ))
            })?
    }

    fn get_health(&self) -> HealthReport {
        let alive = self.is_draining();
        let stats = self.queue_stats();
        let (status, headline) = if alive {
            (Status::Ok, format!("{} is healthy", self.name))
        } else {
            (Status::Error, format!("{} is not running.", self.name))
        };

        HealthReport::new(&self.name, status).with_details([
            headline,
            format!("Messages in queue: {}", stats.queue_size),
            format!("Messages enqueued: {}", stats.messages_enqueued),
            format!("Messages processed: {}", stats.messages_processed),
            format!("Messages sent: {}", stats.messages_sent),
        ])
    }

    fn stats(&self) -> Option<Value> {
        serde_json::to_value(self.queue_stats()).ok()
    }

    fn as_message_sink(&self) -> Option<&dyn MessageSink> {
        Some(self)
    }
}

impl MessageSink for QueueManager {
    fn enqueue(&self, message: Message, priority: i32) {
        QueueManager::enqueue(self, message, priority);
    }
}
