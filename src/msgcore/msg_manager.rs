//! Inbound message dispatch.
//!
//! Messages are routed by their [`MessageType`] to a handler fixed at
//! construction. Routable types are forwarded to the queue manager, looked
//! up through the kernel registry under this manager's own name so the
//! registry's access rules apply.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use super::message::{Message, MessageType};
use super::queue_manager::QUEUE_MANAGER;
use crate::health::HealthReport;
use crate::kernel::{KernelAware, KernelHandle, Manager};
use crate::types::{DispatchConfig, Error, Result};

/// Registry name of the dispatcher.
pub const MSG_MANAGER: &str = "MsgManager";

type Handler = fn(&MsgManager, &Message) -> Result<()>;

/// Result of handing one message to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// A handler ran to completion.
    Handled,
    /// A handler ran but could not finish (e.g. the queue was unreachable).
    Dropped { reason: String },
    /// No handler is registered for the message type.
    NoHandler,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub messages_handled: u64,
    pub messages_routed: u64,
    pub error_count: u64,
}

pub struct MsgManager {
    name: String,
    config: DispatchConfig,
    handlers: HashMap<MessageType, Handler>,
    kernel: OnceLock<KernelHandle>,
    running: AtomicBool,
    handled: AtomicU64,
    routed: AtomicU64,
    errors: AtomicU64,
    recent: Mutex<VecDeque<Message>>,
    last_server_time: RwLock<Option<DateTime<Utc>>>,
}

impl fmt::Debug for MsgManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsgManager")
            .field("name", &self.name)
            .field("handlers", &self.handler_types())
            .field("running", &self.running)
            .field("stats", &self.dispatch_stats())
            .finish_non_exhaustive()
    }
}

impl MsgManager {
    pub fn new(config: DispatchConfig) -> Self {
        let mut handlers: HashMap<MessageType, Handler> = HashMap::new();
        handlers.insert(MessageType::Snapshots, Self::forward_to_queue);
        handlers.insert(MessageType::Alerts, Self::forward_to_queue);
        handlers.insert(MessageType::Chats, Self::forward_to_queue);
        handlers.insert(MessageType::ServerTime, Self::record_server_time);

        Self {
            name: MSG_MANAGER.to_string(),
            recent: Mutex::new(VecDeque::with_capacity(config.recent_capacity)),
            config,
            handlers,
            kernel: OnceLock::new(),
            running: AtomicBool::new(false),
            handled: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_server_time: RwLock::new(None),
        }
    }

    /// Dispatch one message. Never returns an error; failures are counted.
    pub fn handle(&self, message: Message) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&message.kind).copied() else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                message_id = %message.id,
                message_type = %message.kind,
                "No handler found for message type: {}",
                message.kind
            );
            return DispatchOutcome::NoHandler;
        };

        let outcome = match handler(self, &message) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    message_id = %message.id,
                    message_type = %message.kind,
                    error = %e,
                    "message_dropped"
                );
                DispatchOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        };

        self.handled.fetch_add(1, Ordering::Relaxed);
        self.remember(message);
        outcome
    }

    /// Build a message from a raw type tag and dispatch it.
    pub fn handle_tagged(&self, tag: &str, payload: Value) -> DispatchOutcome {
        self.handle(Message::tagged(tag, payload))
    }

    /// Most recent handled messages, oldest first.
    pub fn recent_messages(&self) -> Vec<Message> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Message types with a registered handler, in declaration order.
    pub fn handler_types(&self) -> Vec<MessageType> {
        MessageType::ALL
            .into_iter()
            .filter(|kind| self.handlers.contains_key(kind))
            .collect()
    }

    pub fn last_server_time(&self) -> Option<DateTime<Utc>> {
        *self.last_server_time.read()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        DispatchStats {
            messages_handled: self.handled.load(Ordering::Relaxed),
            messages_routed: self.routed.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
        }
    }

    fn remember(&self, message: Message) {
        if self.config.recent_capacity == 0 {
            return;
        }
        let mut recent = self.recent.lock();
        while recent.len() >= self.config.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(message);
    }

    fn forward_to_queue(&self, message: &Message) -> Result<()> {
        let kernel = self
            .kernel
            .get()
            .and_then(KernelHandle::upgrade)
            .ok_or_else(|| Error::internal("no kernel attached to dispatcher"))?;

        let queue = kernel.get_service(QUEUE_MANAGER, &self.name)?;
        let sink = queue.as_message_sink().ok_or_else(|| {
            Error::internal(format!("service '{}' does not accept messages", QUEUE_MANAGER))
        })?;

        sink.enqueue(message.clone(), self.config.default_priority);
        self.routed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            message_id = %message.id,
            message_type = %message.kind,
            "message_forwarded"
        );
        Ok(())
    }

    fn record_server_time(&self, message: &Message) -> Result<()> {
        let at = server_time_of(message)?;
        *self.last_server_time.write() = Some(at);
        tracing::debug!(server_time = %at, "server_time_recorded");
        Ok(())
    }
}

/// Server time carried in the payload's `time` field (epoch millis or
/// RFC 3339), falling back to the message timestamp when absent.
fn server_time_of(message: &Message) -> Result<DateTime<Utc>> {
    match message.payload.get("time") {
        None | Some(Value::Null) => Ok(message.timestamp),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| Error::validation(format!("server time out of range: {}", n))),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::validation(format!("invalid server time '{}': {}", s, e))),
        Some(other) => Err(Error::validation(format!(
            "unsupported server time value: {}",
            other
        ))),
    }
}

#[async_trait]
impl Manager for MsgManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("{} is already running", self.name);
        } else {
            tracing::info!(handlers = self.handlers.len(), "Starting {}...", self.name);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::info!("Stopping {}...", self.name);
        }
        Ok(())
    }

    fn get_health(&self) -> HealthReport {
        HealthReport::running_or_not(&self.name, self.running.load(Ordering::Acquire))
    }

    fn stats(&self) -> Option<Value> {
        serde_json::to_value(self.dispatch_stats()).ok()
    }

    fn as_kernel_aware(&self) -> Option<&dyn KernelAware> {
        Some(self)
    }
}

impl KernelAware for MsgManager {
    fn attach_kernel(&self, kernel: KernelHandle) {
        if self.kernel.set(kernel).is_err() {
            tracing::warn!("{} is already attached to a kernel", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{AllowedCallers, Kernel};
    use crate::msgcore::QueueManager;
    use crate::transport::MemoryTransport;
    use crate::types::{KernelConfig, QueueConfig};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn snapshot(key: &str) -> Value {
        json!({ "topic": "snapshots", "key": key, "bid": 101.5 })
    }

    fn wired(
        queue_callers: AllowedCallers,
    ) -> (Arc<Kernel>, Arc<MsgManager>, Arc<QueueManager>) {
        let queue = Arc::new(QueueManager::new(
            Arc::new(MemoryTransport::default()),
            QueueConfig::default(),
        ));
        let dispatcher = Arc::new(MsgManager::new(DispatchConfig::default()));

        let mut builder = Kernel::builder(KernelConfig::default());
        builder
            .register_with_callers(QUEUE_MANAGER, queue.clone(), queue_callers)
            .unwrap();
        builder.register(MSG_MANAGER, dispatcher.clone()).unwrap();
        (builder.build(), dispatcher, queue)
    }

    #[test]
    fn test_unknown_type_counts_exactly_one_error() {
        let (_kernel, dispatcher, queue) = wired(AllowedCallers::Any);

        let outcome = dispatcher.handle_tagged("order_book", json!({ "key": "XLK" }));
        assert_eq!(outcome, DispatchOutcome::NoHandler);
        assert_eq!(
            dispatcher.dispatch_stats(),
            DispatchStats {
                messages_handled: 0,
                messages_routed: 0,
                error_count: 1,
            }
        );
        assert_eq!(queue.depth(), 0);
        assert!(dispatcher.recent_messages().is_empty());
    }

    #[test]
    fn test_routable_types_reach_the_queue() {
        let (_kernel, dispatcher, queue) = wired(AllowedCallers::Any);

        for tag in ["snapshots", "alerts", "chats"] {
            assert_eq!(
                dispatcher.handle_tagged(tag, snapshot("XLF")),
                DispatchOutcome::Handled
            );
        }

        assert_eq!(queue.depth(), 3);
        let stats = dispatcher.dispatch_stats();
        assert_eq!(stats.messages_handled, 3);
        assert_eq!(stats.messages_routed, 3);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn test_restricted_queue_denies_dispatcher() {
        let (_kernel, dispatcher, queue) =
            wired(AllowedCallers::from_list(["SomeoneElse".to_string()]));

        let outcome = dispatcher.handle_tagged("alerts", snapshot("XLE"));
        match outcome {
            DispatchOutcome::Dropped { reason } => assert!(reason.contains("access denied")),
            other => panic!("expected a drop, got {:?}", other),
        }
        assert_eq!(queue.depth(), 0);
        let stats = dispatcher.dispatch_stats();
        assert_eq!(stats.messages_routed, 0);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_without_kernel_forward_is_dropped() {
        let dispatcher = MsgManager::new(DispatchConfig::default());
        let outcome = dispatcher.handle_tagged("chats", snapshot("XLU"));
        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        assert_eq!(dispatcher.dispatch_stats().error_count, 1);
    }

    #[test]
    fn test_dropped_kernel_is_dropped_message() {
        let (kernel, dispatcher, _queue) = wired(AllowedCallers::Any);
        drop(kernel);
        let outcome = dispatcher.handle_tagged("snapshots", snapshot("XLK"));
        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
    }

    #[test]
    fn test_server_time_is_recorded_locally() {
        let (_kernel, dispatcher, queue) = wired(AllowedCallers::Any);

        dispatcher.handle_tagged("server_time", json!({ "time": 1_700_000_000_000_i64 }));
        assert_eq!(
            dispatcher.last_server_time(),
            Utc.timestamp_millis_opt(1_700_000_000_000).single()
        );

        dispatcher.handle_tagged("server_time", json!({ "time": "2024-03-01T12:00:00Z" }));
        assert_eq!(
            dispatcher.last_server_time().map(|t| t.to_rfc3339()),
            Some("2024-03-01T12:00:00+00:00".to_string())
        );

        let bad = dispatcher.handle_tagged("server_time", json!({ "time": "yesterday" }));
        assert!(matches!(bad, DispatchOutcome::Dropped { .. }));
        assert_eq!(queue.depth(), 0);
        assert_eq!(dispatcher.dispatch_stats().messages_routed, 0);
    }

    #[test]
    fn test_recent_history_is_bounded() {
        let dispatcher = MsgManager::new(DispatchConfig {
            recent_capacity: 2,
            ..DispatchConfig::default()
        });
        for n in 0..5 {
            dispatcher.handle_tagged("server_time", json!({ "time": n }));
        }
        let recent: Vec<Value> = dispatcher
            .recent_messages()
            .into_iter()
            .map(|m| m.payload["time"].clone())
            .collect();
        assert_eq!(recent, vec![json!(3), json!(4)]);
    }

    #[test]
    fn test_handler_types_exclude_unknown() {
        let dispatcher = MsgManager::new(DispatchConfig::default());
        assert_eq!(
            dispatcher.handler_types(),
            vec![
                MessageType::ServerTime,
                MessageType::Snapshots,
                MessageType::Alerts,
                MessageType::Chats,
            ]
        );
    }

    #[tokio::test]
    async fn test_health_follows_lifecycle() {
        let dispatcher = MsgManager::new(DispatchConfig::default());
        assert!(!dispatcher.get_health().is_ok());
        dispatcher.start().await.unwrap();
        assert_eq!(dispatcher.get_health().details, vec!["MsgManager is healthy"]);
        dispatcher.close().await.unwrap();
        assert_eq!(dispatcher.get_health().details, vec!["MsgManager is not running."]);
    }
}
