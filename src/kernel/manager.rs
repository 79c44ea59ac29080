//! Manager capability contract.
//!
//! Every pluggable subsystem implements [`Manager`]. Optional capabilities are
//! exposed through explicit accessor methods that default to `None`, so the
//! kernel never guesses at a manager's concrete type.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use super::KernelHandle;
use crate::health::HealthReport;
use crate::msgcore::Message;
use crate::types::Result;

/// Lifecycle + health contract for a pluggable subsystem.
#[async_trait]
pub trait Manager: Debug + Send + Sync + 'static {
    /// Logical identity of the manager. Also its caller id for registry lookups.
    fn name(&self) -> &str;

    /// Returns once the manager is ready or has failed. Safe to call first.
    async fn start(&self) -> Result<()>;

    /// Returns once shutdown is complete and held resources are released.
    async fn close(&self) -> Result<()>;

    /// Current health. Must not block on lifecycle work and must not fail:
    /// internal problems are reported as an ERROR report.
    fn get_health(&self) -> HealthReport;

    /// Counter snapshot for the stats endpoint.
    fn stats(&self) -> Option<Value> {
        None
    }

    /// Managers that accept outbound messages return themselves here.
    fn as_message_sink(&self) -> Option<&dyn MessageSink> {
        None
    }

    /// Managers that need a back-reference to the kernel return themselves here.
    fn as_kernel_aware(&self) -> Option<&dyn KernelAware> {
        None
    }
}

/// Accepts messages for asynchronous delivery.
pub trait MessageSink: Send + Sync {
    /// Synchronous and never blocks indefinitely.
    fn enqueue(&self, message: Message, priority: i32);
}

/// Receives the kernel back-reference once, when the kernel is built.
pub trait KernelAware: Send + Sync {
    fn attach_kernel(&self, kernel: KernelHandle);
}
