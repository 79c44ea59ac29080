//! Core types for the service kernel.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (MessageId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for kernel, queue, dispatch and transport

mod config;
mod errors;
mod ids;

pub use config::{
    Config, DispatchConfig, KernelConfig, ObservabilityConfig, QueueConfig, ServerConfig,
    TransportConfig,
};
pub use errors::{Error, LifecyclePhase, ManagerFailure, Result};
pub use ids::MessageId;
