//! # Zeta Kernel - Lightweight Service Kernel
//!
//! Supervisory core for independently pluggable subsystems ("managers"):
//! - Capability-gated service registry with per-service allowed callers
//! - Concurrent start/close fan-out with aggregated failures
//! - Health-report algebra across all managers
//! - Priority-ordered outbound message queue draining into a transport
//! - HTTP control surface for operators and producers
//!
//! ## Architecture
//!
//! ```text
//!   producer ──▶ Kernel.get_service("MsgManager") ──▶ MsgManager.handle
//!                                                         │
//!        Kernel.get_service("QueueManager", "MsgManager") ◀┘
//!                                │
//!                          enqueue ──▶ drain loop ──▶ Transport.send
//! ```

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod control;
pub mod health;
pub mod kernel;
pub mod msgcore;
pub mod transport;
pub mod types;

pub mod observability;

pub use types::{Config, Error, Result};
