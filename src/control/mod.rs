//! HTTP control surface.
//!
//! Operator endpoints for kernel lifecycle, health and per-manager
//! statistics, plus a producer endpoint that hands messages to the
//! dispatcher. Every call goes through the kernel registry under the
//! [`CONTROL_CALLER`](crate::kernel::CONTROL_CALLER) identity.

mod handlers;
mod server;

pub use handlers::{ApiError, StatusResponse};
pub use server::{router, ControlServer, ControlState};
