//! Panic containment for calls into managers.
//!
//! A panicking manager must not take the kernel down with it: health probes
//! are wrapped in [`with_recovery`], and panics in spawned lifecycle tasks
//! are turned into failure reasons with [`panic_message`].

use crate::types::{Error, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a synchronous call, converting a panic into an internal error.
pub fn with_recovery<F, T>(operation: F, operation_name: &str) -> Result<T>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(operation)).map_err(|payload| {
        let panic_msg = panic_message(payload.as_ref());
        tracing::error!(
            operation = operation_name,
            panic = %panic_msg,
            "panic_recovered"
        );
        Error::internal(format!("panic in {}: {}", operation_name, panic_msg))
    })
}

/// Extract the message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}
