//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle phase an aggregated failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Start,
    Close,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Start => f.write_str("start"),
            LifecyclePhase::Close => f.write_str("close"),
        }
    }
}

/// One manager's failure inside an aggregated lifecycle error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerFailure {
    pub manager: String,
    pub reason: String,
}

impl ManagerFailure {
    pub fn new(manager: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ManagerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.manager, self.reason)
    }
}

fn summarize(failures: &[ManagerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error enum for the service kernel.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or duplicate service registration (raised at setup time).
    #[error("registration error: {0}")]
    Registration(String),

    /// Lookup of a service name that was never registered.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Caller is not in the service's allowed callers.
    #[error("access denied: '{caller}' is not allowed to access '{service}'")]
    AccessDenied { service: String, caller: String },

    /// One or more managers failed to start or close.
    #[error("{phase} failed for {} manager(s): {}", failures.len(), summarize(failures))]
    Lifecycle {
        phase: LifecyclePhase,
        failures: Vec<ManagerFailure>,
    },

    /// Failure surfaced from the transport collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message could not be resolved to a destination.
    #[error("routing error: {0}")]
    Routing(String),

    /// Validation errors.
    #[error("validation error: {0}")]
    Validation(String),

    /// Timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    pub fn service_not_found(name: impl Into<String>) -> Self {
        Self::ServiceNotFound(name.into())
    }

    pub fn access_denied(service: impl Into<String>, caller: impl Into<String>) -> Self {
        Self::AccessDenied {
            service: service.into(),
            caller: caller.into(),
        }
    }

    pub fn lifecycle(phase: LifecyclePhase, failures: Vec<ManagerFailure>) -> Self {
        Self::Lifecycle { phase, failures }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn routing(msg: impl Into<String>) -> Self {
        Self::Routing(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code, used by the control surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Registration(_) => "REGISTRATION",
            Error::ServiceNotFound(_) => "NOT_FOUND",
            Error::AccessDenied { .. } => "ACCESS_DENIED",
            Error::Lifecycle { .. } => "LIFECYCLE",
            Error::Transport(_) => "TRANSPORT",
            Error::Routing(_) => "ROUTING",
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_message_lists_every_failure() {
        let err = Error::lifecycle(
            LifecyclePhase::Start,
            vec![
                ManagerFailure::new("QueueManager", "transport refused"),
                ManagerFailure::new("Audit", "timed out after 5s"),
            ],
        );
        let msg = err.to_string();
        assert!(msg.starts_with("start failed for 2 manager(s)"));
        assert!(msg.contains("QueueManager: transport refused"));
        assert!(msg.contains("Audit: timed out after 5s"));
    }

    #[test]
    fn test_access_denied_message() {
        let err = Error::access_denied("QueueManager", "Intruder");
        assert_eq!(
            err.to_string(),
            "access denied: 'Intruder' is not allowed to access 'QueueManager'"
        );
        assert_eq!(err.code(), "ACCESS_DENIED");
    }
}
