//! Kernel lifecycle state machine and manager fan-out.
//!
//! ```text
//! Stopped ─start─▶ Starting ─all ok─▶ Running ─close─▶ Stopping ─▶ Stopped
//!                     │                                  ▲
//!                     └─any failure─▶ Degraded ─close────┘
//! ```
//!
//! A Degraded kernel may be started again.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinError, JoinSet};

use super::recovery::panic_message;
use super::Manager;
use crate::types::{LifecyclePhase, ManagerFailure};

/// Kernel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Degraded,
}

impl KernelState {
    pub fn is_running(self) -> bool {
        self == KernelState::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KernelState::Stopped => "stopped",
            KernelState::Starting => "starting",
            KernelState::Running => "running",
            KernelState::Stopping => "stopping",
            KernelState::Degraded => "degraded",
        }
    }
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Err` carries the failure reason.
type PhaseOutcome = std::result::Result<(), String>;

/// Call one lifecycle phase on a manager, bounded by `limit`.
async fn bounded_phase(
    manager: Arc<dyn Manager>,
    phase: LifecyclePhase,
    limit: Duration,
) -> PhaseOutcome {
    let call = async {
        match phase {
            LifecyclePhase::Start => manager.start().await,
            LifecyclePhase::Close => manager.close().await,
        }
    };
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "timed out after {}",
            humantime::format_duration(limit)
        )),
    }
}

fn join_failure(join_err: JoinError) -> String {
    if join_err.is_panic() {
        format!("panicked: {}", panic_message(join_err.into_panic().as_ref()))
    } else {
        format!("task aborted: {}", join_err)
    }
}

/// Run one lifecycle phase on a single manager in its own task.
///
/// Errors, timeouts and panics all come back as a failure reason.
pub async fn run_phase(
    manager: Arc<dyn Manager>,
    phase: LifecyclePhase,
    limit: Duration,
) -> PhaseOutcome {
    tokio::spawn(bounded_phase(manager, phase, limit))
        .await
        .unwrap_or_else(|join_err| Err(join_failure(join_err)))
}

/// Run one lifecycle phase on every manager concurrently and join them all.
///
/// Every manager gets its attempt regardless of the others' outcome. Failures
/// are returned in the order the managers were given.
pub async fn fan_out(
    managers: Vec<(String, Arc<dyn Manager>)>,
    phase: LifecyclePhase,
    limit: Duration,
) -> Vec<ManagerFailure> {
    let mut tasks = JoinSet::new();
    let mut slots: HashMap<task::Id, (usize, String)> = HashMap::new();
    for (position, (name, manager)) in managers.into_iter().enumerate() {
        let handle = tasks.spawn(bounded_phase(manager, phase, limit));
        slots.insert(handle.id(), (position, name));
    }

    let mut outcomes = Vec::with_capacity(slots.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(join_err) => (join_err.id(), Err(join_failure(join_err))),
        };
        if let Some((position, name)) = slots.remove(&id) {
            outcomes.push((position, name, outcome));
        }
    }
    outcomes.sort_by_key(|(position, _, _)| *position);

    let mut failures = Vec::new();
    for (_, name, outcome) in outcomes {
        match outcome {
            Ok(()) => tracing::info!(manager = %name, %phase, "manager_phase_completed"),
            Err(reason) => {
                tracing::error!(manager = %name, %phase, reason = %reason, "manager_phase_failed");
                failures.push(ManagerFailure::new(name, reason));
            }
        }
    }
    failures
}
