//! Kernel - the supervisory core.
//!
//! The Kernel owns the service registry, fans manager start/close out as
//! concurrent tasks, and folds every manager's health into one report.
//! Registration happens on [`KernelBuilder`]; once built, the registry is
//! read-only and lookups are safe from any number of callers.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::{Arc, Weak};

use crate::health::{HealthReport, Status};
use crate::msgcore::{MsgManager, QueueManager, MSG_MANAGER, QUEUE_MANAGER};
use crate::transport::Transport;
use crate::types::{Config, Error, KernelConfig, LifecyclePhase, ManagerFailure, Result};

pub mod lifecycle;
pub mod manager;
pub mod recovery;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::KernelState;
pub use manager::{KernelAware, Manager, MessageSink};
pub use recovery::with_recovery;
pub use registry::{AllowedCallers, ServiceEntry, ServiceRegistry, WILDCARD};

/// Caller id used by operator-level calls (the control surface).
pub const CONTROL_CALLER: &str = "ControlSurface";

/// Weak back-reference handed to kernel-aware managers.
#[derive(Debug, Clone)]
pub struct KernelHandle(Weak<Kernel>);

impl KernelHandle {
    /// `None` once the kernel has been dropped.
    pub fn upgrade(&self) -> Option<Arc<Kernel>> {
        self.0.upgrade()
    }
}

/// Typed handles to the managers every kernel ships with.
#[derive(Debug, Clone)]
pub struct CoreManagers {
    pub queue: Arc<QueueManager>,
    pub dispatcher: Arc<MsgManager>,
}

/// Registration phase of a kernel.
#[derive(Debug)]
pub struct KernelBuilder {
    config: KernelConfig,
    registry: ServiceRegistry,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            registry: ServiceRegistry::new(),
        }
    }

    /// Builder pre-loaded with the queue and dispatch managers, both open to
    /// every caller.
    pub fn with_core_managers(
        config: &Config,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, CoreManagers)> {
        let queue = Arc::new(QueueManager::new(transport, config.queue.clone()));
        let dispatcher = Arc::new(MsgManager::new(config.dispatch.clone()));

        let mut builder = Self::new(config.kernel.clone());
        builder
            .register(QUEUE_MANAGER, queue.clone())?
            .register(MSG_MANAGER, dispatcher.clone())?;

        Ok((builder, CoreManagers { queue, dispatcher }))
    }

    /// Register a manager open to every caller.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        manager: Arc<dyn Manager>,
    ) -> Result<&mut Self> {
        self.register_with_callers(name, manager, AllowedCallers::Any)
    }

    /// Register a manager restricted to `allowed_callers`.
    ///
    /// Empty or duplicate names fail with a registration error.
    pub fn register_with_callers(
        &mut self,
        name: impl Into<String>,
        manager: Arc<dyn Manager>,
        allowed_callers: AllowedCallers,
    ) -> Result<&mut Self> {
        let name = name.into();
        self.registry
            .register(name.clone(), manager, allowed_callers)
            .map_err(|e| {
                tracing::error!(service = %name, error = %e, "service_registration_failed");
                e
            })?;
        tracing::info!(service = %name, "service_registered");
        Ok(self)
    }

    /// Freeze the registry and hand kernel-aware managers their back-reference.
    pub fn build(self) -> Arc<Kernel> {
        let KernelBuilder { config, registry } = self;
        Arc::new_cyclic(|weak| {
            for entry in registry.entries() {
                if let Some(aware) = entry.manager.as_kernel_aware() {
                    aware.attach_kernel(KernelHandle(weak.clone()));
                    tracing::info!(service = %entry.name, "kernel_reference_attached");
                }
            }
            Kernel {
                config,
                registry,
                state: RwLock::new(KernelState::Stopped),
                last_failures: RwLock::new(None),
                lifecycle_lock: tokio::sync::Mutex::new(()),
            }
        })
    }
}

/// Failures of one lifecycle phase, kept for health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleFailures {
    pub phase: LifecyclePhase,
    pub failures: Vec<ManagerFailure>,
}

/// The supervisory core.
#[derive(Debug)]
pub struct Kernel {
    config: KernelConfig,
    registry: ServiceRegistry,
    state: RwLock<KernelState>,
    /// Failures from the last failed start or close, surfaced through health.
    last_failures: RwLock<Option<LifecycleFailures>>,
    /// Serializes start/close.
    lifecycle_lock: tokio::sync::Mutex<()>,
}

impl Kernel {
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> KernelState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Failures of the most recent start or close, until a start succeeds.
    pub fn last_failures(&self) -> Option<LifecycleFailures> {
        self.last_failures.read().clone()
    }

    fn remember_failures(&self, phase: LifecyclePhase, failures: &[ManagerFailure]) {
        *self.last_failures.write() = Some(LifecycleFailures {
            phase,
            failures: failures.to_vec(),
        });
    }

    fn set_state(&self, next: KernelState) {
        let mut state = self.state.write();
        let prev = *state;
        tracing::debug!(from = %prev, to = %next, "kernel_state_transition");
        *state = next;
    }

    // =========================================================================
    // Service lookup
    // =========================================================================

    /// Retrieve a service on behalf of `caller` (the caller's logical name).
    pub fn get_service(&self, name: &str, caller: &str) -> Result<Arc<dyn Manager>> {
        self.registry.lookup(name, caller).map_err(|e| {
            tracing::error!(service = name, caller, error = %e, "service_lookup_failed");
            e
        })
    }

    /// Counter snapshot of one service.
    pub fn service_stats(&self, name: &str) -> Result<Value> {
        self.get_service(name, CONTROL_CALLER)?
            .stats()
            .ok_or_else(|| Error::service_not_found(format!("{} exposes no statistics", name)))
    }

    fn managers(&self) -> Vec<(String, Arc<dyn Manager>)> {
        self.registry
            .entries()
            .iter()
            .map(|e| (e.name.clone(), e.manager.clone()))
            .collect()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start every registered manager concurrently.
    ///
    /// A running kernel logs a warning and does nothing. If any manager fails
    /// or times out the kernel becomes Degraded and the failures are returned
    /// together.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle_lock.lock().await;

        if self.is_running() {
            tracing::warn!(kernel = %self.name(), "Kernel is already running. Skipping start.");
            return Ok(());
        }

        self.set_state(KernelState::Starting);
        tracing::info!(
            kernel = %self.name(),
            managers = self.registry.len(),
            "starting all registered services"
        );

        let failures = lifecycle::fan_out(
            self.managers(),
            LifecyclePhase::Start,
            self.config.start_timeout,
        )
        .await;

        if failures.is_empty() {
            *self.last_failures.write() = None;
            self.set_state(KernelState::Running);
            tracing::info!(kernel = %self.name(), "kernel_running");
            Ok(())
        } else {
            self.remember_failures(LifecyclePhase::Start, &failures);
            self.set_state(KernelState::Degraded);
            tracing::error!(
                kernel = %self.name(),
                failed = failures.len(),
                "kernel_degraded"
            );
            Err(Error::lifecycle(LifecyclePhase::Start, failures))
        }
    }

    /// Close every registered manager concurrently.
    ///
    /// Every manager gets a close attempt even if others fail; the kernel
    /// always ends up Stopped. A stopped kernel logs a warning and does nothing.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle_lock.lock().await;

        if self.state() == KernelState::Stopped {
            tracing::warn!(kernel = %self.name(), "Kernel is not running. Skipping close.");
            return Ok(());
        }

        self.set_state(KernelState::Stopping);
        tracing::info!(kernel = %self.name(), "stopping all registered services");

        let failures = lifecycle::fan_out(
            self.managers(),
            LifecyclePhase::Close,
            self.config.close_timeout,
        )
        .await;

        self.set_state(KernelState::Stopped);

        if failures.is_empty() {
            *self.last_failures.write() = None;
            tracing::info!(kernel = %self.name(), "kernel_stopped");
            Ok(())
        } else {
            tracing::error!(
                kernel = %self.name(),
                failed = failures.len(),
                "kernel_stopped_with_failures"
            );
            self.remember_failures(LifecyclePhase::Close, &failures);
            Err(Error::lifecycle(LifecyclePhase::Close, failures))
        }
    }

    /// Start a single service (operator action). Does not change kernel state.
    pub async fn start_service(&self, name: &str) -> Result<()> {
        let manager = self.get_service(name, CONTROL_CALLER)?;
        lifecycle::run_phase(manager, LifecyclePhase::Start, self.config.start_timeout)
            .await
            .map_err(|reason| {
                Error::lifecycle(LifecyclePhase::Start, vec![ManagerFailure::new(name, reason)])
            })?;
        tracing::info!(service = name, "service_started");
        Ok(())
    }

    /// Close a single service (operator action). Does not change kernel state.
    pub async fn close_service(&self, name: &str) -> Result<()> {
        let manager = self.get_service(name, CONTROL_CALLER)?;
        lifecycle::run_phase(manager, LifecyclePhase::Close, self.config.close_timeout)
            .await
            .map_err(|reason| {
                Error::lifecycle(LifecyclePhase::Close, vec![ManagerFailure::new(name, reason)])
            })?;
        tracing::info!(service = name, "service_stopped");
        Ok(())
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Aggregate health: OK only if the kernel is running and every manager is OK.
    pub fn get_health(&self) -> HealthReport {
        let state = self.state();
        let mut report = HealthReport::ok(self.name())
            .with_detail(format!("{} is {}", self.name(), state));

        if !state.is_running() {
            report = report.combine(
                HealthReport::new(self.name(), Status::Warning)
                    .with_detail(format!("{} is not running", self.name())),
            );
        }

        if let Some(last) = self.last_failures() {
            report = report.combine(
                HealthReport::new(self.name(), Status::Error).with_details(
                    last.failures
                        .iter()
                        .map(|f| format!("{} failed: {}", last.phase, f)),
                ),
            );
        }

        for entry in self.registry.entries() {
            report = report.combine(probe_health(entry));
        }

        tracing::debug!(status = %report.status, "kernel_health_report");
        report
    }
}

fn probe_health(entry: &ServiceEntry) -> HealthReport {
    with_recovery(|| entry.manager.get_health(), "get_health").unwrap_or_else(|e| {
        HealthReport::error(&entry.name, format!("Error in health check for {}: {}", entry.name, e))
    })
}
