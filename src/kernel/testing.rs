//! Scriptable manager used by kernel unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::Manager;
use crate::health::HealthReport;
use crate::types::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubBehavior {
    Normal,
    FailStart(String),
    PanicStart,
    HangStart,
    FailClose(String),
    PanicHealth,
}

#[derive(Debug)]
pub struct StubManager {
    name: String,
    behavior: StubBehavior,
    running: AtomicBool,
    pub start_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl StubManager {
    pub fn new(name: &str, behavior: StubBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            running: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn arc(name: &str) -> Arc<dyn Manager> {
        Arc::new(Self::new(name, StubBehavior::Normal))
    }

    pub fn with_behavior(name: &str, behavior: StubBehavior) -> Arc<dyn Manager> {
        Arc::new(Self::new(name, behavior))
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Manager for StubManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::FailStart(reason) => Err(Error::internal(reason.clone())),
            StubBehavior::PanicStart => panic!("{} exploded during start", self.name),
            StubBehavior::HangStart => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => {
                self.running.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::FailClose(reason) => Err(Error::internal(reason.clone())),
            _ => Ok(()),
        }
    }

    fn get_health(&self) -> HealthReport {
        if self.behavior == StubBehavior::PanicHealth {
            panic!("{} health probe exploded", self.name);
        }
        HealthReport::running_or_not(&self.name, self.running.load(Ordering::SeqCst))
    }
}
