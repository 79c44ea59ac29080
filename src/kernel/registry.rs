//! Service registry with caller-based access control.
//!
//! Maps a service name to its manager and the set of callers allowed to look
//! it up. Written only during the kernel's build phase; read-only afterwards.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::Manager;
use crate::types::{Error, Result};

/// Wildcard caller entry granting access to everyone.
pub const WILDCARD: &str = "*";

/// Callers permitted to retrieve a service.
///
/// Caller identity is the logical name of the requesting component, not an
/// instance identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AllowedCallers {
    #[default]
    Any,
    Only(BTreeSet<String>),
}

impl AllowedCallers {
    /// Build from a caller list; a `"*"` entry collapses the list to `Any`.
    pub fn from_list<I, S>(callers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = callers.into_iter().map(Into::into).collect();
        if set.contains(WILDCARD) {
            AllowedCallers::Any
        } else {
            AllowedCallers::Only(set)
        }
    }

    pub fn permits(&self, caller: &str) -> bool {
        match self {
            AllowedCallers::Any => true,
            AllowedCallers::Only(set) => set.contains(caller),
        }
    }
}

/// One registered service.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub name: String,
    pub manager: Arc<dyn Manager>,
    pub allowed_callers: AllowedCallers,
}

/// Name → (manager, allowed callers), in registration order.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
    index: HashMap<String, usize>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Empty and duplicate names are rejected.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        manager: Arc<dyn Manager>,
        allowed_callers: AllowedCallers,
    ) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::registration("service name cannot be empty"));
        }
        if self.index.contains_key(&name) {
            return Err(Error::registration(format!(
                "service '{}' is already registered",
                name
            )));
        }

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(ServiceEntry {
            name,
            manager,
            allowed_callers,
        });
        Ok(())
    }

    /// Look up a service on behalf of `caller`.
    pub fn lookup(&self, name: &str, caller: &str) -> Result<Arc<dyn Manager>> {
        let entry = self
            .index
            .get(name)
            .and_then(|idx| self.entries.get(*idx))
            .ok_or_else(|| Error::service_not_found(name))?;

        if !entry.allowed_callers.permits(caller) {
            return Err(Error::access_denied(name, caller));
        }
        Ok(entry.manager.clone())
    }

    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
