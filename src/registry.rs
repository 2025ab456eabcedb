//! Process-wide registry of interface names held by live channels.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, PoisonError};

fn names() -> &'static Mutex<HashSet<String>> {
    static NAMES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    NAMES.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive claim on an interface name. Dropping the lease frees the name.
#[derive(Debug)]
pub struct NameLease {
    name: String,
}

impl NameLease {
    /// Claim `name`, or return `None` if a live channel already holds it.
    pub fn acquire(name: &str) -> Option<Self> {
        let mut held = names().lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(name.to_string()) {
            return None;
        }
        tracing::debug!(name, "leased interface name");
        Some(Self {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held(name: &str) -> bool {
        names()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}

impl Drop for NameLease {
    fn drop(&mut self) {
        names()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        tracing::debug!(name = %self.name, "released interface name");
    }
}
