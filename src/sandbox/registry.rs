//! Which submission owns which sandbox.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// Concurrent map of submission id to sandbox id.
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    active: RwLock<HashMap<String, String>>,
}

impl SandboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sandbox_id` as owned by `submission_id` until the returned
    /// lease is dropped.
    pub fn lease(
        self: &Arc<Self>,
        submission_id: impl Into<String>,
        sandbox_id: impl Into<String>,
    ) -> SandboxLease {
        let submission_id = submission_id.into();
        let sandbox_id = sandbox_id.into();
        debug!(submission_id = %submission_id, sandbox_id = %sandbox_id, "Sandbox leased");
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(submission_id.clone(), sandbox_id);
        SandboxLease {
            registry: Arc::clone(self),
            submission_id,
        }
    }

    /// Sandbox currently owned by `submission_id`.
    pub fn sandbox_for(&self, submission_id: &str) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(submission_id)
            .cloned()
    }

    /// Number of sandboxes in use.
    pub fn active_count(&self) -> usize {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, submission_id: &str) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(submission_id);
        debug!(submission_id = submission_id, "Sandbox released");
    }
}

/// Ownership record for one sandbox. Released on drop.
#[derive(Debug)]
pub struct SandboxLease {
    registry: Arc<SandboxRegistry>,
    submission_id: String,
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        self.registry.release(&self.submission_id);
    }
}
