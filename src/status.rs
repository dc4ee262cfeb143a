use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Latest observed state of a run. Durable truth lives in the repository;
/// this mirror exists so observers can poll without touching the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub status: String,
    pub progress: u8,
    pub error: Option<String>,
}

/// In-memory map of runs and their progress. Written by the run coordinator,
/// read by any number of external observers. Entries are retained for the
/// lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    inner: Arc<RwLock<HashMap<String, RunState>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        StatusRegistry::default()
    }

    /// Record the latest state. Progress is clamped to be non-decreasing
    /// within a run.
    pub fn publish(&self, run_id: &str, status: &str, progress: u8, error: Option<String>) {
        let mut inner = self.inner.write().expect("status registry lock poisoned");
        let previous = inner.get(run_id).map(|state| state.progress).unwrap_or(0);
        inner.insert(
            run_id.to_string(),
            RunState {
                status: status.to_string(),
                progress: progress.max(previous),
                error,
            },
        );
    }

    pub fn get(&self, run_id: &str) -> Option<RunState> {
        self.inner
            .read()
            .expect("status registry lock poisoned")
            .get(run_id)
            .cloned()
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.inner
            .read()
            .expect("status registry lock poisoned")
            .contains_key(run_id)
    }
}
