use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks one cooperative-cancellation flag per in-flight job id. Cleared
/// lazily — flags for finished jobs simply stop being read, rather than
/// being evicted eagerly, since a job map entry is dropped on job
/// completion anyway.
pub struct JobCanceler {
    flags: Arc<DashMap<String, Arc<AtomicBool>>>,
}

impl JobCanceler {
    pub fn new() -> Self {
        Self {
            flags: Arc::new(DashMap::with_capacity(10)),
        }
    }

    pub fn flag_for(&self, job_id: &str) -> Arc<AtomicBool> {
        self.flags
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub fn cancel(&self, job_id: &str) -> bool {
        match self.flags.get(job_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, job_id: &str) -> bool {
        self.flags
            .get(job_id)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn remove(&self, job_id: &str) {
        self.flags.remove(job_id);
    }
}

impl Default for JobCanceler {
    fn default() -> Self {
        Self::new()
    }
}
