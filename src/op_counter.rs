use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Registry of per-reader progress counters. Idle detection compares the total
/// across two polls.
pub struct OpCounter {
    counters: Mutex<Vec<Arc<AtomicU64>>>,
}

impl OpCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counters: Mutex::new(Vec::new()),
        })
    }

    pub fn new_counter(&self) -> Arc<AtomicU64> {
        let counter = Arc::new(AtomicU64::new(0));
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(counter.clone());
        counter
    }

    pub fn total_op_count(&self) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }
}
