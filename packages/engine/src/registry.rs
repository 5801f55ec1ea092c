use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use shoebox_core::types::ImportBatch;

/// A batch being processed. The engine task is the only writer; query
/// paths read snapshots.
pub struct LiveBatch {
    state: Mutex<ImportBatch>,
}

impl LiveBatch {
    pub fn new(batch: ImportBatch) -> Self {
        Self {
            state: Mutex::new(batch),
        }
    }

    pub fn snapshot(&self) -> ImportBatch {
        self.state.lock().expect("batch state poisoned").clone()
    }

    pub fn update<R>(&self, apply: impl FnOnce(&mut ImportBatch) -> R) -> R {
        let mut state = self.state.lock().expect("batch state poisoned");
        apply(&mut state)
    }
}

/// Process-wide map of in-flight batches. A batch appears here from INIT
/// until its terminal state is persisted, and the in-memory snapshot is
/// fresher than the stored document for as long as it is present.
#[derive(Default)]
pub struct BatchRegistry {
    inner: Mutex<HashMap<String, Arc<LiveBatch>>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, live: Arc<LiveBatch>) {
        let id = live.snapshot().id;
        self.inner
            .lock()
            .expect("batch registry poisoned")
            .insert(id, live);
    }

    pub fn get(&self, id: &str) -> Option<Arc<LiveBatch>> {
        self.inner
            .lock()
            .expect("batch registry poisoned")
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) {
        self.inner
            .lock()
            .expect("batch registry poisoned")
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("batch registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
