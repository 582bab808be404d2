use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{ResultRecord, ResultRecorder};
use crate::error::RecordError;
use crate::job::JobResult;

/// Recorder that keeps items in a map. Writes can be made to fail.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    items: Mutex<HashMap<String, ResultRecord>>,
    fail_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn get(&self, filename: &str) -> Option<ResultRecord> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(filename)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful writes, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultRecorder for InMemoryRecorder {
    async fn record(&self, result: &JobResult) -> Result<(), RecordError> {
        let failing = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RecordError::Write("injected write failure".into()));
        }

        let record = ResultRecord::from(result);
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.filename.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
