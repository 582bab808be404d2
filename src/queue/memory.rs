use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use super::MessageQueue;
use crate::error::QueueError;
use crate::job::RawMessage;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Entry {
    id: String,
    body: String,
    receipt: Option<String>,
    visible_at: Instant,
    receive_count: u32,
}

/// In-process queue with SQS-like lease semantics.
///
/// A received message stays invisible until its lease runs out, then it is
/// handed out again under a fresh receipt. Old receipts stop working for
/// lease extension once the message has been redelivered. Failures can be
/// injected per operation.
#[derive(Debug)]
pub struct InMemoryQueue {
    lease: Duration,
    max_batch: usize,
    entries: Mutex<Vec<Entry>>,
    fail_receives: AtomicUsize,
    fail_extends: AtomicUsize,
    fail_deletes: AtomicUsize,
    fail_sends: AtomicUsize,
    deletes: AtomicUsize,
    extends: AtomicUsize,
}

impl InMemoryQueue {
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            max_batch: 10,
            entries: Mutex::new(Vec::new()),
            fail_receives: AtomicUsize::new(0),
            fail_extends: AtomicUsize::new(0),
            fail_deletes: AtomicUsize::new(0),
            fail_sends: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            extends: AtomicUsize::new(0),
        }
    }

    /// Limits how many messages a single receive hands out.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Enqueues a message and returns its id.
    pub fn push(&self, body: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock().push(Entry {
            id: id.clone(),
            body: body.into(),
            receipt: None,
            visible_at: Instant::now(),
            receive_count: 0,
        });
        id
    }

    /// Messages still in the queue, visible or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|e| e.id == id)
    }

    /// Bodies of every message still in the queue, in arrival order.
    pub fn bodies(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.body.clone()).collect()
    }

    /// How many times the message with `id` has been delivered.
    pub fn receive_count(&self, id: &str) -> Option<u32> {
        self.lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.receive_count)
    }

    /// Successful deletes that actually removed a message.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Successful lease extensions.
    pub fn extend_count(&self) -> usize {
        self.extends.load(Ordering::SeqCst)
    }

    pub fn fail_next_receives(&self, n: usize) {
        self.fail_receives.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_extends(&self, n: usize) {
        self.fail_extends.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.fail_sends.store(n, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_failure(counter: &AtomicUsize, op: &str) -> Result<(), QueueError> {
        let injected = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(QueueError::Transient(format!("injected {op} failure")));
        }
        Ok(())
    }

    fn take_visible(&self) -> Vec<RawMessage> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries
            .iter_mut()
            .filter(|e| e.visible_at <= now)
            .take(self.max_batch)
            .map(|e| {
                let receipt = Uuid::new_v4().to_string();
                e.receipt = Some(receipt.clone());
                e.visible_at = now + self.lease;
                e.receive_count += 1;
                RawMessage {
                    id: e.id.clone(),
                    receipt,
                    body: e.body.clone(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn lease(&self) -> Duration {
        self.lease
    }

    async fn receive(&self, max_wait: Duration) -> Result<Vec<RawMessage>, QueueError> {
        Self::take_failure(&self.fail_receives, "receive")?;

        let deadline = Instant::now() + max_wait;
        loop {
            let messages = self.take_visible();
            if !messages.is_empty() || Instant::now() >= deadline {
                return Ok(messages);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())))
                .await;
        }
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        Self::take_failure(&self.fail_deletes, "delete")?;

        let mut entries = self.lock();
        if let Some(pos) = entries
            .iter()
            .position(|e| e.receipt.as_deref() == Some(receipt))
        {
            entries.remove(pos);
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn extend_lease(
        &self,
        receipt: &str,
        duration: Duration,
    ) -> Result<Duration, QueueError> {
        Self::take_failure(&self.fail_extends, "extend")?;

        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::Transient("receipt handle is invalid".into()))?;
        entry.visible_at = Instant::now() + duration;
        self.extends.fetch_add(1, Ordering::SeqCst);
        Ok(duration)
    }

    async fn send(&self, body: String) -> Result<(), QueueError> {
        Self::take_failure(&self.fail_sends, "send")?;
        self.push(body);
        Ok(())
    }
}
