//! Result collection and acknowledgement.
//!
//! The collector is the single consumer of the result channel. For each
//! result it:
//!
//! 1. records successful results durably, demoting the result to a failure
//!    if the write fails,
//! 2. deletes the originating queue message only after a successful write,
//!    so any failure leaves the message to be redelivered and retried,
//! 3. always publishes a status notification.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::job::JobResult;
use crate::notifier::ResultNotifier;
use crate::queue::MessageQueue;
use crate::recorder::ResultRecorder;

/// What the collector did with the results it drained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub received: usize,
    pub recorded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub notified: usize,
}

pub struct ResultCollector {
    recorder: Arc<dyn ResultRecorder>,
    notifier: Arc<dyn ResultNotifier>,
    queue: Arc<dyn MessageQueue>,
}

/// Handle to a running collector.
pub struct CollectorHandle {
    handle: JoinHandle<CollectorStats>,
}

impl CollectorHandle {
    /// Waits until the result channel is closed and fully drained.
    pub async fn wait_until_done(self) -> CollectorStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "result collector task aborted");
                CollectorStats::default()
            }
        }
    }
}

impl ResultCollector {
    pub fn new(
        recorder: Arc<dyn ResultRecorder>,
        notifier: Arc<dyn ResultNotifier>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            recorder,
            notifier,
            queue,
        }
    }

    /// Spawns the collector loop on its own task.
    pub fn start(self, results: mpsc::Receiver<JobResult>) -> CollectorHandle {
        CollectorHandle {
            handle: tokio::spawn(self.run(results)),
        }
    }

    /// Drains `results` until the channel is closed.
    pub async fn run(self, mut results: mpsc::Receiver<JobResult>) -> CollectorStats {
        tracing::info!("job result collector starting");
        let mut stats = CollectorStats::default();

        while let Some(result) = results.recv().await {
            self.process(result, &mut stats).await;
        }

        tracing::info!(?stats, "job result collector quitting");
        stats
    }

    /// Handles one result and returns it as it was notified.
    pub async fn process(&self, mut result: JobResult, stats: &mut CollectorStats) -> JobResult {
        let message = result.job.origin.clone();
        stats.received += 1;
        tracing::info!(message_id = %message.id, status = %result.status, "received job result");

        if result.is_success() {
            match self.recorder.record(&result).await {
                Ok(()) => {
                    stats.recorded += 1;
                    match self.queue.delete(&message.receipt).await {
                        Ok(()) => {
                            stats.deleted += 1;
                            tracing::info!(message_id = %message.id, "deleted message");
                        }
                        Err(e) => {
                            tracing::warn!(message_id = %message.id, error = %e, "failed to delete message");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(message_id = %message.id, error = %e, "failed to record result");
                    result.demote(format!("record results failed, {e}"));
                }
            }
        }

        if !result.is_success() {
            stats.failed += 1;
            tracing::warn!(message_id = %message.id, reason = %result.status_message, "job failed, leaving message for redelivery");
        }

        match self.notifier.notify(&result).await {
            Ok(()) => stats.notified += 1,
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "failed to send result notification");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::job::{Job, JobStatus, Location, RawMessage, Word};
    use crate::notifier::{QueueNotifier, ResultMessage};
    use crate::queue::InMemoryQueue;
    use crate::recorder::InMemoryRecorder;

    struct Fixture {
        jobs: Arc<InMemoryQueue>,
        results: Arc<InMemoryQueue>,
        recorder: Arc<InMemoryRecorder>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                jobs: Arc::new(InMemoryQueue::new(Duration::from_secs(60))),
                results: Arc::new(InMemoryQueue::new(Duration::ZERO)),
                recorder: Arc::new(InMemoryRecorder::new()),
            }
        }

        fn collector(&self) -> ResultCollector {
            ResultCollector::new(
                self.recorder.clone(),
                Arc::new(QueueNotifier::new(self.results.clone())),
                self.jobs.clone(),
            )
        }

        /// Enqueues and receives a message so the job holds a live receipt.
        async fn job(&self, key: &str) -> (String, Job) {
            let id = self.jobs.push("{}");
            let message: RawMessage = self
                .jobs
                .receive(Duration::ZERO)
                .await
                .unwrap()
                .into_iter()
                .find(|m| m.id == id)
                .unwrap();
            (id, Job::new(message, Location::new("us-west-2", "b", key), 60))
        }

        fn notifications(&self) -> Vec<ResultMessage> {
            self.results
                .bodies()
                .iter()
                .map(|b| serde_json::from_str(b).unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn success_is_recorded_deleted_and_notified() {
        let f = Fixture::new();
        let (id, job) = f.job("k.txt").await;
        let mut stats = CollectorStats::default();

        let result = JobResult::success(job, vec![Word::new("apple", 2)]);
        let notified = f.collector().process(result, &mut stats).await;

        assert_eq!(notified.status, JobStatus::Success);
        assert_eq!(f.recorder.get("b/k.txt").unwrap().words.get("apple"), Some(&2));
        assert!(!f.jobs.contains(&id));
        assert_eq!(f.jobs.delete_count(), 1);

        let sent = f.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, JobStatus::Success);
        assert_eq!(
            stats,
            CollectorStats {
                received: 1,
                recorded: 1,
                failed: 0,
                deleted: 1,
                notified: 1
            }
        );
    }

    #[tokio::test]
    async fn record_failure_demotes_and_keeps_message() {
        let f = Fixture::new();
        f.recorder.fail_next_writes(1);
        let (id, job) = f.job("k.txt").await;
        let mut stats = CollectorStats::default();

        let result = JobResult::success(job, vec![Word::new("apple", 2)]);
        let notified = f.collector().process(result, &mut stats).await;

        assert_eq!(notified.status, JobStatus::Failure);
        assert!(notified.status_message.starts_with("record results failed"));
        assert!(f.jobs.contains(&id));
        assert_eq!(f.jobs.delete_count(), 0);

        let sent = f.notifications();
        assert_eq!(sent[0].status, JobStatus::Failure);
        assert_eq!(sent[0].status_message, notified.status_message);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.recorded, 0);
    }

    #[tokio::test]
    async fn failed_result_is_not_recorded_or_deleted() {
        let f = Fixture::new();
        let (id, job) = f.job("missing.txt").await;
        let mut stats = CollectorStats::default();

        let result = JobResult::failure(job, "object not found: b/missing.txt");
        f.collector().process(result, &mut stats).await;

        assert!(f.recorder.is_empty());
        assert!(f.jobs.contains(&id));
        let sent = f.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, JobStatus::Failure);
        assert!(sent[0].words.is_empty());
        assert!(!sent[0].status_message.is_empty());
    }

    #[tokio::test]
    async fn delete_failure_is_not_fatal() {
        let f = Fixture::new();
        f.jobs.fail_next_deletes(1);
        let (id, job) = f.job("k.txt").await;
        let mut stats = CollectorStats::default();

        let notified = f
            .collector()
            .process(JobResult::success(job, vec![]), &mut stats)
            .await;

        assert_eq!(notified.status, JobStatus::Success);
        assert!(f.jobs.contains(&id));
        assert_eq!(stats.recorded, 1);
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.notified, 1);
    }

    #[tokio::test]
    async fn notify_failure_is_not_fatal() {
        let f = Fixture::new();
        f.results.fail_next_sends(1);
        let (first_id, first) = f.job("one.txt").await;
        let (_, second) = f.job("two.txt").await;

        let (tx, rx) = mpsc::channel(10);
        let handle = f.collector().start(rx);
        tx.send(JobResult::success(first, vec![])).await.unwrap();
        tx.send(JobResult::success(second, vec![])).await.unwrap();
        drop(tx);

        let stats = handle.wait_until_done().await;
        assert_eq!(stats.received, 2);
        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.notified, 1);
        assert!(!f.jobs.contains(&first_id));
        assert_eq!(f.notifications().len(), 1);
    }

    #[tokio::test]
    async fn redelivered_success_is_deleted_once() {
        let f = Fixture::new();
        let (id, job) = f.job("k.txt").await;
        let duplicate = job.clone();
        let mut stats = CollectorStats::default();
        let collector = f.collector();

        collector
            .process(JobResult::success(job, vec![Word::new("apple", 1)]), &mut stats)
            .await;
        collector
            .process(JobResult::success(duplicate, vec![Word::new("apple", 1)]), &mut stats)
            .await;

        assert!(!f.jobs.contains(&id));
        assert_eq!(f.jobs.delete_count(), 1);
        assert_eq!(f.recorder.len(), 1);
        assert_eq!(stats.notified, 2);
    }
}
