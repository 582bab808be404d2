use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectorStats, ResultCollector};
use crate::notifier::ResultNotifier;
use crate::queue::{JobListener, MessageQueue, RECEIVE_BACKOFF};
use crate::recorder::ResultRecorder;
use crate::storage::BlobStore;
use crate::worker::{WorkerPool, default_worker_count};

/// Capacity of the listener -> workers channel.
pub const JOB_BUFFER: usize = 10;
/// Capacity of the workers -> collector channel.
pub const RESULT_BUFFER: usize = 10;

/// Tunables for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub worker_count: usize,
    pub receive_wait: Duration,
    pub receive_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            receive_wait: Duration::from_secs(20),
            receive_backoff: RECEIVE_BACKOFF,
        }
    }
}

/// Wires the listener, the worker pool and the collector together.
pub struct Pipeline {
    pub queue: Arc<dyn MessageQueue>,
    pub store: Arc<dyn BlobStore>,
    pub recorder: Arc<dyn ResultRecorder>,
    pub notifier: Arc<dyn ResultNotifier>,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Runs until `cancel` fires and everything in flight has drained.
    ///
    /// Shutdown happens in two phases: the listener stops receiving and
    /// closes the job channel, workers finish the jobs they hold and exit,
    /// which closes the result channel; the collector then drains the
    /// remaining results.
    pub async fn run(self, cancel: CancellationToken) -> CollectorStats {
        let (job_tx, job_rx) = mpsc::channel(JOB_BUFFER);
        let (result_tx, result_rx) = mpsc::channel(RESULT_BUFFER);

        let listener = JobListener::new(self.queue.clone(), self.settings.receive_wait)
            .with_backoff(self.settings.receive_backoff);
        let listening = tokio::spawn(listener.listen(cancel, job_tx));

        let workers = WorkerPool::start(
            self.settings.worker_count.max(1),
            Arc::new(Mutex::new(job_rx)),
            result_tx,
            self.store.clone(),
            self.queue.clone(),
        );

        let collector =
            ResultCollector::new(self.recorder.clone(), self.notifier.clone(), self.queue.clone())
                .start(result_rx);

        workers.wait_until_done().await;
        let stats = collector.wait_until_done().await;

        if let Err(e) = listening.await {
            tracing::error!(error = %e, "job listener task aborted");
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::notifier::{QueueNotifier, ResultMessage};
    use crate::queue::InMemoryQueue;
    use crate::recorder::InMemoryRecorder;
    use crate::storage::InMemoryStore;

    fn event(bucket: &str, keys: &[&str]) -> String {
        let records: Vec<_> = keys
            .iter()
            .map(|k| {
                serde_json::json!({
                    "awsRegion": "us-west-2",
                    "EventName": "ObjectCreated:Put",
                    "S3": {"Bucket": {"Name": bucket}, "Object": {"Key": k}}
                })
            })
            .collect();
        serde_json::json!({"Event": "ObjectCreated", "Records": records}).to_string()
    }

    struct Fixture {
        jobs: Arc<InMemoryQueue>,
        results: Arc<InMemoryQueue>,
        store: Arc<InMemoryStore>,
        recorder: Arc<InMemoryRecorder>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                jobs: Arc::new(InMemoryQueue::new(Duration::from_secs(60))),
                results: Arc::new(InMemoryQueue::new(Duration::ZERO)),
                store: Arc::new(InMemoryStore::new()),
                recorder: Arc::new(InMemoryRecorder::new()),
            }
        }

        fn pipeline(&self, workers: usize) -> Pipeline {
            Pipeline {
                queue: self.jobs.clone(),
                store: self.store.clone(),
                recorder: self.recorder.clone(),
                notifier: Arc::new(QueueNotifier::new(self.results.clone())),
                settings: PipelineSettings {
                    worker_count: workers,
                    receive_wait: Duration::from_millis(20),
                    receive_backoff: Duration::from_millis(10),
                },
            }
        }

        fn notifications(&self) -> Vec<ResultMessage> {
            self.results
                .bodies()
                .iter()
                .map(|b| serde_json::from_str(b).unwrap())
                .collect()
        }

        /// Runs the pipeline until `expected` notifications were published.
        async fn run_until(&self, workers: usize, expected: usize) -> CollectorStats {
            let cancel = CancellationToken::new();
            let run = tokio::spawn(self.pipeline(workers).run(cancel.clone()));
            while self.results.len() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
            run.await.unwrap()
        }
    }

    #[tokio::test]
    async fn processes_uploaded_file_end_to_end() {
        let f = Fixture::new();
        f.store.insert("b", "k.txt", "apple apple Banana! banana, cat");
        f.jobs.push(event("b", &["k.txt"]));

        let stats = f.run_until(2, 1).await;

        assert_eq!(stats.recorded, 1);
        assert_eq!(stats.deleted, 1);
        assert!(f.jobs.is_empty());
        let record = f.recorder.get("b/k.txt").unwrap();
        assert_eq!(record.words.len(), 2);
        assert_eq!(record.words.get("apple"), Some(&2));
        assert_eq!(record.words.get("banana"), Some(&2));

        let sent = f.notifications();
        assert_eq!(sent[0].status, JobStatus::Success);
        assert!(sent[0].is_for("b", "k.txt"));
    }

    #[tokio::test]
    async fn fetch_failure_leaves_message_queued() {
        let f = Fixture::new();
        let id = f.jobs.push(event("b", &["missing.txt"]));

        let stats = f.run_until(1, 1).await;

        assert_eq!(stats.failed, 1);
        assert!(f.jobs.contains(&id));
        let sent = f.notifications();
        assert_eq!(sent[0].status, JobStatus::Failure);
        assert!(sent[0].words.is_empty());
        assert!(!sent[0].status_message.is_empty());
    }

    #[tokio::test]
    async fn every_job_is_notified_once() {
        let f = Fixture::new();
        let mut expected = 0;
        for batch in 0..5 {
            let keys: Vec<String> = (0..3).map(|i| format!("{batch}-{i}.txt")).collect();
            for key in &keys {
                if !key.starts_with('4') {
                    f.store.insert("b", key, "gamma gamma delta epsilon");
                }
            }
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            f.jobs.push(event("b", &refs));
            expected += keys.len();
        }
        f.jobs.push("garbage");

        let stats = f.run_until(3, expected).await;

        assert_eq!(stats.received, expected);
        assert_eq!(stats.notified, expected);
        assert_eq!(stats.failed, 3);
        assert_eq!(f.recorder.len(), 12);

        let mut keys: Vec<String> = f.notifications().into_iter().map(|m| m.job.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), expected);
    }

    #[tokio::test]
    async fn cancel_with_empty_queue_shuts_down() {
        let f = Fixture::new();
        let cancel = CancellationToken::new();
        let run = tokio::spawn(f.pipeline(4).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline should drain promptly")
            .unwrap();
        assert_eq!(stats, CollectorStats::default());
    }

    #[tokio::test]
    async fn record_failure_keeps_message_for_retry() {
        let f = Fixture::new();
        f.store.insert("b", "k.txt", "apple apple");
        f.recorder.fail_next_writes(1);
        let id = f.jobs.push(event("b", &["k.txt"]));

        let stats = f.run_until(1, 1).await;

        assert_eq!(stats.failed, 1);
        assert!(f.jobs.contains(&id));
        assert!(f.recorder.is_empty());
        let sent = f.notifications();
        assert_eq!(sent[0].status, JobStatus::Failure);
        assert!(sent[0].status_message.starts_with("record results failed"));
    }
}
