//! Worker pool.
//!
//! Every worker pulls jobs from the shared job channel until it is closed
//! and drained, fetches the object, counts its words and sends exactly one
//! [`JobResult`] per job to the collector. Failures become failed results;
//! no job is dropped.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::job::{Job, JobResult, Word};
use crate::queue::MessageQueue;
use crate::storage::BlobStore;
use crate::wordcount::{self, TOP_WORDS};

/// Receiving end of the job channel, shared by every worker.
pub type JobSource = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Worker count used when none is configured.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A set of running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers. The pool takes ownership of `results`; the
    /// result channel closes once every worker has exited.
    pub fn start(
        size: usize,
        jobs: JobSource,
        results: mpsc::Sender<JobResult>,
        store: Arc<dyn BlobStore>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        tracing::info!(workers = size, "starting worker pool");

        let handles = (0..size)
            .map(|id| {
                let worker = Worker {
                    id,
                    jobs: jobs.clone(),
                    results: results.clone(),
                    store: store.clone(),
                    queue: queue.clone(),
                    top: TOP_WORDS,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits until every worker has seen the job channel closed and
    /// returned.
    pub async fn wait_until_done(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task aborted");
            }
        }
        tracing::info!("all workers done");
    }
}

struct Worker {
    id: usize,
    jobs: JobSource,
    results: mpsc::Sender<JobResult>,
    store: Arc<dyn BlobStore>,
    queue: Arc<dyn MessageQueue>,
    top: usize,
}

impl Worker {
    async fn run(self) {
        tracing::info!(worker = self.id, "worker starting");

        while let Some(mut job) = self.next_job().await {
            tracing::info!(worker = self.id, message_id = %job.message_id(), location = %job.location, "received job");

            let result = match self.process(&mut job).await {
                Ok(words) => JobResult::success(job, words),
                Err(e) => {
                    tracing::warn!(worker = self.id, message_id = %job.message_id(), error = %e, "failed to process job");
                    JobResult::failure(job, e.to_string())
                }
            };

            if self.results.send(result).await.is_err() {
                tracing::error!(worker = self.id, "result channel closed, dropping result");
                break;
            }
        }

        tracing::info!(worker = self.id, "worker quitting");
    }

    async fn next_job(&self) -> Option<Job> {
        self.jobs.lock().await.recv().await
    }

    async fn process(&self, job: &mut Job) -> Result<Vec<Word>, JobError> {
        let body = self.store.get(&job.location).await?;
        wordcount::count_top_words(body, job, self.queue.as_ref(), self.top).await
    }
}
