//! Upload client: stores a local file and waits for its job result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StorageError;
use crate::job::Location;
use crate::notifier::ResultMessage;
use crate::queue::MessageQueue;
use crate::storage::BlobStore;

/// Long poll used while waiting on the result queue.
pub const RESULT_WAIT: Duration = Duration::from_secs(20);
/// Pause after a failed result queue receive.
pub const RESULT_BACKOFF: Duration = Duration::from_secs(30);

pub struct Uploader {
    region: String,
    store: Arc<dyn BlobStore>,
    results: Option<Arc<dyn MessageQueue>>,
    receive_wait: Duration,
    backoff: Duration,
}

impl Uploader {
    pub fn new(region: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            region: region.into(),
            store,
            results: None,
            receive_wait: RESULT_WAIT,
            backoff: RESULT_BACKOFF,
        }
    }

    /// Enables [`wait_for_result`](Self::wait_for_result) on `queue`.
    pub fn with_results(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.results = Some(queue);
        self
    }

    pub fn with_timing(mut self, receive_wait: Duration, backoff: Duration) -> Self {
        self.receive_wait = receive_wait;
        self.backoff = backoff;
        self
    }

    /// Uploads `path` to `bucket` under the file's base name.
    pub async fn upload(&self, bucket: &str, path: &Path) -> Result<Location, StorageError> {
        let key = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::Upload(format!("invalid file name: {}", path.display())))?;
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::Upload(format!("{}: {e}", path.display())))?;

        let location = Location::new(self.region.clone(), bucket, key);
        self.store.put(&location, body).await?;
        tracing::info!(%location, "uploaded file");
        Ok(location)
    }

    /// Polls the result queue until a result for `bucket`/`key` shows up.
    ///
    /// Results for other objects and unparseable messages are left in the
    /// queue. The matching message is deleted before returning. Returns
    /// `None` when no result queue is configured.
    pub async fn wait_for_result(&self, bucket: &str, key: &str) -> Option<ResultMessage> {
        let queue = self.results.as_ref()?;

        loop {
            let messages = match queue.receive(self.receive_wait).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to receive job result, retrying");
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            };

            for message in messages {
                let result: ResultMessage = match serde_json::from_str(&message.body) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::debug!(message_id = %message.id, error = %e, "skipping unparseable result");
                        continue;
                    }
                };
                if !result.is_for(bucket, key) {
                    continue;
                }

                if let Err(e) = queue.delete(&message.receipt).await {
                    tracing::warn!(message_id = %message.id, error = %e, "failed to delete result message");
                }
                return Some(result);
            }
        }
    }
}
