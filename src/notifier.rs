//! Status notifications for processed jobs.
//!
//! Every result, successful or not, is published as a JSON [`ResultMessage`]
//! on the result queue, where upload clients poll for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::NotifyError;
use crate::job::{JobResult, JobStatus, Word};
use crate::queue::MessageQueue;

/// The job part of a result message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSummary {
    pub started_at: DateTime<Utc>,
    pub region: String,
    pub bucket: String,
    pub key: String,
}

/// Wire form of a [`JobResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultMessage {
    pub job: JobSummary,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub words: Vec<Word>,
    /// Processing time in nanoseconds.
    pub duration: u64,
    pub status: JobStatus,
    #[serde(default)]
    pub status_message: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Word>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Word>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ResultMessage {
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration)
    }

    /// True if this result is for the object at `bucket`/`key`.
    pub fn is_for(&self, bucket: &str, key: &str) -> bool {
        self.job.bucket == bucket && self.job.key == key
    }
}

impl From<&JobResult> for ResultMessage {
    fn from(result: &JobResult) -> Self {
        let location = &result.job.location;
        Self {
            job: JobSummary {
                started_at: result.job.started_at,
                region: location.region.clone(),
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            },
            words: result.words.clone(),
            duration: u64::try_from(result.duration.as_nanos()).unwrap_or(u64::MAX),
            status: result.status,
            status_message: result.status_message.clone(),
        }
    }
}

#[async_trait]
pub trait ResultNotifier: Send + Sync {
    async fn notify(&self, result: &JobResult) -> Result<(), NotifyError>;
}

/// Publishes results as messages on a queue.
pub struct QueueNotifier {
    queue: Arc<dyn MessageQueue>,
}

impl QueueNotifier {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl ResultNotifier for QueueNotifier {
    async fn notify(&self, result: &JobResult) -> Result<(), NotifyError> {
        let body = serde_json::to_string(&ResultMessage::from(result))?;
        self.queue.send(body).await?;
        Ok(())
    }
}
