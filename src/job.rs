use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One delivery of a message from the durable queue.
///
/// The receipt token is the only capability needed to delete the message or
/// extend its lease. It changes on every delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: String,
    pub receipt: String,
    pub body: String,
}

/// Where the content of a job lives in blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

impl Location {
    pub fn new(region: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `<bucket>/<key>`, the unique identifier of a recorded result.
    pub fn filename(&self) -> String {
        format!(
            "{}/{}",
            self.bucket.trim_end_matches('/'),
            self.key.trim_start_matches('/')
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.filename(), self.region)
    }
}

/// A single unit of work: one object to fetch and analyze.
#[derive(Debug, Clone)]
pub struct Job {
    pub started_at: DateTime<Utc>,
    /// Cumulative lease held on the originating message, in seconds.
    /// Only ever grows.
    pub lease_seconds: u64,
    pub origin: RawMessage,
    pub location: Location,
}

impl Job {
    pub fn new(origin: RawMessage, location: Location, lease_seconds: u64) -> Self {
        Self {
            started_at: Utc::now(),
            lease_seconds,
            origin,
            location,
        }
    }

    /// Id of the queue message this job was decoded from.
    pub fn message_id(&self) -> &str {
        &self.origin.id
    }

    /// Wall-clock time since the job was decoded. Zero if the clock went
    /// backwards.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// True once more than half of the tracked lease has been used up.
    pub fn lease_half_spent(&self) -> bool {
        self.elapsed() > Duration::from_millis(self.lease_seconds * 500)
    }

    /// Records a successful lease extension.
    pub fn extend_lease(&mut self, added: Duration) {
        self.lease_seconds += added.as_secs();
    }
}

/// Final status of a processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failure,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failure => write!(f, "failure"),
        }
    }
}

/// A word and how many times it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    #[serde(rename = "Word")]
    pub text: String,
    #[serde(rename = "Count")]
    pub count: u64,
}

impl Word {
    pub fn new(text: impl Into<String>, count: u64) -> Self {
        Self {
            text: text.into(),
            count,
        }
    }
}

/// The outcome of processing one job. Produced exactly once per job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job: Job,
    pub words: Vec<Word>,
    pub duration: Duration,
    pub status: JobStatus,
    pub status_message: String,
}

impl JobResult {
    pub fn success(job: Job, words: Vec<Word>) -> Self {
        let duration = job.elapsed();
        Self {
            job,
            words,
            duration,
            status: JobStatus::Success,
            status_message: String::new(),
        }
    }

    /// A failed result never carries words.
    pub fn failure(job: Job, message: impl Into<String>) -> Self {
        let duration = job.elapsed();
        Self {
            job,
            words: Vec::new(),
            duration,
            status: JobStatus::Failure,
            status_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    /// Turns a successful result into a failed one after the fact. The
    /// computed words are kept so the notification still shows them.
    pub fn demote(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failure;
        self.status_message = message.into();
    }
}
