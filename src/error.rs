//! Error types for every seam of the pipeline.
//!
//! Each collaborator gets its own enum so callers can decide locally how to
//! recover: queue errors are retried or logged, decode errors discard the
//! message, job errors become a failed result, record errors demote a
//! successful result.

use thiserror::Error;

/// Failure talking to the message queue service.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Transport or service level failure. Callers back off and retry
    /// (receive) or log and continue (delete, extend).
    #[error("queue request failed: {0}")]
    Transient(String),
}

/// A notification body that cannot be turned into jobs.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("parse storage event message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("job does not have any records")]
    NoRecords,
}

/// Failure reading or writing blob storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("fetch object failed: {0}")]
    Fetch(String),

    #[error("upload object failed: {0}")]
    Upload(String),
}

/// Everything that can go wrong while a worker processes a single job.
///
/// The `Display` text ends up as the `StatusMessage` of a failed result.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] StorageError),

    #[error("failed to update job message's visibility timeout, {0}")]
    LeaseExtend(#[source] QueueError),

    #[error("failed to count words, {0}")]
    Read(#[from] std::io::Error),
}

/// Failure writing a successful result to durable storage.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unable to serialize result, {0}")]
    Serialize(String),

    #[error("unable to record result, {0}")]
    Write(String),

    #[error("unable to create result table, {0}")]
    Provision(String),
}

/// Failure publishing a status notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("serialize job result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("region not specified, unable to retrieve from EC2 instance: {0}")]
    Region(String),
}
