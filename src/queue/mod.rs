//! Message queue adapter.
//!
//! [`MessageQueue`] is the contract the pipeline needs from a durable,
//! at-least-once queue: leased receive, delete, lease extension and send.
//! [`SqsQueue`] talks to Amazon SQS; [`InMemoryQueue`] implements the same
//! lease semantics in process for tests and local runs.
//!
//! [`JobListener`] drives the receive loop and feeds decoded jobs to the
//! worker pool.

mod listener;
mod memory;
mod sqs;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::job::RawMessage;

pub use listener::JobListener;
pub use memory::InMemoryQueue;
pub use sqs::SqsQueue;

/// Backoff applied after a failed receive before trying again.
pub const RECEIVE_BACKOFF: Duration = Duration::from_secs(5);

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Lease applied to every received message, and the default extension.
    fn lease(&self) -> Duration;

    /// Waits up to `max_wait` for messages. Every returned message is hidden
    /// from other receivers for [`lease`](Self::lease).
    async fn receive(&self, max_wait: Duration) -> Result<Vec<RawMessage>, QueueError>;

    /// Removes a message for good. Deleting a message that is already gone
    /// is not an error.
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;

    /// Resets the message's visibility timeout to `duration` from now and
    /// returns the duration actually applied.
    async fn extend_lease(&self, receipt: &str, duration: Duration)
    -> Result<Duration, QueueError>;

    /// Enqueues a new message.
    async fn send(&self, body: String) -> Result<(), QueueError>;
}
