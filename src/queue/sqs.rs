use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;

use super::MessageQueue;
use crate::error::QueueError;
use crate::job::RawMessage;

/// SQS rejects visibility timeouts above 12 hours.
const MAX_VISIBILITY: Duration = Duration::from_secs(12 * 60 * 60);
/// SQS long polling is capped at 20 seconds.
const MAX_WAIT: Duration = Duration::from_secs(20);

/// [`MessageQueue`] backed by an Amazon SQS queue.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    lease: Duration,
    max_messages: i32,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>, lease: Duration) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            lease: lease.min(MAX_VISIBILITY),
            max_messages: 1,
        }
    }

    /// Number of messages a single receive may return (1 to 10).
    pub fn with_max_messages(mut self, max_messages: i32) -> Self {
        self.max_messages = max_messages.clamp(1, 10);
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

fn seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn transient<E: std::error::Error>(err: E) -> QueueError {
    QueueError::Transient(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn lease(&self) -> Duration {
        self.lease
    }

    async fn receive(&self, max_wait: Duration) -> Result<Vec<RawMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .wait_time_seconds(seconds(max_wait.min(MAX_WAIT)))
            .visibility_timeout(seconds(self.lease))
            .max_number_of_messages(self.max_messages)
            .send()
            .await
            .map_err(transient)?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                Some(RawMessage {
                    id: m.message_id()?.to_string(),
                    receipt: m.receipt_handle()?.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect();
        Ok(messages)
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(transient)?;
        Ok(())
    }

    async fn extend_lease(
        &self,
        receipt: &str,
        duration: Duration,
    ) -> Result<Duration, QueueError> {
        let applied = duration.min(MAX_VISIBILITY);
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(seconds(applied))
            .send()
            .await
            .map_err(transient)?;
        Ok(applied)
    }

    async fn send(&self, body: String) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(transient)?;
        Ok(())
    }
}
