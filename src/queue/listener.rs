use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{MessageQueue, RECEIVE_BACKOFF};
use crate::decoder;
use crate::job::Job;

/// Long-polls the job queue and feeds decoded jobs to the workers.
pub struct JobListener {
    queue: Arc<dyn MessageQueue>,
    receive_wait: Duration,
    backoff: Duration,
}

impl JobListener {
    pub fn new(queue: Arc<dyn MessageQueue>, receive_wait: Duration) -> Self {
        Self {
            queue,
            receive_wait,
            backoff: RECEIVE_BACKOFF,
        }
    }

    /// Overrides the sleep between a failed receive and the next attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Receives until `cancel` fires, then drops `jobs`, closing the job
    /// channel for the workers.
    ///
    /// A receive that is already in flight when cancellation fires is
    /// finished and its messages are handed out before the loop stops.
    /// Messages whose body cannot be decoded are deleted on the spot.
    pub async fn listen(self, cancel: CancellationToken, jobs: mpsc::Sender<Job>) {
        tracing::info!("job message queue starting");
        let lease_seconds = self.queue.lease().as_secs();

        while !cancel.is_cancelled() {
            let messages = match self.queue.receive(self.receive_wait).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read from message queue");
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                    continue;
                }
            };
            tracing::debug!(count = messages.len(), "received messages");

            for message in messages {
                tracing::info!(message_id = %message.id, "processing message");
                let decoded = match decoder::decode(&message, lease_seconds) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::warn!(message_id = %message.id, error = %e, "failed to parse job message, discarding");
                        if let Err(e) = self.queue.delete(&message.receipt).await {
                            tracing::warn!(message_id = %message.id, error = %e, "failed to delete poison message");
                        }
                        continue;
                    }
                };

                for job in decoded {
                    if jobs.send(job).await.is_err() {
                        tracing::warn!("job channel closed, no workers left");
                        return;
                    }
                }
            }
        }

        tracing::info!("job message queue quitting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;

    const BODY: &str = r#"{"Event":"ObjectCreated","Records":[{"awsRegion":"us-west-2","S3":{"Bucket":{"Name":"b"},"Object":{"Key":"k.txt"}}}]}"#;

    fn listener(queue: &Arc<InMemoryQueue>) -> JobListener {
        JobListener::new(queue.clone(), Duration::from_millis(50))
            .with_backoff(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn forwards_decoded_jobs() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        queue.push(BODY);
        let (tx, mut rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(listener(&queue).listen(cancel.clone(), tx));
        let job = rx.recv().await.unwrap();
        assert_eq!(job.location.filename(), "b/k.txt");
        assert_eq!(job.lease_seconds, 60);

        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none(), "channel must close after cancel");
        // processed but never acknowledged: the message is still there
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn poison_message_is_deleted_and_listening_continues() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        let poison = queue.push("{not json");
        let empty = queue.push(r#"{"Records":[]}"#);
        queue.push(BODY);
        let (tx, mut rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(listener(&queue).listen(cancel.clone(), tx));
        let job = rx.recv().await.unwrap();
        assert_eq!(job.location.key, "k.txt");

        cancel.cancel();
        handle.await.unwrap();
        assert!(!queue.contains(&poison));
        assert!(!queue.contains(&empty));
        assert_eq!(queue.delete_count(), 2);
    }

    #[tokio::test]
    async fn receive_failures_back_off_and_retry() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        queue.fail_next_receives(3);
        queue.push(BODY);
        let (tx, mut rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(listener(&queue).listen(cancel.clone(), tx));
        assert!(rx.recv().await.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        queue.fail_next_receives(1);
        let (tx, _rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let slow = JobListener::new(queue.clone(), Duration::ZERO)
            .with_backoff(Duration::from_secs(3600));
        let handle = tokio::spawn(slow.listen(cancel.clone(), tx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn multi_record_message_yields_one_job_per_record() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        queue.push(
            r#"{"Records":[
                {"awsRegion":"r","S3":{"Bucket":{"Name":"b"},"Object":{"Key":"one"}}},
                {"awsRegion":"r","S3":{"Bucket":{"Name":"b"},"Object":{"Key":"two"}}}
            ]}"#,
        );
        let (tx, mut rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(listener(&queue).listen(cancel.clone(), tx));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.origin.id, second.origin.id);
        assert_eq!(
            [first.location.key, second.location.key],
            ["one".to_string(), "two".to_string()]
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
