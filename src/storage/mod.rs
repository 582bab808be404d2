//! Blob storage holding the uploaded content.
//!
//! Workers only read; the upload client writes.

mod memory;
mod s3;

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;

use crate::error::StorageError;
use crate::job::Location;

pub use memory::InMemoryStore;
pub use s3::S3Store;

/// Streaming body of a stored object.
pub type ContentStream = Pin<Box<dyn AsyncBufRead + Send>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Opens the object at `location` for streaming.
    async fn get(&self, location: &Location) -> Result<ContentStream, StorageError>;

    /// Stores `body` at `location`, replacing any existing object.
    async fn put(&self, location: &Location, body: Vec<u8>) -> Result<(), StorageError>;
}
