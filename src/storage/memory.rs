use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BlobStore, ContentStream};
use crate::error::StorageError;
use crate::job::Location;

/// Blob store kept in a map, keyed by `<bucket>/<key>`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object directly, bypassing the async API.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        let location = Location::new("", bucket, key);
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(location.filename(), body.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let location = Location::new("", bucket, key);
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&location.filename())
            .cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn get(&self, location: &Location) -> Result<ContentStream, StorageError> {
        let body = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&location.filename())
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            })?;
        Ok(Box::pin(Cursor::new(body)))
    }

    async fn put(&self, location: &Location, body: Vec<u8>) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(location.filename(), body);
        Ok(())
    }
}
