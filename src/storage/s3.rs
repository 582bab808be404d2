use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use super::{BlobStore, ContentStream};
use crate::error::StorageError;
use crate::job::Location;

/// [`BlobStore`] backed by Amazon S3.
///
/// Objects are fetched through a client for the region named in their
/// [`Location`]. Clients for regions other than the default one are built
/// from the default client's configuration on first use and cached.
#[derive(Debug)]
pub struct S3Store {
    client: Client,
    regional: Mutex<HashMap<String, Client>>,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            regional: Mutex::new(HashMap::new()),
        }
    }

    /// Client for `region`; the default client when `region` is empty or
    /// already the configured one.
    fn client_for(&self, region: &str) -> Client {
        let is_default = self
            .client
            .config()
            .region()
            .is_some_and(|r| r.to_string() == region);
        if region.is_empty() || is_default {
            return self.client.clone();
        }

        let mut regional = self.regional.lock().unwrap_or_else(|e| e.into_inner());
        regional
            .entry(region.to_string())
            .or_insert_with(|| {
                tracing::debug!(%region, "creating regional storage client");
                let config = self
                    .client
                    .config()
                    .to_builder()
                    .region(Region::new(region.to_string()))
                    .build();
                Client::from_conf(config)
            })
            .clone()
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn get(&self, location: &Location) -> Result<ContentStream, StorageError> {
        let output = self
            .client_for(&location.region)
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    StorageError::NotFound {
                        bucket: location.bucket.clone(),
                        key: location.key.clone(),
                    }
                } else {
                    StorageError::Fetch(DisplayErrorContext(e).to_string())
                }
            })?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn put(&self, location: &Location, body: Vec<u8>) -> Result<(), StorageError> {
        self.client_for(&location.region)
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::config::BehaviorVersion;

    use super::*;

    fn store(region: &str) -> S3Store {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .build();
        S3Store::new(Client::from_conf(config))
    }

    fn region_of(client: &Client) -> Option<String> {
        client.config().region().map(|r| r.to_string())
    }

    #[test]
    fn default_region_uses_default_client() {
        let store = store("us-west-2");
        assert_eq!(region_of(&store.client_for("us-west-2")).as_deref(), Some("us-west-2"));
        assert_eq!(region_of(&store.client_for("")).as_deref(), Some("us-west-2"));
        assert!(store.regional.lock().unwrap().is_empty());
    }

    #[test]
    fn other_regions_get_their_own_cached_client() {
        let store = store("us-west-2");

        let client = store.client_for("eu-west-1");
        assert_eq!(region_of(&client).as_deref(), Some("eu-west-1"));
        store.client_for("eu-west-1");
        store.client_for("ap-south-1");

        let regional = store.regional.lock().unwrap();
        assert_eq!(regional.len(), 2);
        assert!(regional.contains_key("eu-west-1"));
    }
}
