//! Region discovery through the EC2 instance metadata service (IMDSv2).

use aws_config::imds;
use aws_config::imds::region::ImdsRegionProvider;

use crate::error::ConfigError;

pub struct ImdsRegion {
    provider: ImdsRegionProvider,
}

impl ImdsRegion {
    /// Uses the default IMDS endpoint. Honors `AWS_EC2_METADATA_DISABLED`
    /// and the IMDS endpoint settings of the AWS environment.
    pub fn new() -> Self {
        Self {
            provider: ImdsRegionProvider::builder().build(),
        }
    }

    /// Points the provider at a custom endpoint (useful for testing).
    pub fn with_endpoint(endpoint: &str, max_attempts: u32) -> Result<Self, ConfigError> {
        let client = imds::Client::builder()
            .endpoint(endpoint)
            .map_err(|e| ConfigError::Region(e.to_string()))?
            .max_attempts(max_attempts)
            .build();
        Ok(Self {
            provider: ImdsRegionProvider::builder().imds_client(client).build(),
        })
    }

    /// Region the instance runs in.
    pub async fn region(&self) -> Result<String, ConfigError> {
        let region = self
            .provider
            .region()
            .await
            .ok_or_else(|| ConfigError::Region("instance metadata unavailable".into()))?;

        let region = region.as_ref().trim();
        if region.is_empty() {
            return Err(ConfigError::Region("empty region in instance metadata".into()));
        }
        Ok(region.to_string())
    }
}

impl Default for ImdsRegion {
    fn default() -> Self {
        Self::new()
    }
}
