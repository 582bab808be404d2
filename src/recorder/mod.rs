//! Durable recording of successful results.
//!
//! A result is stored as one item keyed by `Filename` (`<bucket>/<key>`)
//! with a `Words` map from word to count. Recording the same file again
//! overwrites the previous item, so redelivered jobs are harmless.

mod dynamo;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::job::JobResult;

pub use dynamo::DynamoRecorder;
pub use memory::InMemoryRecorder;

/// Hash key attribute of the result table.
pub const FILENAME_ATTRIBUTE: &str = "Filename";
pub const WORDS_ATTRIBUTE: &str = "Words";

/// The item written for a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Words")]
    pub words: BTreeMap<String, u64>,
}

impl From<&JobResult> for ResultRecord {
    fn from(result: &JobResult) -> Self {
        Self {
            filename: result.job.location.filename(),
            words: result
                .words
                .iter()
                .map(|w| (w.text.clone(), w.count))
                .collect(),
        }
    }
}

#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record(&self, result: &JobResult) -> Result<(), RecordError>;
}
