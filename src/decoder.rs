//! Turns storage notification messages into jobs.
//!
//! A notification may batch several object events; every record becomes its
//! own [`Job`]. Bodies that do not parse, or that parse but carry no records,
//! are rejected so the caller can discard the message instead of silently
//! dropping work.

use serde::Deserialize;

use crate::error::DecodeError;
use crate::job::{Job, Location, RawMessage};

/// Abbreviated storage event notification. Only the fields the worker needs
/// are modeled; everything else is ignored.
#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "Event", default)]
    #[allow(dead_code)]
    event: String,
    #[serde(rename = "Records", default)]
    records: Vec<EventRecord>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(rename = "awsRegion", default)]
    region: String,
    #[serde(rename = "EventName", default)]
    #[allow(dead_code)]
    event_name: String,
    #[serde(rename = "S3")]
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    #[serde(rename = "Bucket")]
    bucket: Named,
    #[serde(rename = "Object")]
    object: Keyed,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Keyed {
    #[serde(rename = "Key")]
    key: String,
}

/// Decodes one queue message into the jobs it describes.
///
/// Each job gets its own start timestamp, taken as it is built, and the
/// lease the message was received with.
pub fn decode(message: &RawMessage, lease_seconds: u64) -> Result<Vec<Job>, DecodeError> {
    let event: EventMessage = serde_json::from_str(&message.body)?;

    if event.records.is_empty() {
        return Err(DecodeError::NoRecords);
    }

    Ok(event
        .records
        .into_iter()
        .map(|record| {
            Job::new(
                message.clone(),
                Location::new(record.region, record.s3.bucket.name, record.s3.object.key),
                lease_seconds,
            )
        })
        .collect())
}
