//! Queue-driven word frequency pipeline.
//!
//! Storage notifications arrive on a durable queue, a pool of workers fetches
//! each referenced object and counts its most frequent words, and a single
//! collector records successes, acknowledges the originating messages and
//! publishes a status notification for every job.

pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod imds;
pub mod job;
pub mod notifier;
pub mod pipeline;
pub mod queue;
pub mod recorder;
pub mod storage;
pub mod ui;
pub mod upload;
pub mod wordcount;
pub mod worker;
