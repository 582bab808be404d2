//! Streaming word frequency counting.
//!
//! Content is tokenized on whitespace, lower-cased and trimmed of the
//! `.,"'?!` characters at both ends. Tokens of four characters or fewer are
//! skipped. While counting, the job's queue lease is extended whenever more
//! than half of it has been used, so a large file is never redelivered to a
//! second worker mid-stream.

use std::collections::HashMap;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::JobError;
use crate::job::{Job, Word};
use crate::queue::MessageQueue;

/// Number of words kept in a result.
pub const TOP_WORDS: usize = 10;

const TRIM: &[char] = &['.', ',', '"', '\'', '?', '!'];
const MIN_WORD_CHARS: usize = 5;

/// Normalizes a raw token, returning `None` for tokens that are too short
/// to count.
pub fn clean_token(token: &str) -> Option<String> {
    let lowered = token.to_lowercase();
    let word = lowered.trim_matches(TRIM);
    if word.chars().count() < MIN_WORD_CHARS {
        return None;
    }
    Some(word.to_string())
}

/// Longest run of non-whitespace bytes treated as a token. Longer runs are
/// dropped without being buffered.
pub const MAX_TOKEN_BYTES: usize = 64 * 1024;

/// Splits a byte stream on ASCII whitespace, carrying a partial token over
/// chunk boundaries.
#[derive(Debug)]
struct TokenSplitter {
    partial: Vec<u8>,
    oversized: bool,
    max_len: usize,
}

impl TokenSplitter {
    fn new(max_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            oversized: false,
            max_len,
        }
    }

    /// Appends every token completed by `chunk` to `out`.
    fn feed(&mut self, chunk: &[u8], out: &mut Vec<Vec<u8>>) {
        for &byte in chunk {
            if byte.is_ascii_whitespace() {
                if !self.partial.is_empty() {
                    out.push(std::mem::take(&mut self.partial));
                }
                self.oversized = false;
            } else if !self.oversized {
                if self.partial.len() == self.max_len {
                    self.partial.clear();
                    self.oversized = true;
                } else {
                    self.partial.push(byte);
                }
            }
        }
    }

    /// The trailing token left at end of stream, if any.
    fn finish(&mut self) -> Option<Vec<u8>> {
        self.oversized = false;
        if self.partial.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.partial))
    }
}

/// Extends the job's lease if more than half of it has been used.
async fn keep_lease(job: &mut Job, queue: &dyn MessageQueue) -> Result<(), JobError> {
    if !job.lease_half_spent() {
        return Ok(());
    }
    let added = queue
        .extend_lease(&job.origin.receipt, queue.lease())
        .await
        .map_err(JobError::LeaseExtend)?;
    job.extend_lease(added);
    tracing::debug!(
        message_id = %job.message_id(),
        lease_seconds = job.lease_seconds,
        "extended job message visibility"
    );
    Ok(())
}

async fn count_token(
    token: &[u8],
    counts: &mut HashMap<String, u64>,
    job: &mut Job,
    queue: &dyn MessageQueue,
) -> Result<(), JobError> {
    let text = String::from_utf8_lossy(token);
    for raw in text.split_whitespace() {
        let Some(word) = clean_token(raw) else {
            continue;
        };
        *counts.entry(word).or_insert(0) += 1;
        keep_lease(job, queue).await?;
    }
    Ok(())
}

/// Counts every word in `reader`, extending the job's lease on `queue` as
/// needed.
///
/// Content is consumed chunk by chunk as it arrives; the lease is checked
/// after every counted word, and once per chunk while a single token spans
/// several chunks. Any read error or failed lease extension aborts the
/// count.
pub async fn count_words<R>(
    mut reader: R,
    job: &mut Job,
    queue: &dyn MessageQueue,
) -> Result<HashMap<String, u64>, JobError>
where
    R: AsyncBufRead + Unpin,
{
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut splitter = TokenSplitter::new(MAX_TOKEN_BYTES);
    let mut tokens = Vec::new();

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        splitter.feed(chunk, &mut tokens);
        reader.consume(len);

        if tokens.is_empty() {
            keep_lease(job, queue).await?;
        }
        for token in tokens.drain(..) {
            count_token(&token, &mut counts, job, queue).await?;
        }
    }

    if let Some(token) = splitter.finish() {
        count_token(&token, &mut counts, job, queue).await?;
    }

    Ok(counts)
}

/// Ranks counted words by count, highest first, and keeps the first `top`.
/// Equal counts are ordered alphabetically.
pub fn collect_top_words(counts: HashMap<String, u64>, top: usize) -> Vec<Word> {
    let mut words: Vec<Word> = counts
        .into_iter()
        .map(|(text, count)| Word { text, count })
        .collect();
    words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.text.cmp(&b.text)));
    words.truncate(top);
    words
}

/// Counts the words in `reader` and returns the `top` most frequent.
pub async fn count_top_words<R>(
    reader: R,
    job: &mut Job,
    queue: &dyn MessageQueue,
    top: usize,
) -> Result<Vec<Word>, JobError>
where
    R: AsyncBufRead + Unpin,
{
    let counts = count_words(reader, job, queue).await?;
    Ok(collect_top_words(counts, top))
}
