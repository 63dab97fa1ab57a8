//! Blob creation with text/binary classification

use crate::Result;
use bridge_traits::git::{BlobEncoding, GitDataProvider};
use std::sync::Arc;
use tracing::trace;

/// How many leading bytes are inspected for control characters
pub const BINARY_SAMPLE_LEN: usize = 8000;

/// Share of control characters in the sample above which content is binary
const CONTROL_RATIO_PERCENT: usize = 10;

/// Decide whether content must be sent base64 encoded.
///
/// Content is binary when it contains a NUL byte or is not valid UTF-8, or when
/// more than a tenth of the sampled characters are control characters other
/// than common whitespace.
pub fn is_binary(content: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }

    let sample = &content[..content.len().min(BINARY_SAMPLE_LEN)];
    if sample.contains(&0) {
        return true;
    }

    if std::str::from_utf8(content).is_err() {
        return true;
    }

    let control = sample.iter().filter(|&&b| is_control(b)).count();
    control * 100 > sample.len() * CONTROL_RATIO_PERCENT
}

fn is_control(b: u8) -> bool {
    (b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c | 0x1b)) || b == 0x7f
}

/// A blob that now exists on the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBlob {
    pub sha: String,
    pub size: u64,
    pub is_binary: bool,
}

#[derive(Clone)]
pub struct BlobCreator {
    git: Arc<dyn GitDataProvider>,
}

impl BlobCreator {
    pub fn new(git: Arc<dyn GitDataProvider>) -> Self {
        Self { git }
    }

    pub async fn create(&self, content: &[u8]) -> Result<CreatedBlob> {
        let binary = is_binary(content);
        let encoding = if binary {
            BlobEncoding::Base64
        } else {
            BlobEncoding::Utf8
        };

        let sha = self.git.create_blob(content, encoding).await?;
        trace!(sha = %sha, size = content.len(), binary, "Created blob");
        Ok(CreatedBlob {
            sha,
            size: content.len() as u64,
            is_binary: binary,
        })
    }
}
