//! Content announcement for documents attached to validation records.
//!
//! A validation can vouch for a document by carrying its content hash. How
//! the hash is obtained (content-addressed network, local digest) sits
//! behind [`AttachmentAnnouncer`].

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub type AttachmentResult<T> = Result<T, AttachmentError>;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to announce {filename}: {reason}")]
    Announce { filename: String, reason: String },

    #[error("attachment {filename} is empty")]
    Empty { filename: String },
}

#[async_trait]
pub trait AttachmentAnnouncer: Send + Sync {
    /// Announce `content` and return its content hash.
    async fn announce(&self, filename: &str, content: &[u8]) -> AttachmentResult<String>;
}

/// Local announcer: the hash is `sha256:` + hex digest, nothing leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Announcer;

#[async_trait]
impl AttachmentAnnouncer for Sha256Announcer {
    async fn announce(&self, filename: &str, content: &[u8]) -> AttachmentResult<String> {
        if content.is_empty() {
            return Err(AttachmentError::Empty {
                filename: filename.to_string(),
            });
        }
        Ok(format!("sha256:{}", hex::encode(Sha256::digest(content))))
    }
}
