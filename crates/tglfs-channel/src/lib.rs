//! tglfs-channel: the messaging channel the archive is built on
//!
//! The archive needs exactly six capabilities from a channel: send a message
//! with an attachment, full-text search over message captions, edit a
//! caption, delete, forward to another conversation, and download an
//! attachment. [`Channel`] is that contract; [`MailboxChannel`] implements it
//! over an OpenDAL operator.

pub mod mailbox;
pub mod operator;

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use tglfs_core::{MessageHandle, TglfsResult};

pub use mailbox::MailboxChannel;
pub use operator::{build_from_config, build_operator, S3Settings};

/// A message as returned by [`Channel::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub caption: String,
    pub attachment_size: u64,
    /// Unix seconds
    pub timestamp: u64,
    pub handle: MessageHandle,
}

/// Search results, newest first. Finite; pulled lazily.
pub type MessageStream<'a> = BoxStream<'a, TglfsResult<Message>>;

#[async_trait]
pub trait Channel: Send + Sync {
    /// Post `attachment` (a local file) with `caption` into `target`.
    async fn send(&self, target: &str, caption: &str, attachment: &Path)
        -> TglfsResult<MessageHandle>;

    /// Messages in `target` whose caption matches `query`, in recency order.
    async fn search(&self, target: &str, query: &str) -> TglfsResult<MessageStream<'_>>;

    async fn edit(&self, handle: &MessageHandle, caption: &str) -> TglfsResult<()>;

    async fn delete(&self, handle: &MessageHandle) -> TglfsResult<()>;

    /// Copy a message, caption and attachment untouched, into `target`.
    async fn forward(&self, handle: &MessageHandle, target: &str) -> TglfsResult<MessageHandle>;

    /// Download the attachment of `handle` to `dest`, returning its size.
    async fn fetch_attachment(&self, handle: &MessageHandle, dest: &Path) -> TglfsResult<u64>;
}
