//! Mailbox channel: conversations stored as objects in an OpenDAL operator
//!
//! Layout under the operator root:
//! ```text
//! <target>/messages/<id:020>.json     message metadata (caption, size, timestamp)
//! <target>/attachments/<id:020>       attachment bytes
//! ```
//!
//! Ids are per conversation and increase with send order, so sorting ids
//! descending yields recency order.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use opendal::{ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use tglfs_core::{MessageHandle, TglfsError, TglfsResult};

use crate::{Channel, Message, MessageStream};

/// On-disk form of one message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMessage {
    id: u64,
    caption: String,
    attachment_size: u64,
    timestamp: u64,
}

pub struct MailboxChannel {
    op: Operator,
    /// Serializes id allocation within this process
    send_lock: Mutex<()>,
}

impl std::fmt::Debug for MailboxChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxChannel")
            .field("backend", &self.op.info().scheme())
            .field("root", &self.op.info().root())
            .finish()
    }
}

impl MailboxChannel {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            send_lock: Mutex::new(()),
        }
    }

    /// A mailbox held in process memory.
    pub fn memory() -> TglfsResult<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .map_err(|e| TglfsError::channel("open", e))?
            .finish();
        Ok(Self::new(op))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    async fn message_ids(&self, target: &str) -> TglfsResult<Vec<u64>> {
        let dir = format!("{target}/messages/");
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TglfsError::channel("search", e)),
        };
        Ok(entries
            .iter()
            .filter_map(|entry| entry.name().strip_suffix(".json")?.parse().ok())
            .collect())
    }

    async fn load(&self, target: &str, id: u64) -> TglfsResult<Option<StoredMessage>> {
        let bytes = match self.op.read(&message_key(target, id)).await {
            Ok(buf) => buf.to_vec(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TglfsError::channel("read", e)),
        };
        let stored = serde_json::from_slice(&bytes)
            .map_err(|e| TglfsError::channel("read", format!("message {target}#{id}: {e}")))?;
        Ok(Some(stored))
    }

    async fn require(&self, handle: &MessageHandle, operation: &'static str) -> TglfsResult<StoredMessage> {
        self.load(&handle.target, handle.id)
            .await?
            .ok_or_else(|| TglfsError::channel(operation, format!("no message {handle}")))
    }

    async fn store(&self, target: &str, stored: &StoredMessage, operation: &'static str) -> TglfsResult<()> {
        let json = serde_json::to_vec(stored)
            .map_err(|e| TglfsError::channel(operation, e))?;
        self.op
            .write(&message_key(target, stored.id), json)
            .await
            .map_err(|e| TglfsError::channel(operation, e))?;
        Ok(())
    }

    /// Append a message with the given attachment bytes to `target`.
    async fn post(
        &self,
        target: &str,
        caption: &str,
        attachment: Vec<u8>,
        operation: &'static str,
    ) -> TglfsResult<MessageHandle> {
        validate_target(target, operation)?;
        let _guard = self.send_lock.lock().await;

        let id = self.message_ids(target).await?.into_iter().max().unwrap_or(0) + 1;
        let stored = StoredMessage {
            id,
            caption: caption.to_string(),
            attachment_size: attachment.len() as u64,
            timestamp: unix_now(),
        };

        // Attachment first: a message never points at missing bytes
        self.op
            .write(&attachment_key(target, id), attachment)
            .await
            .map_err(|e| TglfsError::channel(operation, e))?;
        self.store(target, &stored, operation).await?;

        debug!(conversation = target, id, size = stored.attachment_size, "{operation}: message posted");
        Ok(MessageHandle {
            target: target.to_string(),
            id,
        })
    }
}

#[async_trait]
impl Channel for MailboxChannel {
    async fn send(&self, target: &str, caption: &str, attachment: &Path) -> TglfsResult<MessageHandle> {
        let bytes = tokio::fs::read(attachment).await?;
        self.post(target, caption, bytes, "send").await
    }

    async fn search(&self, target: &str, query: &str) -> TglfsResult<MessageStream<'_>> {
        validate_target(target, "search")?;
        let mut ids = self.message_ids(target).await?;
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let target = target.to_string();

        let results = stream::iter(ids)
            .then(move |id| {
                let target = target.clone();
                async move {
                    let loaded = self.load(&target, id).await?;
                    Ok::<_, TglfsError>(loaded.map(|stored| Message {
                        caption: stored.caption,
                        attachment_size: stored.attachment_size,
                        timestamp: stored.timestamp,
                        handle: MessageHandle { target, id },
                    }))
                }
            })
            .filter_map(move |loaded| {
                let item = match loaded {
                    Ok(Some(msg)) if caption_matches(&tokens, &msg.caption) => Some(Ok(msg)),
                    // deleted since listing, or not a match
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                };
                future::ready(item)
            })
            .boxed();
        Ok(results)
    }

    async fn edit(&self, handle: &MessageHandle, caption: &str) -> TglfsResult<()> {
        let mut stored = self.require(handle, "edit").await?;
        stored.caption = caption.to_string();
        self.store(&handle.target, &stored, "edit").await
    }

    async fn delete(&self, handle: &MessageHandle) -> TglfsResult<()> {
        self.require(handle, "delete").await?;
        self.op
            .delete(&message_key(&handle.target, handle.id))
            .await
            .map_err(|e| TglfsError::channel("delete", e))?;
        self.op
            .delete(&attachment_key(&handle.target, handle.id))
            .await
            .map_err(|e| TglfsError::channel("delete", e))?;
        Ok(())
    }

    async fn forward(&self, handle: &MessageHandle, target: &str) -> TglfsResult<MessageHandle> {
        let stored = self.require(handle, "forward").await?;
        let bytes = self
            .op
            .read(&attachment_key(&handle.target, handle.id))
            .await
            .map_err(|e| TglfsError::channel("forward", e))?
            .to_vec();
        self.post(target, &stored.caption, bytes, "forward").await
    }

    async fn fetch_attachment(&self, handle: &MessageHandle, dest: &Path) -> TglfsResult<u64> {
        let bytes = self
            .op
            .read(&attachment_key(&handle.target, handle.id))
            .await
            .map_err(|e| TglfsError::channel("fetch", format!("{handle}: {e}")))?
            .to_vec();
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

fn message_key(target: &str, id: u64) -> String {
    format!("{target}/messages/{id:020}.json")
}

fn attachment_key(target: &str, id: u64) -> String {
    format!("{target}/attachments/{id:020}")
}

fn validate_target(target: &str, operation: &'static str) -> TglfsResult<()> {
    if target.is_empty() || target.contains('/') || target == "." || target == ".." {
        return Err(TglfsError::channel(
            operation,
            format!("invalid conversation name {target:?}"),
        ));
    }
    Ok(())
}

/// Every query token must occur somewhere in the caption, ignoring case.
fn caption_matches(tokens: &[String], caption: &str) -> bool {
    let caption = caption.to_lowercase();
    tokens.iter().all(|t| caption.contains(t.as_str()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn send_bytes(ch: &MailboxChannel, target: &str, caption: &str, data: &[u8]) -> MessageHandle {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("att");
        std::fs::write(&path, data).unwrap();
        ch.send(target, caption, &path).await.unwrap()
    }

    async fn captions(ch: &MailboxChannel, target: &str, query: &str) -> Vec<String> {
        ch.search(target, query)
            .await
            .unwrap()
            .map_ok(|m| m.caption)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ids_increase_per_conversation() {
        let ch = MailboxChannel::memory().unwrap();
        let a = send_bytes(&ch, "me", "one", b"1").await;
        let b = send_bytes(&ch, "me", "two", b"2").await;
        let c = send_bytes(&ch, "alice", "three", b"3").await;
        assert_eq!((a.id, b.id, c.id), (1, 2, 1));
        assert_eq!(b.to_string(), "me#2");
    }

    #[tokio::test]
    async fn search_is_newest_first_and_tokenized() {
        let ch = MailboxChannel::memory().unwrap();
        send_bytes(&ch, "me", "tglfs aaa chunk 1/2 report.pdf", b"x").await;
        send_bytes(&ch, "me", "tglfs bbb chunk 1/1 photo.jpg", b"y").await;
        send_bytes(&ch, "me", "tglfs aaa chunk 2/2 report.pdf", b"z").await;

        assert_eq!(
            captions(&ch, "me", "tglfs AAA chunk").await,
            vec!["tglfs aaa chunk 2/2 report.pdf", "tglfs aaa chunk 1/2 report.pdf"]
        );
        assert_eq!(captions(&ch, "me", "photo").await.len(), 1);
        assert_eq!(captions(&ch, "me", "").await.len(), 3);
        assert!(captions(&ch, "nobody", "tglfs").await.is_empty());
    }

    #[tokio::test]
    async fn edit_delete_forward_fetch() {
        let ch = MailboxChannel::memory().unwrap();
        let h = send_bytes(&ch, "me", "old caption", b"payload").await;

        ch.edit(&h, "new caption").await.unwrap();
        assert_eq!(captions(&ch, "me", "new").await, vec!["new caption"]);

        let fwd = ch.forward(&h, "bob").await.unwrap();
        assert_eq!(fwd.target, "bob");
        assert_eq!(captions(&ch, "bob", "").await, vec!["new caption"]);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        assert_eq!(ch.fetch_attachment(&fwd, &dest).await.unwrap(), 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");

        ch.delete(&h).await.unwrap();
        assert!(captions(&ch, "me", "").await.is_empty());
        assert!(matches!(
            ch.delete(&h).await,
            Err(TglfsError::Channel { operation: "delete", .. })
        ));
        assert!(ch.edit(&h, "again").await.is_err());
    }

    #[tokio::test]
    async fn reports_attachment_size() {
        let ch = MailboxChannel::memory().unwrap();
        send_bytes(&ch, "me", "sized", &[0u8; 4096]).await;
        let msgs: Vec<Message> = ch.search("me", "sized").await.unwrap().try_collect().await.unwrap();
        assert_eq!(msgs[0].attachment_size, 4096);
        assert!(msgs[0].timestamp > 0);
    }

    #[tokio::test]
    async fn rejects_path_like_targets() {
        let ch = MailboxChannel::memory().unwrap();
        assert!(ch.search("../etc", "x").await.is_err());
        assert!(ch.search("", "x").await.is_err());
    }

    #[tokio::test]
    async fn fs_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let open = || {
            let op = Operator::new(opendal::services::Fs::default().root(&root))
                .unwrap()
                .finish();
            MailboxChannel::new(op)
        };

        send_bytes(&open(), "me", "persisted caption", b"bytes").await;
        assert_eq!(captions(&open(), "me", "persisted").await.len(), 1);
        assert!(dir.path().join("me/messages/00000000000000000001.json").exists());
    }
}
