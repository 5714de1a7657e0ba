//! Directory lookup: file records folded from search results
//!
//! Nothing is stored locally. Every lookup runs one channel search, decodes
//! each caption and folds chunks sharing a fingerprint into a [`FileRecord`].
//! Captions that do not decode are reported, never fatal: the conversation
//! may hold unrelated messages that happen to match the query.

use std::collections::BTreeMap;

use futures::TryStreamExt;
use tracing::{debug, warn};

use tglfs_channel::Message;
use tglfs_core::{ChunkMessage, FileFingerprint, FileRecord, MessageHandle, TglfsResult};

use crate::caption;
use crate::Archive;

/// A search result that was not a decodable chunk caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCaption {
    pub handle: MessageHandle,
    pub caption: String,
    pub reason: String,
}

/// Result of a lookup: file records keyed by fingerprint
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub files: BTreeMap<FileFingerprint, FileRecord>,
    pub skipped: Vec<SkippedCaption>,
}

impl Directory {
    pub fn get(&self, fingerprint: &FileFingerprint) -> Option<&FileRecord> {
        self.files.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Records ordered by earliest timestamp, oldest first.
    pub fn by_age(&self) -> Vec<&FileRecord> {
        let mut records: Vec<&FileRecord> = self.files.values().collect();
        records.sort_by_key(|r| (r.earliest_timestamp, r.fingerprint.clone()));
        records
    }

    fn absorb(&mut self, chunk: &ChunkMessage) {
        match self.files.get_mut(&chunk.fingerprint) {
            Some(record) => {
                let before = record.duplicates;
                record.absorb(chunk);
                if record.duplicates > before {
                    warn!(
                        fingerprint = %chunk.fingerprint,
                        index = chunk.chunk_index,
                        handle = %chunk.handle,
                        "duplicate chunk message"
                    );
                }
            }
            None => {
                self.files
                    .insert(chunk.fingerprint.clone(), FileRecord::from_chunk(chunk));
            }
        }
    }
}

/// A chunk message together with its raw caption text
#[derive(Debug, Clone)]
pub(crate) struct Located {
    pub chunk: ChunkMessage,
    pub caption: String,
}

/// Decode the caption of `msg` into a [`ChunkMessage`].
pub fn chunk_message(msg: &Message) -> TglfsResult<ChunkMessage> {
    let decoded = caption::decode(&msg.caption)?;
    Ok(ChunkMessage {
        fingerprint: decoded.fingerprint,
        chunk_index: decoded.index,
        chunk_count: decoded.count,
        display_name: decoded.name,
        attachment_size: msg.attachment_size,
        timestamp: msg.timestamp,
        handle: msg.handle.clone(),
    })
}

impl Archive {
    /// List files in `source` (default: home) whose captions match `term`.
    pub async fn lookup(&self, term: &str, source: Option<&str>) -> TglfsResult<Directory> {
        let target = source.unwrap_or(self.home());
        let query = caption::lookup_query(term);
        let (found, skipped) = self.search_chunks(target, &query, None).await?;

        let mut directory = Directory {
            skipped,
            ..Default::default()
        };
        for located in &found {
            directory.absorb(&located.chunk);
        }
        debug!(
            conversation = target,
            term,
            files = directory.len(),
            skipped = directory.skipped.len(),
            "lookup complete"
        );
        Ok(directory)
    }

    /// Run `query` in `target`, decoding every result. With `only` set,
    /// results for other fingerprints are dropped (search is substring
    /// based, so a query can match more than intended).
    pub(crate) async fn search_chunks(
        &self,
        target: &str,
        query: &str,
        only: Option<&FileFingerprint>,
    ) -> TglfsResult<(Vec<Located>, Vec<SkippedCaption>)> {
        let mut results = self.channel().search(target, query).await?;
        let mut found = Vec::new();
        let mut skipped = Vec::new();

        while let Some(msg) = results.try_next().await? {
            match chunk_message(&msg) {
                Ok(chunk) => {
                    if only.is_some_and(|fp| *fp != chunk.fingerprint) {
                        continue;
                    }
                    found.push(Located {
                        chunk,
                        caption: msg.caption,
                    });
                }
                Err(e) => {
                    warn!(handle = %msg.handle, caption = %msg.caption, "skipping undecodable caption: {e}");
                    skipped.push(SkippedCaption {
                        handle: msg.handle,
                        caption: msg.caption,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok((found, skipped))
    }

    /// Every chunk message of `fingerprint` in `target`, ascending by index.
    /// Duplicates of one index keep recency order (newest first).
    pub(crate) async fn file_chunks(
        &self,
        fingerprint: &FileFingerprint,
        target: &str,
    ) -> TglfsResult<Vec<Located>> {
        let query = caption::fingerprint_query(fingerprint);
        let (mut found, _) = self.search_chunks(target, &query, Some(fingerprint)).await?;
        found.sort_by_key(|l| l.chunk.chunk_index);
        Ok(found)
    }
}

/// Fold located chunks (non-empty) into a record.
pub(crate) fn fold(chunks: &[Located]) -> Option<FileRecord> {
    let (first, rest) = chunks.split_first()?;
    let mut record = FileRecord::from_chunk(&first.chunk);
    for located in rest {
        record.absorb(&located.chunk);
    }
    Some(record)
}
