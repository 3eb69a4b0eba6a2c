// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Disk-backed first-in first-out queue.
//!
//! [`FifoQueue`] composes a [`SegmentStore`] (record bytes) with a
//! [`MetadataStore`] (cursor state). The logical size is authoritative for
//! emptiness: a pop on a non-empty queue that finds no record is a
//! consistency error, never an empty result.
//!
//! ## Durability
//!
//! With [`SyncMode::EveryOp`] every push and pop syncs the segment data first
//! and only then replaces the metadata, so a crash never leaves the cursors
//! pointing past real data. In both modes exhausted segments are deleted only
//! after the metadata that moves past them is written, so the stored tail
//! always names a segment that still exists.

use std::{
    fs,
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ResultExt};
use tracing::{info, warn};

use crate::{
    QueueConfig, Result, SyncMode,
    error::{CorruptQueueStateSnafu, IoSnafu},
    metadata::{MetadataStore, QueueMetadata},
    queue::RecordQueue,
    segment::{SegmentStore, remove_all_segments},
};

/// A persistent FIFO queue stored as segment files in one directory.
///
/// Call [`close`](Self::close) when done. A queue dropped without closing
/// makes a best-effort flush but leaves its files in place.
#[derive(Debug)]
pub struct FifoQueue {
    dir:       PathBuf,
    sync_mode: SyncMode,
    /// Records currently enqueued.
    size:      u64,
    metadata:  MetadataStore,
    segments:  SegmentStore,
    closed:    bool,
}

impl FifoQueue {
    /// Opens the queue stored in `dir`, creating the directory if needed.
    ///
    /// An existing queue keeps the segment limits it was created with.
    pub fn open<P: AsRef<Path>>(dir: P, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context(IoSnafu { path: &dir })?;

        let metadata = MetadataStore::new(&dir);
        let state = match metadata.load()? {
            Some(state) => {
                if state.chunk_size != config.chunk_size
                    || state.file_size_limit != config.file_size_limit
                {
                    warn!(
                        path = ?dir,
                        stored_chunk_size = state.chunk_size,
                        stored_file_size_limit = state.file_size_limit,
                        config_chunk_size = config.chunk_size,
                        config_file_size_limit = config.file_size_limit,
                        "Using stored segment limits instead of configured ones"
                    );
                }
                state
            }
            None => QueueMetadata::fresh(&config),
        };

        let segments = SegmentStore::open(&dir, &state)?;

        info!(
            path = ?dir,
            size = state.size,
            head = ?state.head,
            tail = ?state.tail,
            "Fifo queue opened"
        );

        Ok(Self {
            dir,
            sync_mode: config.sync_mode,
            size: state.size,
            metadata,
            segments,
            closed: false,
        })
    }

    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        self.segments.append(data)?;
        self.size += 1;
        if self.sync_mode.every_op() {
            self.persist()?;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Option<Vec<u8>>> {
        if self.size == 0 {
            return Ok(None);
        }

        let size = self.size;
        let record = self
            .segments
            .read_next()?
            .with_context(|| CorruptQueueStateSnafu {
                reason: format!(
                    "{size} records enqueued but tail {:?} has reached head {:?}",
                    self.segments.tail(),
                    self.segments.head()
                ),
            })?;
        self.size -= 1;

        if self.sync_mode.every_op() {
            self.persist()?;
        }
        Ok(Some(record))
    }

    /// Number of records enqueued. Never touches the disk.
    pub fn len(&self) -> usize { usize::try_from(self.size).unwrap_or(usize::MAX) }

    pub const fn is_empty(&self) -> bool { self.size == 0 }

    pub fn path(&self) -> &Path { &self.dir }

    /// Makes all pushes and pops so far durable, regardless of sync mode.
    pub fn flush(&mut self) -> Result<()> { self.persist() }

    /// Flushes and releases the queue. An empty queue removes its segment
    /// files and metadata, leaving the directory empty.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;

        let empty = self.size == 0;
        let dir = self.dir.clone();
        let metadata = self.metadata.clone();
        // Release the file handles before deleting anything.
        drop(self);

        if empty {
            let removed = remove_all_segments(&dir)?;
            metadata.remove()?;
            info!(path = ?dir, segments = removed, "Empty fifo queue closed and removed");
        } else {
            info!(path = ?dir, "Fifo queue closed");
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        self.segments.sync()?;
        self.metadata.save(&self.segments.metadata(self.size))?;
        self.segments.reclaim()
    }
}

impl RecordQueue for FifoQueue {
    fn push(&mut self, data: &[u8]) -> Result<()> { Self::push(self, data) }

    fn pop(&mut self) -> Result<Option<Vec<u8>>> { Self::pop(self) }

    fn len(&self) -> usize { Self::len(self) }

    fn close(self) -> Result<()> { Self::close(self) }
}

impl Drop for FifoQueue {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.persist() {
            warn!(path = ?self.dir, error = %e, "Failed to flush fifo queue on drop");
        }
    }
}
