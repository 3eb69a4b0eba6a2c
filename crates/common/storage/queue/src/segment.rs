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

//! Segment files backing the FIFO queue.
//!
//! ## Layout
//!
//! ```text
//!   tail                                  head
//!    │                                     │
//!    ▼                                     ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ segment-00003│ │ segment-00004│ │ segment-00005│
//! │ (read handle)│ │   (sealed)   │ │(write handle)│
//! └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! The store keeps two handles open: the head segment for writing and the
//! tail segment for reading. Both may refer to the same file. Segments below
//! the head are sealed and never written again.
//!
//! ## Rolling
//!
//! After each append the head rolls to a fresh segment once it holds
//! `chunk_size` records or `file_size_limit` bytes. A record that would push a
//! non-empty head past `file_size_limit` rolls the head first, so a record
//! never straddles two segments. A roll that fails after the record was
//! written is retried before the next append.
//!
//! A write that fails part-way is cut back to the last complete frame before
//! the error is returned, so the head segment only ever holds whole records.
//!
//! ## Reclamation
//!
//! A sealed tail segment is exhausted once the read offset reaches its length.
//! The reader then moves to the next segment and the exhausted index is queued
//! in `retired`; the owner deletes those files with [`SegmentStore::reclaim`]
//! after it has persisted the cursor that moved past them.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use snafu::{ResultExt, ensure};
use tracing::{debug, warn};

use crate::{
    Result,
    codec::{self, RECORD_LENGTH_SIZE},
    error::{CorruptQueueStateSnafu, IoSnafu},
    metadata::{QueueMetadata, ReadCursor, WriteCursor},
    path::{scan_segment_files, segment_path},
};

/// Open handles and cursors over the segment files of one directory.
#[derive(Debug)]
pub struct SegmentStore {
    dir:             PathBuf,
    chunk_size:      u64,
    file_size_limit: u64,
    /// Next write position.
    head:            WriteCursor,
    /// Bytes in the head segment.
    head_bytes:      u64,
    head_path:       PathBuf,
    /// Next read position.
    tail:            ReadCursor,
    tail_path:       PathBuf,
    /// Write handle on the head segment, positioned at `head_bytes`.
    writer:          File,
    /// Read handle on the tail segment, positioned at `tail.offset`.
    reader:          BufReader<File>,
    /// A failed write may have left part of a frame past `head_bytes`.
    torn:            bool,
    /// Exhausted segments waiting to be deleted.
    retired:         Vec<u64>,
}

impl SegmentStore {
    /// Opens the head and tail segments described by `metadata`.
    ///
    /// The head segment is checked to hold exactly `head.count` records.
    /// Trailing bytes past them belong to writes whose metadata never landed
    /// and are truncated away.
    pub fn open<P: AsRef<Path>>(dir: P, metadata: &QueueMetadata) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let head = metadata.head;
        let tail = metadata.tail;

        let head_path = segment_path(&dir, head.segment);
        let head_bytes = recover_head(&head_path, head.count)?;
        let mut writer = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&head_path)
            .context(IoSnafu { path: &head_path })?;
        let on_disk = writer
            .metadata()
            .context(IoSnafu { path: &head_path })?
            .len();
        if on_disk > head_bytes {
            warn!(
                path = ?head_path,
                acknowledged = head_bytes,
                on_disk,
                "Discarding unacknowledged bytes at end of head segment"
            );
            writer
                .set_len(head_bytes)
                .and_then(|()| writer.sync_data())
                .context(IoSnafu { path: &head_path })?;
        }
        writer
            .seek(SeekFrom::Start(head_bytes))
            .context(IoSnafu { path: &head_path })?;

        let tail_path = segment_path(&dir, tail.segment);
        let reader = open_reader(&tail_path, tail.offset)?;

        let mut store = Self {
            dir,
            chunk_size: metadata.chunk_size,
            file_size_limit: metadata.file_size_limit,
            head,
            head_bytes,
            head_path,
            tail,
            tail_path,
            writer,
            reader,
            torn: false,
            retired: Vec::new(),
        };
        store.advance_exhausted()?;

        debug!(
            dir = ?store.dir,
            head = ?store.head,
            tail = ?store.tail,
            head_bytes = store.head_bytes,
            "Segments opened"
        );
        Ok(store)
    }

    pub const fn head(&self) -> WriteCursor { self.head }

    pub const fn tail(&self) -> ReadCursor { self.tail }

    /// Whether the reader has caught up with the writer.
    pub fn is_drained(&self) -> bool { self.tail.reached(self.head) }

    /// Metadata snapshot for the current cursors and the given logical size.
    pub const fn metadata(&self, size: u64) -> QueueMetadata {
        QueueMetadata {
            chunk_size: self.chunk_size,
            file_size_limit: self.file_size_limit,
            size,
            head: self.head,
            tail: self.tail,
        }
    }

    /// Appends one framed record to the head segment, rolling as needed.
    ///
    /// On error nothing is counted and no partial frame stays in the head
    /// segment.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        let frame = codec::encode(payload)?;
        let frame_len = frame.len() as u64;

        if self.torn {
            self.discard_partial_frame()?;
        }

        let overflows = self.head.count > 0 && self.head_bytes + frame_len > self.file_size_limit;
        if self.is_full() || overflows {
            self.roll()?;
        }

        if let Err(source) = self.writer.write_all(&frame) {
            self.torn = true;
            if let Err(e) = self.discard_partial_frame() {
                warn!(
                    path = ?self.head_path,
                    error = %e,
                    "Failed to discard partial frame, retrying on next append"
                );
            }
            return Err(source).context(IoSnafu {
                path: &self.head_path,
            });
        }
        self.head.count += 1;
        self.head_bytes += frame_len;

        if self.is_full() {
            // The record is already written; the next append retries the roll.
            if let Err(e) = self.roll() {
                warn!(path = ?self.head_path, error = %e, "Failed to roll full segment");
            }
        }
        Ok(())
    }

    /// Reads the record at the tail, or `None` when the reader has caught up
    /// with the writer.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        // The head may have rolled after the reader caught up with it.
        self.advance_exhausted()?;
        if self.is_drained() {
            return Ok(None);
        }

        let payload = codec::decode(&mut self.reader)?;
        self.tail.count += 1;
        self.tail.offset += codec::record_disk_size(payload.len());

        self.advance_exhausted()?;
        Ok(Some(payload))
    }

    /// Makes appended records durable.
    pub fn sync(&self) -> Result<()> {
        self.writer.sync_data().context(IoSnafu {
            path: &self.head_path,
        })
    }

    /// Deletes segments the reader has moved past.
    pub fn reclaim(&mut self) -> Result<()> {
        for index in self.retired.drain(..) {
            let path = segment_path(&self.dir, index);
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = ?path, "Segment reclaimed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).context(IoSnafu { path }),
            }
        }
        Ok(())
    }

    const fn is_full(&self) -> bool {
        self.head.count >= self.chunk_size || self.head_bytes >= self.file_size_limit
    }

    /// Seals the head segment and opens the next one.
    fn roll(&mut self) -> Result<()> {
        self.sync()?;

        let next = self.head.segment + 1;
        let path = segment_path(&self.dir, next);
        // Truncate: the index may hold bytes from an abandoned earlier run.
        self.writer = File::create(&path).context(IoSnafu { path: &path })?;

        debug!(
            from = self.head.segment,
            to = next,
            records = self.head.count,
            bytes = self.head_bytes,
            "Rolled to new segment"
        );

        self.head = WriteCursor {
            segment: next,
            count:   0,
        };
        self.head_bytes = 0;
        self.head_path = path;
        Ok(())
    }

    /// Cuts the head segment back to its last complete frame.
    fn discard_partial_frame(&mut self) -> Result<()> {
        self.writer
            .set_len(self.head_bytes)
            .and_then(|()| self.writer.seek(SeekFrom::Start(self.head_bytes)))
            .context(IoSnafu {
                path: &self.head_path,
            })?;
        self.torn = false;

        debug!(path = ?self.head_path, head_bytes = self.head_bytes, "Partial frame discarded");
        Ok(())
    }

    /// Moves the reader past sealed segments it has fully consumed.
    fn advance_exhausted(&mut self) -> Result<()> {
        while self.tail.segment < self.head.segment {
            let len = self
                .reader
                .get_ref()
                .metadata()
                .context(IoSnafu {
                    path: &self.tail_path,
                })?
                .len();
            if self.tail.offset < len {
                break;
            }

            let exhausted = self.tail.segment;
            let next = ReadCursor {
                segment: exhausted + 1,
                count:   0,
                offset:  0,
            };
            let next_path = segment_path(&self.dir, next.segment);
            self.reader = open_reader(&next_path, 0)?;
            self.tail = next;
            self.tail_path = next_path;
            self.retired.push(exhausted);

            debug!(exhausted, next = next.segment, "Tail advanced to next segment");
        }
        Ok(())
    }
}

/// Deletes every segment file in `dir`.
pub fn remove_all_segments<P: AsRef<Path>>(dir: P) -> Result<usize> {
    let segments = scan_segment_files(dir)?;
    let removed = segments.len();
    for (_, path) in segments {
        fs::remove_file(&path).context(IoSnafu { path: &path })?;
    }
    Ok(removed)
}

/// Opens a read handle on a tail segment at the given byte offset.
fn open_reader(path: &Path, offset: u64) -> Result<BufReader<File>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return CorruptQueueStateSnafu {
                reason: format!("tail segment {} is missing", path.display()),
            }
            .fail();
        }
        Err(e) => return Err(e).context(IoSnafu { path }),
    };

    let len = file.metadata().context(IoSnafu { path })?.len();
    ensure!(
        offset <= len,
        CorruptQueueStateSnafu {
            reason: format!(
                "tail offset {offset} is past the end of {} ({len} bytes)",
                path.display()
            ),
        }
    );

    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(offset))
        .context(IoSnafu { path })?;
    Ok(reader)
}

/// Walks `count` frames from the start of the head segment and returns the
/// byte length they occupy.
fn recover_head(path: &Path, count: u64) -> Result<u64> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            ensure!(
                count == 0,
                CorruptQueueStateSnafu {
                    reason: format!(
                        "head segment {} is missing but should hold {count} records",
                        path.display()
                    ),
                }
            );
            return Ok(0);
        }
        Err(e) => return Err(e).context(IoSnafu { path }),
    };

    let file_len = file.metadata().context(IoSnafu { path })?.len();
    let mut reader = BufReader::new(file);
    let mut offset = 0u64;

    for scanned in 0..count {
        let short = || CorruptQueueStateSnafu {
            reason: format!(
                "head segment {} holds {scanned} complete records, expected {count}",
                path.display()
            ),
        };

        ensure!(offset + RECORD_LENGTH_SIZE as u64 <= file_len, short());
        let mut header = [0u8; RECORD_LENGTH_SIZE];
        reader
            .read_exact(&mut header)
            .context(IoSnafu { path })?;
        let len = codec::decode_len(header);

        offset += RECORD_LENGTH_SIZE as u64 + u64::from(len);
        ensure!(offset <= file_len, short());
        reader
            .seek_relative(i64::from(len))
            .context(IoSnafu { path })?;
    }

    Ok(offset)
}
