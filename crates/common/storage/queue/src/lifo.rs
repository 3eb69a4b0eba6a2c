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

//! Single-file last-in first-out queue.
//!
//! ## File Format
//!
//! ```text
//! ┌─────────────┬────────────┬──────────┬────────────┬──────────┬─────
//! │ Count (4B)  │ Payload 1  │ Len 1    │ Payload 2  │ Len 2    │ ...
//! │ big-endian  │            │ (4B BE)  │            │ (4B BE)  │
//! └─────────────┴────────────┴──────────┴────────────┴──────────┴─────
//! ```
//!
//! The length trails its payload, so the newest record is found by reading
//! the last four bytes of the file. A pop truncates the file back to where
//! that record started.
//!
//! The count header is rewritten on close, or after every operation with
//! [`SyncMode::EveryOp`]. On open the records are walked backward from the
//! end of the file, and the walked count wins over a stale header.
//!
//! A push that fails part-way is cut back off the end of the file, and
//! [`LifoQueue::flush`] truncates the file to its last complete record, so a
//! torn trailer never reaches the backward walk.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    Result, SyncMode,
    codec::{self, RECORD_LENGTH_SIZE},
    error::{CorruptQueueStateSnafu, IoSnafu, TruncatedRecordSnafu},
    queue::RecordQueue,
};

/// Size of the record-count header at offset 0.
pub const COUNT_HEADER_SIZE: u64 = 4;

const TRAILER_SIZE: u64 = RECORD_LENGTH_SIZE as u64;

/// A persistent LIFO queue stored in one file.
///
/// The file is created on open if absent and deleted when an empty queue is
/// closed.
#[derive(Debug)]
pub struct LifoQueue {
    path:      PathBuf,
    sync_mode: SyncMode,
    file:      File,
    /// Records currently stored.
    count:     u64,
    /// End of the last complete record; the next push starts here.
    end:       u64,
    closed:    bool,
}

impl LifoQueue {
    pub fn open<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .context(IoSnafu { path: &path })?;

        let mut end = file.metadata().context(IoSnafu { path: &path })?.len();
        if end == 0 {
            file.write_all(&[0u8; COUNT_HEADER_SIZE as usize])
                .context(IoSnafu { path: &path })?;
            end = COUNT_HEADER_SIZE;
        }
        ensure!(
            end >= COUNT_HEADER_SIZE,
            CorruptQueueStateSnafu {
                reason: format!("{} is shorter than its count header", path.display()),
            }
        );

        let mut header = [0u8; COUNT_HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut header))
            .context(IoSnafu { path: &path })?;
        let stored = u64::from(u32::from_be_bytes(header));

        let mut queue = Self {
            path,
            sync_mode,
            file,
            count: 0,
            end,
            closed: false,
        };
        queue.count = queue.walk_records()?;
        if queue.count != stored {
            warn!(
                path = ?queue.path,
                stored,
                walked = queue.count,
                "Count header is stale, using walked record count"
            );
        }

        info!(path = ?queue.path, count = queue.count, "Lifo queue opened");
        Ok(queue)
    }

    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        let trailer = codec::encode_len(data.len())?;

        let written = self
            .file
            .seek(SeekFrom::Start(self.end))
            .and_then(|_| self.file.write_all(data))
            .and_then(|()| self.file.write_all(&trailer));
        if let Err(source) = written {
            if let Err(e) = self.discard_partial_record() {
                warn!(path = ?self.path, error = %e, "Failed to discard partial record");
            }
            return Err(source).context(IoSnafu { path: &self.path });
        }
        self.end += data.len() as u64 + TRAILER_SIZE;
        self.count += 1;

        if self.sync_mode.every_op() {
            self.flush()?;
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Option<Vec<u8>>> {
        if self.count == 0 {
            return Ok(None);
        }

        let (start, len) = self.record_before(self.end)?;
        let mut payload = Vec::new();
        self.file
            .seek(SeekFrom::Start(start))
            .and_then(|_| (&mut self.file).take(len).read_to_end(&mut payload))
            .context(IoSnafu { path: &self.path })?;
        ensure!(
            payload.len() as u64 == len,
            TruncatedRecordSnafu {
                expected: len,
                actual:   payload.len() as u64,
            }
        );

        self.file
            .set_len(start)
            .context(IoSnafu { path: &self.path })?;
        self.end = start;
        self.count -= 1;

        if self.sync_mode.every_op() {
            self.flush()?;
        }
        Ok(Some(payload))
    }

    pub fn len(&self) -> usize { usize::try_from(self.count).unwrap_or(usize::MAX) }

    pub const fn is_empty(&self) -> bool { self.count == 0 }

    pub fn path(&self) -> &Path { &self.path }

    /// Cuts the file to its last complete record, rewrites the count header
    /// and syncs.
    pub fn flush(&mut self) -> Result<()> {
        let count = u32::try_from(self.count)
            .ok()
            .with_context(|| CorruptQueueStateSnafu {
                reason: format!("{} records do not fit the count header", self.count),
            })?;
        self.file
            .set_len(self.end)
            .and_then(|()| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(&count.to_be_bytes()))
            .and_then(|()| self.file.sync_data())
            .context(IoSnafu { path: &self.path })?;
        debug!(path = ?self.path, count = self.count, "Count header written");
        Ok(())
    }

    /// Writes the count header, or deletes the file if the queue is empty.
    pub fn close(mut self) -> Result<()> {
        if self.count > 0 {
            self.flush()?;
        }
        self.closed = true;

        let empty = self.count == 0;
        let path = self.path.clone();
        drop(self);

        if empty {
            fs::remove_file(&path).context(IoSnafu { path: &path })?;
            info!(path = ?path, "Empty lifo queue closed and removed");
        } else {
            info!(path = ?path, "Lifo queue closed");
        }
        Ok(())
    }

    /// Drops whatever a failed push left past the last complete record.
    fn discard_partial_record(&mut self) -> Result<()> {
        self.file
            .set_len(self.end)
            .context(IoSnafu { path: &self.path })
    }

    /// Locates the record ending at `pos`: its payload offset and length.
    fn record_before(&mut self, pos: u64) -> Result<(u64, u64)> {
        ensure!(
            pos >= COUNT_HEADER_SIZE + TRAILER_SIZE,
            CorruptQueueStateSnafu {
                reason: format!(
                    "{} bytes before offset {pos} cannot hold a length trailer",
                    pos - COUNT_HEADER_SIZE
                ),
            }
        );

        let mut trailer = [0u8; RECORD_LENGTH_SIZE];
        self.file
            .seek(SeekFrom::Start(pos - TRAILER_SIZE))
            .and_then(|_| self.file.read_exact(&mut trailer))
            .context(IoSnafu { path: &self.path })?;
        let len = u64::from(codec::decode_len(trailer));

        let start = (pos - TRAILER_SIZE)
            .checked_sub(len)
            .filter(|start| *start >= COUNT_HEADER_SIZE)
            .with_context(|| CorruptQueueStateSnafu {
                reason: format!("record of {len} bytes ending at {pos} overlaps the header"),
            })?;
        Ok((start, len))
    }

    /// Counts records by walking trailers back from the end to the header.
    fn walk_records(&mut self) -> Result<u64> {
        let mut pos = self.end;
        let mut count = 0;
        while pos > COUNT_HEADER_SIZE {
            let (start, _) = self.record_before(pos)?;
            pos = start;
            count += 1;
        }
        Ok(count)
    }
}

impl RecordQueue for LifoQueue {
    fn push(&mut self, data: &[u8]) -> Result<()> { Self::push(self, data) }

    fn pop(&mut self) -> Result<Option<Vec<u8>>> { Self::pop(self) }

    fn len(&self) -> usize { Self::len(self) }

    fn close(self) -> Result<()> { Self::close(self) }
}

impl Drop for LifoQueue {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(path = ?self.path, error = %e, "Failed to flush lifo queue on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    #[test_case(SyncMode::EveryOp ; "sync every op")]
    #[test_case(SyncMode::OnClose ; "sync on close")]
    fn test_lifo_order(sync_mode: SyncMode) {
        let temp_dir = TempDir::new().unwrap();
        let mut queue = LifoQueue::open(temp_dir.path().join("stack"), sync_mode).unwrap();

        for i in 0..5 {
            queue.push(format!("item-{i}").as_bytes()).unwrap();
        }
        assert_eq!(queue.len(), 5);

        for i in (0..5).rev() {
            assert_eq!(queue.pop().unwrap().unwrap(), format!("item-{i}").into_bytes());
        }
        assert!(queue.pop().unwrap().is_none());
        queue.close().unwrap();
    }

    #[test]
    fn test_file_layout_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        queue.push(b"a").unwrap();
        queue.push(b"bb").unwrap();
        queue.close().unwrap();

        assert_eq!(
            fs::read(&path).unwrap(),
            vec![0, 0, 0, 2, b'a', 0, 0, 0, 1, b'b', b'b', 0, 0, 0, 2]
        );
    }

    #[test]
    fn test_pop_truncates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        let mut queue = LifoQueue::open(&path, SyncMode::EveryOp).unwrap();
        queue.push(b"first").unwrap();
        queue.push(b"second").unwrap();

        queue.pop().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 4 + 5 + 4);
        assert_eq!(fs::read(&path).unwrap()[..4], [0, 0, 0, 1]);
    }

    #[test]
    fn test_reopen_preserves_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");

        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        queue.push(b"bottom").unwrap();
        queue.push(b"").unwrap();
        queue.push(b"top").unwrap();
        queue.close().unwrap();

        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().unwrap(), b"top");
        assert_eq!(queue.pop().unwrap().unwrap(), b"");
        assert_eq!(queue.pop().unwrap().unwrap(), b"bottom");
        queue.close().unwrap();
    }

    #[test]
    fn test_close_empty_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        let mut queue = LifoQueue::open(&path, SyncMode::EveryOp).unwrap();
        assert!(path.exists());

        queue.push(b"x").unwrap();
        queue.pop().unwrap();
        queue.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_header_is_recounted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        fs::write(&path, [0, 0, 0, 0, b'h', b'i', 0, 0, 0, 2, b'!', 0, 0, 0, 1]).unwrap();

        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().unwrap(), b"!");
        assert_eq!(queue.pop().unwrap().unwrap(), b"hi");
    }

    #[test_case(&[0, 0, 0] ; "shorter than header")]
    #[test_case(&[0, 0, 0, 1, 0, 0] ; "dangling bytes")]
    #[test_case(&[0, 0, 0, 1, b'x', 0, 0, 0, 9] ; "length overlaps header")]
    fn test_corrupt_file_rejected(contents: &[u8]) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        fs::write(&path, contents).unwrap();

        assert!(matches!(
            LifoQueue::open(&path, SyncMode::OnClose),
            Err(QueueError::CorruptQueueState { .. })
        ));
    }

    #[test]
    fn test_drop_without_close_writes_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        {
            let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
            queue.push(b"kept").unwrap();
        }
        assert_eq!(fs::read(&path).unwrap()[..4], [0, 0, 0, 1]);
    }

    #[test]
    fn test_failed_push_is_not_counted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        queue.push(b"kept").unwrap();

        // Writes through a read-only handle fail.
        queue.file = File::open(&path).unwrap();
        assert!(matches!(queue.push(b"lost"), Err(QueueError::Io { .. })));
        assert_eq!(queue.len(), 1);

        queue.file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        queue.push(b"next").unwrap();
        assert_eq!(queue.pop().unwrap().unwrap(), b"next");
        assert_eq!(queue.pop().unwrap().unwrap(), b"kept");
        queue.close().unwrap();
    }

    #[test]
    fn test_flush_cuts_torn_trailer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        queue.push(b"a").unwrap();
        queue.push(b"bb").unwrap();

        // Payload and half a trailer of a push that never completed.
        queue.file.seek(SeekFrom::End(0)).unwrap();
        queue.file.write_all(&[b'x', 0, 0]).unwrap();
        queue.close().unwrap();

        let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().unwrap(), b"bb");
        assert_eq!(queue.pop().unwrap().unwrap(), b"a");
        queue.close().unwrap();
    }

    #[test]
    fn test_drop_when_emptied_resets_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stack");
        {
            let mut queue = LifoQueue::open(&path, SyncMode::OnClose).unwrap();
            queue.push(b"gone").unwrap();
            queue.flush().unwrap();
            queue.pop().unwrap();
        }
        assert_eq!(fs::read(&path).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("stack");
        let queue = LifoQueue::open(&path, SyncMode::EveryOp).unwrap();
        assert!(path.exists());
        queue.close().unwrap();
        assert!(!path.exists());
    }
}
