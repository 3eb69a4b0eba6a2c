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

//! Durable cursor state for the FIFO queue.
//!
//! The metadata lets a queue reopen without scanning its segments. It is a
//! small JSON document stored as `info.json` in the storage directory:
//!
//! ```text
//! {"chunk_size":N,"file_size_limit":N,"size":N,
//!  "head":[segment,count],"tail":[segment,count,offset]}
//! ```
//!
//! ## Atomic Replace
//!
//! The document is written to `info.json.tmp`, synced, and renamed over
//! `info.json`. A reader therefore sees either the previous or the next
//! complete document, never a torn one.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    QueueConfig, Result,
    error::{CorruptMetadataSnafu, IoSnafu},
    path::{metadata_path, metadata_tmp_path},
};

/// Next write position: segment index and records already in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct WriteCursor {
    pub segment: u64,
    pub count:   u64,
}

/// Next read position: segment index, records consumed from it, and the byte
/// offset of the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "(u64, u64, u64)", into = "(u64, u64, u64)")]
pub struct ReadCursor {
    pub segment: u64,
    pub count:   u64,
    pub offset:  u64,
}

impl From<(u64, u64)> for WriteCursor {
    fn from((segment, count): (u64, u64)) -> Self { Self { segment, count } }
}

impl From<WriteCursor> for (u64, u64) {
    fn from(cursor: WriteCursor) -> Self { (cursor.segment, cursor.count) }
}

impl From<(u64, u64, u64)> for ReadCursor {
    fn from((segment, count, offset): (u64, u64, u64)) -> Self {
        Self {
            segment,
            count,
            offset,
        }
    }
}

impl From<ReadCursor> for (u64, u64, u64) {
    fn from(cursor: ReadCursor) -> Self { (cursor.segment, cursor.count, cursor.offset) }
}

impl ReadCursor {
    /// Position in the same `(segment, count)` ordering as [`WriteCursor`].
    pub const fn position(&self) -> WriteCursor {
        WriteCursor {
            segment: self.segment,
            count:   self.count,
        }
    }

    /// Whether the reader has caught up with the writer.
    pub fn reached(&self, head: WriteCursor) -> bool { self.position() == head }
}

/// Persisted queue state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetadata {
    pub chunk_size:      u64,
    pub file_size_limit: u64,
    /// Number of records currently enqueued.
    pub size:            u64,
    pub head:            WriteCursor,
    pub tail:            ReadCursor,
}

impl QueueMetadata {
    /// State of a queue that has never been written.
    pub const fn fresh(config: &QueueConfig) -> Self {
        Self {
            chunk_size:      config.chunk_size,
            file_size_limit: config.file_size_limit,
            size:            0,
            head:            WriteCursor {
                segment: 0,
                count:   0,
            },
            tail:            ReadCursor {
                segment: 0,
                count:   0,
                offset:  0,
            },
        }
    }

    /// Checks the cursor invariants, reporting violations against `path`.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let corrupt = |reason: String| CorruptMetadataSnafu {
            path: path.to_path_buf(),
            reason,
        };

        ensure!(
            self.chunk_size > 0 && self.file_size_limit > 0,
            corrupt(format!(
                "non-positive limits: chunk_size={}, file_size_limit={}",
                self.chunk_size, self.file_size_limit
            ))
        );
        ensure!(
            self.tail.position() <= self.head,
            corrupt(format!("tail {:?} is ahead of head {:?}", self.tail, self.head))
        );
        ensure!(
            self.head.count <= self.chunk_size && self.tail.count <= self.chunk_size,
            corrupt(format!(
                "cursor count exceeds chunk_size {}: head={:?}, tail={:?}",
                self.chunk_size, self.head, self.tail
            ))
        );
        ensure!(
            (self.size == 0) == self.tail.reached(self.head),
            corrupt(format!(
                "size {} disagrees with cursors head={:?}, tail={:?}",
                self.size, self.head, self.tail
            ))
        );
        if self.head.segment == self.tail.segment {
            ensure!(
                self.size == self.head.count - self.tail.count,
                corrupt(format!(
                    "size {} disagrees with single-segment span {}..{}",
                    self.size, self.tail.count, self.head.count
                ))
            );
        }
        Ok(())
    }
}

/// Reads and atomically replaces `info.json` in a storage directory.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path:     PathBuf,
    tmp_path: PathBuf,
    dir:      PathBuf,
}

impl MetadataStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            path:     metadata_path(dir),
            tmp_path: metadata_tmp_path(dir),
            dir:      dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Loads and validates the metadata. Returns `None` for a fresh queue.
    pub fn load(&self) -> Result<Option<QueueMetadata>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(IoSnafu { path: &self.path }),
        };

        let metadata: QueueMetadata = serde_json::from_slice(&data).map_err(|e| {
            CorruptMetadataSnafu {
                path:   self.path.clone(),
                reason: e.to_string(),
            }
            .build()
        })?;
        metadata.validate(&self.path)?;

        debug!(path = ?self.path, ?metadata, "Metadata loaded");
        Ok(Some(metadata))
    }

    /// Writes the full record and makes it durable under the canonical path.
    pub fn save(&self, metadata: &QueueMetadata) -> Result<()> {
        let data = serde_json::to_vec(metadata)
            .map_err(std::io::Error::from)
            .context(IoSnafu {
                path: &self.tmp_path,
            })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)
            .context(IoSnafu {
                path: &self.tmp_path,
            })?;
        file.write_all(&data)
            .and_then(|()| file.sync_all())
            .context(IoSnafu {
                path: &self.tmp_path,
            })?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path).context(IoSnafu { path: &self.path })?;
        sync_dir(&self.dir)?;

        debug!(path = ?self.path, size = metadata.size, "Metadata written");
        Ok(())
    }

    /// Removes the metadata file and any leftover scratch file.
    pub fn remove(&self) -> Result<()> {
        for path in [&self.path, &self.tmp_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).context(IoSnafu { path: path.as_path() }),
            }
        }
        Ok(())
    }
}

/// Makes a rename inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .context(IoSnafu { path: dir })
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_dir(_dir: &Path) -> Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    fn sample() -> QueueMetadata {
        QueueMetadata {
            chunk_size:      2,
            file_size_limit: 1024,
            size:            3,
            head:            WriteCursor {
                segment: 2,
                count:   1,
            },
            tail:            ReadCursor {
                segment: 1,
                count:   0,
                offset:  0,
            },
        }
    }

    #[test]
    fn test_fresh_start_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        assert!(store.load().unwrap().is_none());

        let fresh = QueueMetadata::fresh(&QueueConfig::default());
        assert_eq!(fresh.size, 0);
        assert_eq!(fresh.head, WriteCursor::default());
        assert!(fresh.tail.reached(fresh.head));
        fresh.validate(store.path()).unwrap();
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
        assert!(!metadata_tmp_path(temp_dir.path()).exists());
    }

    #[test]
    fn test_json_layout() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "chunk_size": 2,
                "file_size_limit": 1024,
                "size": 3,
                "head": [2, 1],
                "tail": [1, 0, 0],
            })
        );
    }

    #[test]
    fn test_unparsable_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        fs::write(store.path(), b"{\"size\": ").unwrap();

        assert!(matches!(
            store.load(),
            Err(QueueError::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        fs::write(
            store.path(),
            br#"{"chunk_size":2,"file_size_limit":10,"size":1,"head":[0,-1],"tail":[0,0,0]}"#,
        )
        .unwrap();

        assert!(matches!(
            store.load(),
            Err(QueueError::CorruptMetadata { .. })
        ));
    }

    #[test_case(|m: &mut QueueMetadata| m.tail.segment = 3 ; "tail ahead of head")]
    #[test_case(|m: &mut QueueMetadata| m.size = 0 ; "empty size with distinct cursors")]
    #[test_case(|m: &mut QueueMetadata| m.chunk_size = 0 ; "zero chunk size")]
    #[test_case(|m: &mut QueueMetadata| m.head.count = 5 ; "head count past chunk size")]
    #[test_case(|m: &mut QueueMetadata| {
        m.tail = ReadCursor { segment: 2, count: 0, offset: 0 };
        m.size = 3;
    } ; "single segment span mismatch")]
    fn test_inconsistent_fields_rejected(mutate: fn(&mut QueueMetadata)) {
        let mut metadata = sample();
        mutate(&mut metadata);
        assert!(matches!(
            metadata.validate(Path::new("info.json")),
            Err(QueueError::CorruptMetadata { .. })
        ));
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        store.save(&sample()).unwrap();
        fs::write(metadata_tmp_path(temp_dir.path()), b"junk").unwrap();

        store.remove().unwrap();
        assert!(!store.path().exists());
        assert!(!metadata_tmp_path(temp_dir.path()).exists());

        // Removing twice is fine.
        store.remove().unwrap();
    }
}
