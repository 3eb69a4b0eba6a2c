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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Queue operation errors.
///
/// None of these are retried or swallowed inside the crate; every failure
/// surfaces to the direct caller.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// Filesystem I/O failure on a queue file or directory.
    #[snafu(display("IO error on {}: {source}", path.display()))]
    Io { path: PathBuf, source: io::Error },

    /// The record stream failed while a frame was being read.
    #[snafu(display("Failed to read record: {source}"))]
    ReadRecord { source: io::Error },

    /// The metadata file exists but cannot be parsed or is inconsistent.
    #[snafu(display("Corrupt metadata at {}: {reason}", path.display()))]
    CorruptMetadata { path: PathBuf, reason: String },

    /// A record header promised more bytes than were available.
    #[snafu(display("Truncated record: expected {expected} bytes, got {actual}"))]
    TruncatedRecord { expected: u64, actual: u64 },

    /// Cursor arithmetic implies data that is not on disk.
    #[snafu(display("Corrupt queue state: {reason}"))]
    CorruptQueueState { reason: String },

    /// The record length does not fit the 4-byte header.
    #[snafu(display("Record of {len} bytes exceeds the 4-byte length header"))]
    RecordTooLarge { len: usize },

    /// Rejected configuration value.
    #[snafu(display("Invalid queue configuration: {reason}"))]
    InvalidConfig { reason: String },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
