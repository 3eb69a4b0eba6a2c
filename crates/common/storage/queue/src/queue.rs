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

//! The operations every queue backend shares.
//!
//! ## Usage
//!
//! ```ignore
//! let mut queue = QueueBuilder::new("/path/to/queue").chunk_size(1024).build()?;
//!
//! queue.push(b"hello")?;
//! while let Some(record) = queue.pop()? {
//!     println!("{record:?}");
//! }
//!
//! // Releases handles; an empty queue leaves nothing on disk.
//! queue.close()?;
//! ```

use crate::Result;

/// A queue of opaque byte records.
///
/// Implementations are single-threaded: every call runs to completion before
/// the next one starts. Share an instance across threads only behind a lock.
pub trait RecordQueue {
    fn push(&mut self, data: &[u8]) -> Result<()>;

    /// Removes the next record, or returns `None` when the queue is empty.
    fn pop(&mut self) -> Result<Option<Vec<u8>>>;

    /// Number of records currently enqueued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Flushes state and releases resources.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
