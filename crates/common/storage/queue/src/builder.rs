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

use std::path::PathBuf;

use crate::{FifoQueue, LifoQueue, QueueConfig, Result, SyncMode};

pub struct QueueBuilder {
    path:   PathBuf,
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path:   path.into(),
            config: QueueConfig::default(),
        }
    }

    #[must_use]
    pub fn chunk_size(mut self, records: u64) -> Self {
        self.config.chunk_size = records;
        self
    }

    #[must_use]
    pub fn file_size_limit(mut self, bytes: u64) -> Self {
        self.config.file_size_limit = bytes;
        self
    }

    #[must_use]
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Opens a FIFO queue with the path as its storage directory.
    pub fn build(self) -> Result<FifoQueue> { FifoQueue::open(self.path, self.config) }

    /// Opens a LIFO queue with the path as its single file.
    pub fn build_lifo(self) -> Result<LifoQueue> {
        LifoQueue::open(self.path, self.config.sync_mode)
    }
}
