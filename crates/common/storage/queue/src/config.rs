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

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Default maximum number of records per segment.
pub const DEFAULT_CHUNK_SIZE: u64 = 100_000;

/// Default maximum byte size per segment.
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 10_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Records per segment before the write side rotates.
    #[default(DEFAULT_CHUNK_SIZE)]
    pub chunk_size:      u64,
    /// Bytes per segment before the write side rotates.
    #[default(DEFAULT_FILE_SIZE_LIMIT)]
    pub file_size_limit: u64,
    pub sync_mode:       SyncMode,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chunk_size > 0,
            InvalidConfigSnafu {
                reason: "chunk_size must be > 0".to_string(),
            }
        );
        ensure!(
            self.file_size_limit > 0,
            InvalidConfigSnafu {
                reason: "file_size_limit must be > 0".to_string(),
            }
        );
        Ok(())
    }
}

/// When cursor state is made durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Persist after every push and pop.
    #[default]
    EveryOp,
    /// Persist only on flush and close.
    OnClose,
}

impl SyncMode {
    pub const fn every_op(self) -> bool { matches!(self, Self::EveryOp) }
}
