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

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod fifo;
pub mod lifo;
pub mod memory;
pub mod metadata;
pub mod path;
pub mod queue;
pub mod segment;

pub use builder::QueueBuilder;
pub use config::{QueueConfig, SyncMode};
pub use error::{QueueError, Result};
pub use fifo::FifoQueue;
pub use lifo::LifoQueue;
pub use memory::{Discipline, MemoryQueue};
pub use metadata::{QueueMetadata, ReadCursor, WriteCursor};
pub use queue::RecordQueue;
