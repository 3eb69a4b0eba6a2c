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

use std::collections::VecDeque;

use crate::{Result, queue::RecordQueue};

/// Which end of the queue `pop` takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    #[default]
    Fifo,
    Lifo,
}

/// Non-persistent queue with the same contract as the disk-backed ones.
///
/// Useful as a reference model in tests and where durability is not needed.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    records:    VecDeque<Vec<u8>>,
    discipline: Discipline,
}

impl MemoryQueue {
    pub const fn new(discipline: Discipline) -> Self {
        Self {
            records: VecDeque::new(),
            discipline,
        }
    }

    pub const fn fifo() -> Self { Self::new(Discipline::Fifo) }

    pub const fn lifo() -> Self { Self::new(Discipline::Lifo) }

    pub const fn discipline(&self) -> Discipline { self.discipline }
}

impl RecordQueue for MemoryQueue {
    fn push(&mut self, data: &[u8]) -> Result<()> {
        self.records.push_back(data.to_vec());
        Ok(())
    }

    fn pop(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(match self.discipline {
            Discipline::Fifo => self.records.pop_front(),
            Discipline::Lifo => self.records.pop_back(),
        })
    }

    fn len(&self) -> usize { self.records.len() }

    fn close(self) -> Result<()> { Ok(()) }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Discipline::Fifo, &[b"a", b"b", b"c"] ; "fifo pops oldest first")]
    #[test_case(Discipline::Lifo, &[b"c", b"b", b"a"] ; "lifo pops newest first")]
    fn test_pop_order(discipline: Discipline, expected: &[&[u8; 1]]) {
        let mut queue = MemoryQueue::new(discipline);
        for record in [b"a", b"b", b"c"] {
            queue.push(record).unwrap();
        }
        assert_eq!(queue.len(), 3);

        for record in expected {
            assert_eq!(queue.pop().unwrap().unwrap(), record.to_vec());
        }
        assert!(queue.pop().unwrap().is_none());
        assert!(queue.is_empty());
        queue.close().unwrap();
    }

    #[test]
    fn test_default_is_fifo() {
        assert_eq!(MemoryQueue::default().discipline(), Discipline::Fifo);
        assert_eq!(MemoryQueue::lifo().discipline(), Discipline::Lifo);
    }
}
