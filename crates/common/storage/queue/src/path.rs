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

//! File naming for a FIFO storage directory.
//!
//! All segment paths go through [`segment_path`] so the write side and the
//! read side can never disagree on formatting.

use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::{Result, error::IoSnafu};

/// Prefix shared by every segment file name.
pub const SEGMENT_PREFIX: &str = "segment-";

/// Metadata file name inside the storage directory.
pub const METADATA_FILE: &str = "info.json";

/// Scratch file the metadata is written to before being renamed into place.
pub const METADATA_TMP_FILE: &str = "info.json.tmp";

/// Generates a segment file name: `segment-NNNNN`.
pub fn segment_file_name(index: u64) -> String { format!("{SEGMENT_PREFIX}{index:05}") }

/// Returns full path to a segment file: `base/segment-NNNNN`.
pub fn segment_path<P: AsRef<Path>>(base: P, index: u64) -> PathBuf {
    base.as_ref().join(segment_file_name(index))
}

pub fn metadata_path<P: AsRef<Path>>(base: P) -> PathBuf { base.as_ref().join(METADATA_FILE) }

pub fn metadata_tmp_path<P: AsRef<Path>>(base: P) -> PathBuf {
    base.as_ref().join(METADATA_TMP_FILE)
}

/// Parses the segment index out of a file name, if it is a segment file.
pub fn parse_segment_index(file_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix(SEGMENT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lists all segment files in the directory, sorted by index.
pub fn scan_segment_files<P: AsRef<Path>>(base: P) -> Result<Vec<(u64, PathBuf)>> {
    let base = base.as_ref();
    let mut segments = Vec::new();
    if !base.exists() {
        return Ok(segments);
    }

    for entry in std::fs::read_dir(base).context(IoSnafu { path: base })? {
        let entry = entry.context(IoSnafu { path: base })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(index) = entry.file_name().to_str().and_then(parse_segment_index) {
            segments.push((index, path));
        }
    }

    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}
