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

//! Record framing shared by the FIFO and LIFO backends.
//!
//! ## On-Disk Record Format
//!
//! FIFO segments store records as a length prefix followed by the payload:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┐
//! │  Length (4B)    │   Payload (variable) │
//! │  big-endian     │   raw bytes          │
//! └─────────────────┴──────────────────────┘
//! ```
//!
//! The LIFO file uses the same 4-byte big-endian length field, placed after
//! the payload so records can be popped from the end of the file.
//!
//! A record never spans two segments, so a reader always finds a whole frame
//! at the tail offset.

use std::io::{ErrorKind, Read};

use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{ReadRecordSnafu, RecordTooLargeSnafu, TruncatedRecordSnafu},
};

/// Size of the length field in bytes (4 bytes = u32).
pub const RECORD_LENGTH_SIZE: usize = 4;

/// Largest payload the length field can describe.
pub const MAX_RECORD_LEN: usize = u32::MAX as usize;

/// Total on-disk size of a record with the given payload length.
#[inline]
pub const fn record_disk_size(payload_len: usize) -> u64 {
    (RECORD_LENGTH_SIZE + payload_len) as u64
}

/// Encodes a payload length into its 4-byte big-endian header.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_len(len: usize) -> Result<[u8; RECORD_LENGTH_SIZE]> {
    ensure!(len <= MAX_RECORD_LEN, RecordTooLargeSnafu { len });
    Ok((len as u32).to_be_bytes())
}

#[inline]
pub const fn decode_len(header: [u8; RECORD_LENGTH_SIZE]) -> u32 { u32::from_be_bytes(header) }

/// Frames a payload: header followed by the payload bytes.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let header = encode_len(payload.len())?;
    let mut frame = Vec::with_capacity(RECORD_LENGTH_SIZE + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reads one framed record.
///
/// Fails with `TruncatedRecord` when the reader ends before the header or
/// before the number of payload bytes the header announces.
pub fn decode<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; RECORD_LENGTH_SIZE];
    let got = read_full(reader, &mut header)?;
    ensure!(
        got == RECORD_LENGTH_SIZE,
        TruncatedRecordSnafu {
            expected: RECORD_LENGTH_SIZE as u64,
            actual:   got as u64,
        }
    );

    let len = u64::from(decode_len(header));
    // Bounded by what the reader actually yields, not by the header value.
    let mut payload = Vec::new();
    reader
        .by_ref()
        .take(len)
        .read_to_end(&mut payload)
        .context(ReadRecordSnafu)?;
    ensure!(
        payload.len() as u64 == len,
        TruncatedRecordSnafu {
            expected: len,
            actual:   payload.len() as u64,
        }
    );
    Ok(payload)
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context(ReadRecordSnafu),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    #[test]
    fn test_record_disk_size() {
        assert_eq!(record_disk_size(0), 4);
        assert_eq!(record_disk_size(10), 14);
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(b"abc").unwrap();
        assert_eq!(frame, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test_case(b"" ; "empty payload")]
    #[test_case(b"x" ; "single byte")]
    #[test_case(b"hello world" ; "short text")]
    fn test_decode_encoded(payload: &[u8]) {
        let frame = encode(payload).unwrap();
        let mut reader = Cursor::new(frame);
        assert_eq!(decode(&mut reader).unwrap(), payload);
    }

    #[test]
    fn test_decode_consecutive_frames() {
        let mut data = encode(b"first").unwrap();
        data.extend(encode(b"second").unwrap());
        let mut reader = Cursor::new(data);
        assert_eq!(decode(&mut reader).unwrap(), b"first");
        assert_eq!(decode(&mut reader).unwrap(), b"second");
    }

    #[test]
    fn test_decode_truncated_header() {
        let mut reader = Cursor::new(vec![0u8, 0]);
        let err = decode(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            QueueError::TruncatedRecord {
                expected: 4,
                actual:   2,
            }
        ));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let mut frame = encode(b"payload").unwrap();
        frame.truncate(frame.len() - 3);
        let mut reader = Cursor::new(frame);
        let err = decode(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            QueueError::TruncatedRecord {
                expected: 7,
                actual:   4,
            }
        ));
    }

    #[test]
    fn test_huge_header_does_not_allocate_up_front() {
        let mut reader = Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF, 1, 2]);
        assert!(matches!(
            decode(&mut reader),
            Err(QueueError::TruncatedRecord { actual: 2, .. })
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_encode_len_boundary() {
        assert_eq!(encode_len(MAX_RECORD_LEN).unwrap(), [0xFF; 4]);
        assert!(matches!(
            encode_len(MAX_RECORD_LEN + 1),
            Err(QueueError::RecordTooLarge { .. })
        ));
    }
}
