//! Frame build and scan.
//!
//! Building is straightforward concatenation. Scanning has to cope with a
//! stream that arrives in arbitrary pieces: leading garbage, partially
//! received frames, and back-to-back frames (the device interleaves
//! `command = 9` keepalives with real responses). The scanner reports one
//! complete frame at a time and leaves compaction to the caller.

use super::{FrameError, HEADER_SIZE, PREFIX, Result, TAIL, TRAILER_SIZE};
use crate::crypto::crc32;

/// Location of one complete frame within a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlice {
    /// Byte offset of the frame prefix.
    pub start: usize,
    /// Total frame length in bytes.
    pub len: usize,
}

impl FrameSlice {
    /// Offset one past the frame's last byte.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.start + self.len
    }
}

#[inline]
fn read_u32_be(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Build a complete frame around `payload`, with `payload_prefix` prepended
/// inside the payload region (the command-7 version/request-id block).
///
/// The length field is `payload_prefix.len() + payload.len() + 8` and the
/// CRC32 covers every byte before the trailing CRC + tail.
#[must_use]
pub fn build_frame(sequence: u32, command: u32, payload: &[u8], payload_prefix: &[u8]) -> Vec<u8> {
    let length_field = payload_prefix.len() + payload.len() + TRAILER_SIZE;
    let total = HEADER_SIZE + length_field;

    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&PREFIX.to_be_bytes());
    frame.extend_from_slice(&sequence.to_be_bytes());
    frame.extend_from_slice(&command.to_be_bytes());
    frame.extend_from_slice(&(length_field as u32).to_be_bytes());
    frame.extend_from_slice(payload_prefix);
    frame.extend_from_slice(payload);

    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(&TAIL.to_be_bytes());
    frame
}

/// Scan `buf` for the first complete frame.
///
/// Returns `None` while no complete frame is available; the caller keeps
/// appending received bytes and calls again. A prefix match whose declared
/// length runs past the available bytes is not consumed - it may be a frame
/// still arriving, or garbage that happens to contain the magic, in which
/// case a later match wins once more bytes show up.
#[must_use]
pub fn try_parse_one_frame(buf: &[u8]) -> Option<FrameSlice> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    for start in 0..=buf.len() - HEADER_SIZE {
        if buf[start] != 0x00
            || buf[start + 1] != 0x00
            || buf[start + 2] != 0x55
            || buf[start + 3] != 0xAA
        {
            continue;
        }
        let length_field = read_u32_be(buf, start + 12) as usize;
        let Some(total) = HEADER_SIZE.checked_add(length_field) else {
            continue;
        };
        if start + total <= buf.len() {
            return Some(FrameSlice { start, len: total });
        }
    }
    None
}

/// Read-only accessors over one complete frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Wrap `bytes`, which must begin with a complete frame.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE + TRAILER_SIZE,
                got: bytes.len(),
            });
        }
        let prefix = read_u32_be(bytes, 0);
        if prefix != PREFIX {
            return Err(FrameError::InvalidPrefix { found: prefix });
        }
        let total = HEADER_SIZE + read_u32_be(bytes, 12) as usize;
        if bytes.len() < total {
            return Err(FrameError::Truncated {
                needed: total,
                got: bytes.len(),
            });
        }
        Ok(Self {
            bytes: &bytes[..total],
        })
    }

    /// Sequence number field.
    #[must_use]
    pub fn sequence(&self) -> u32 {
        read_u32_be(self.bytes, 4)
    }

    /// Command code field.
    #[must_use]
    pub fn command(&self) -> u32 {
        read_u32_be(self.bytes, 8)
    }

    /// Raw length field (payload plus CRC + tail).
    #[must_use]
    pub fn length_field(&self) -> u32 {
        read_u32_be(self.bytes, 12)
    }

    /// The length-field bytes following the header: the ciphertext region
    /// plus the trailing CRC and tail sentinel.
    #[must_use]
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// Verify the stored CRC32 against the frame contents.
    #[must_use]
    pub fn crc_valid(&self) -> bool {
        let crc_offset = self.bytes.len() - TRAILER_SIZE;
        let stored = read_u32_be(self.bytes, crc_offset);
        crc32(&self.bytes[..crc_offset]) == stored
    }

    /// Whole frame bytes.
    #[must_use]
    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }
}
