//! Binary frame protocol for the controller's LAN interface.
//!
//! Every exchange is one or more self-describing frames:
//!
//! ```text
//! [prefix:4][sequence:4][command:4][length:4][payload...][crc32:4][tail:4]
//! ```
//!
//! All fields are big-endian. `length` counts the payload plus the 8
//! trailing CRC/tail bytes, so a whole frame is `16 + length` bytes.

mod codec;
mod error;

pub use codec::{FrameSlice, FrameView, build_frame, try_parse_one_frame};
pub use error::{FrameError, Result};

/// Frame prefix sentinel.
pub const PREFIX: u32 = 0x0000_55AA;

/// Frame tail sentinel.
pub const TAIL: u32 = 0x0000_AA55;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Trailing CRC32 + tail sentinel size in bytes.
pub const TRAILER_SIZE: usize = 8;

/// State-changing DP write.
pub const CMD_CONTROL: u32 = 7;

/// Keepalive; skipped, never an error.
pub const CMD_HEARTBEAT: u32 = 9;

/// DP snapshot query and its response.
pub const CMD_DP_QUERY: u32 = 10;
