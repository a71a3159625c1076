//! Frame codec error types.

use thiserror::Error;

/// Errors from frame construction and parsing.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Buffer does not hold the bytes a frame view requires.
    #[error("frame truncated: need {needed} bytes, got {got}")]
    Truncated {
        /// Number of bytes required.
        needed: usize,
        /// Number of bytes available.
        got: usize,
    },

    /// Frame does not begin with the `0x000055AA` prefix.
    #[error("invalid frame prefix: {found:#010x}")]
    InvalidPrefix {
        /// Prefix word actually found.
        found: u32,
    },
}

/// Result type alias for frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;
