//! Hand-written cryptographic primitives for the controller protocol.
//!
//! The deployment environment offers no system crypto library, so the AES
//! block cipher and CRC32 checksum are implemented from scratch and verified
//! against published test vectors.

mod aes;
mod crc32;

pub use aes::{BLOCK_SIZE, KEY_LEN, ecb_decrypt, ecb_encrypt};
pub use crc32::crc32;

use thiserror::Error;

/// Errors from the cipher engine.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key is not exactly 16 bytes.
    #[error("cipher key must be 16 bytes, got {len}")]
    KeyLength {
        /// Length of the key supplied by the caller.
        len: usize,
    },

    /// Ciphertext length is not a multiple of the block size.
    #[error("ciphertext length {len} is not a multiple of 16")]
    CiphertextLength {
        /// Length of the ciphertext supplied by the caller.
        len: usize,
    },
}

/// Result type alias for cipher operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
