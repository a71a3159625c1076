//! Minimal AES-128 in ECB mode with PKCS#7 padding.
//!
//! The state is laid out column-major (4x4 byte matrix read column-first),
//! so the `ShiftRows` index swaps below are fixed against that layout.

use super::{CryptoError, Result};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

/// 11 round keys of 16 bytes each.
const SCHEDULE_LEN: usize = 176;

const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab,
    0x76, 0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4,
    0x72, 0xc0, 0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71,
    0xd8, 0x31, 0x15, 0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2,
    0xeb, 0x27, 0xb2, 0x75, 0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6,
    0xb3, 0x29, 0xe3, 0x2f, 0x84, 0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb,
    0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf, 0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45,
    0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8, 0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5,
    0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2, 0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44,
    0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73, 0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a,
    0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb, 0xe0, 0x32, 0x3a, 0x0a, 0x49,
    0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79, 0xe7, 0xc8, 0x37, 0x6d,
    0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08, 0xba, 0x78, 0x25,
    0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a, 0x70, 0x3e,
    0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e, 0xe1,
    0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb,
    0x16,
];

const INV_SBOX: [u8; 256] = [
    0x52, 0x09, 0x6a, 0xd5, 0x30, 0x36, 0xa5, 0x38, 0xbf, 0x40, 0xa3, 0x9e, 0x81, 0xf3, 0xd7,
    0xfb, 0x7c, 0xe3, 0x39, 0x82, 0x9b, 0x2f, 0xff, 0x87, 0x34, 0x8e, 0x43, 0x44, 0xc4, 0xde,
    0xe9, 0xcb, 0x54, 0x7b, 0x94, 0x32, 0xa6, 0xc2, 0x23, 0x3d, 0xee, 0x4c, 0x95, 0x0b, 0x42,
    0xfa, 0xc3, 0x4e, 0x08, 0x2e, 0xa1, 0x66, 0x28, 0xd9, 0x24, 0xb2, 0x76, 0x5b, 0xa2, 0x49,
    0x6d, 0x8b, 0xd1, 0x25, 0x72, 0xf8, 0xf6, 0x64, 0x86, 0x68, 0x98, 0x16, 0xd4, 0xa4, 0x5c,
    0xcc, 0x5d, 0x65, 0xb6, 0x92, 0x6c, 0x70, 0x48, 0x50, 0xfd, 0xed, 0xb9, 0xda, 0x5e, 0x15,
    0x46, 0x57, 0xa7, 0x8d, 0x9d, 0x84, 0x90, 0xd8, 0xab, 0x00, 0x8c, 0xbc, 0xd3, 0x0a, 0xf7,
    0xe4, 0x58, 0x05, 0xb8, 0xb3, 0x45, 0x06, 0xd0, 0x2c, 0x1e, 0x8f, 0xca, 0x3f, 0x0f, 0x02,
    0xc1, 0xaf, 0xbd, 0x03, 0x01, 0x13, 0x8a, 0x6b, 0x3a, 0x91, 0x11, 0x41, 0x4f, 0x67, 0xdc,
    0xea, 0x97, 0xf2, 0xcf, 0xce, 0xf0, 0xb4, 0xe6, 0x73, 0x96, 0xac, 0x74, 0x22, 0xe7, 0xad,
    0x35, 0x85, 0xe2, 0xf9, 0x37, 0xe8, 0x1c, 0x75, 0xdf, 0x6e, 0x47, 0xf1, 0x1a, 0x71, 0x1d,
    0x29, 0xc5, 0x89, 0x6f, 0xb7, 0x62, 0x0e, 0xaa, 0x18, 0xbe, 0x1b, 0xfc, 0x56, 0x3e, 0x4b,
    0xc6, 0xd2, 0x79, 0x20, 0x9a, 0xdb, 0xc0, 0xfe, 0x78, 0xcd, 0x5a, 0xf4, 0x1f, 0xdd, 0xa8,
    0x33, 0x88, 0x07, 0xc7, 0x31, 0xb1, 0x12, 0x10, 0x59, 0x27, 0x80, 0xec, 0x5f, 0x60, 0x51,
    0x7f, 0xa9, 0x19, 0xb5, 0x4a, 0x0d, 0x2d, 0xe5, 0x7a, 0x9f, 0x93, 0xc9, 0x9c, 0xef, 0xa0,
    0xe0, 0x3b, 0x4d, 0xae, 0x2a, 0xf5, 0xb0, 0xc8, 0xeb, 0xbb, 0x3c, 0x83, 0x53, 0x99, 0x61,
    0x17, 0x2b, 0x04, 0x7e, 0xba, 0x77, 0xd6, 0x26, 0xe1, 0x69, 0x14, 0x63, 0x55, 0x21, 0x0c,
    0x7d,
];

const RCON: [u8; 11] = [
    0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1B, 0x36,
];

/// Expand a 16-byte key into the 176-byte round-key schedule.
fn expand_key(key: &[u8; KEY_LEN]) -> [u8; SCHEDULE_LEN] {
    let mut schedule = [0u8; SCHEDULE_LEN];
    schedule[..KEY_LEN].copy_from_slice(key);

    let mut generated = KEY_LEN;
    let mut rcon_iter = 1;
    while generated < SCHEDULE_LEN {
        let mut word = [
            schedule[generated - 4],
            schedule[generated - 3],
            schedule[generated - 2],
            schedule[generated - 1],
        ];
        if generated % KEY_LEN == 0 {
            word.rotate_left(1);
            for byte in &mut word {
                *byte = SBOX[usize::from(*byte)];
            }
            word[0] ^= RCON[rcon_iter];
            rcon_iter += 1;
        }
        for &byte in &word {
            schedule[generated] = schedule[generated - KEY_LEN] ^ byte;
            generated += 1;
        }
    }
    schedule
}

#[inline]
fn add_round_key(state: &mut [u8; BLOCK_SIZE], round_key: &[u8]) {
    for (byte, key_byte) in state.iter_mut().zip(round_key) {
        *byte ^= key_byte;
    }
}

#[inline]
fn sub_bytes(state: &mut [u8; BLOCK_SIZE]) {
    for byte in state.iter_mut() {
        *byte = SBOX[usize::from(*byte)];
    }
}

#[inline]
fn inv_sub_bytes(state: &mut [u8; BLOCK_SIZE]) {
    for byte in state.iter_mut() {
        *byte = INV_SBOX[usize::from(*byte)];
    }
}

// Column-major state indices:
//   [0 4  8 12]
//   [1 5  9 13]
//   [2 6 10 14]
//   [3 7 11 15]
fn shift_rows(s: &mut [u8; BLOCK_SIZE]) {
    // row 1: rotate left by 1
    let t = s[1];
    s[1] = s[5];
    s[5] = s[9];
    s[9] = s[13];
    s[13] = t;
    // row 2: rotate by 2
    s.swap(2, 10);
    s.swap(6, 14);
    // row 3: rotate left by 3 (right by 1)
    let t = s[15];
    s[15] = s[11];
    s[11] = s[7];
    s[7] = s[3];
    s[3] = t;
}

fn inv_shift_rows(s: &mut [u8; BLOCK_SIZE]) {
    // row 1: rotate right by 1
    let t = s[13];
    s[13] = s[9];
    s[9] = s[5];
    s[5] = s[1];
    s[1] = t;
    // row 2: rotate by 2
    s.swap(2, 10);
    s.swap(6, 14);
    // row 3: rotate right by 3 (left by 1)
    let t = s[3];
    s[3] = s[7];
    s[7] = s[11];
    s[11] = s[15];
    s[15] = t;
}

/// Galois-field multiply by 2 with the AES modulus reduction.
#[inline]
fn xtime(x: u8) -> u8 {
    (x << 1) ^ (((x >> 7) & 1) * 0x1B)
}

fn mix_columns(s: &mut [u8; BLOCK_SIZE]) {
    for col in 0..4 {
        let i = col * 4;
        let (a0, a1, a2, a3) = (s[i], s[i + 1], s[i + 2], s[i + 3]);
        let t = a0 ^ a1 ^ a2 ^ a3;
        s[i] = a0 ^ t ^ xtime(a0 ^ a1);
        s[i + 1] = a1 ^ t ^ xtime(a1 ^ a2);
        s[i + 2] = a2 ^ t ^ xtime(a2 ^ a3);
        s[i + 3] = a3 ^ t ^ xtime(a3 ^ a0);
    }
}

fn inv_mix_columns(s: &mut [u8; BLOCK_SIZE]) {
    for col in 0..4 {
        let i = col * 4;
        let u = xtime(xtime(s[i] ^ s[i + 2]));
        let v = xtime(xtime(s[i + 1] ^ s[i + 3]));
        s[i] ^= u;
        s[i + 1] ^= v;
        s[i + 2] ^= u;
        s[i + 3] ^= v;
    }
    mix_columns(s);
}

fn encrypt_block(state: &mut [u8; BLOCK_SIZE], schedule: &[u8; SCHEDULE_LEN]) {
    add_round_key(state, &schedule[..16]);
    for round in 1..=9 {
        sub_bytes(state);
        shift_rows(state);
        mix_columns(state);
        add_round_key(state, &schedule[round * 16..(round + 1) * 16]);
    }
    sub_bytes(state);
    shift_rows(state);
    add_round_key(state, &schedule[160..]);
}

fn decrypt_block(state: &mut [u8; BLOCK_SIZE], schedule: &[u8; SCHEDULE_LEN]) {
    add_round_key(state, &schedule[160..]);
    for round in (1..=9).rev() {
        inv_shift_rows(state);
        inv_sub_bytes(state);
        add_round_key(state, &schedule[round * 16..(round + 1) * 16]);
        inv_mix_columns(state);
    }
    inv_shift_rows(state);
    inv_sub_bytes(state);
    add_round_key(state, &schedule[..16]);
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    // A plaintext already aligned to the block size gets a full extra block,
    // so the pad byte is always in 1..=16.
    let pad = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

/// Permissive PKCS#7 removal: on any invalid padding the data is returned
/// unmodified. Callers validate the decrypted content's shape themselves.
fn pkcs7_unpad(mut data: Vec<u8>) -> Vec<u8> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return data;
    }
    let pad = usize::from(data[data.len() - 1]);
    if pad == 0 || pad > BLOCK_SIZE {
        return data;
    }
    let body_len = data.len() - pad;
    if data[body_len..].iter().any(|&b| b != data[data.len() - 1]) {
        return data;
    }
    data.truncate(body_len);
    data
}

fn key_array(key: &[u8]) -> Result<[u8; KEY_LEN]> {
    key.try_into()
        .map_err(|_| CryptoError::KeyLength { len: key.len() })
}

/// Encrypt `plaintext` with AES-128-ECB, PKCS#7 padded.
///
/// Each 16-byte block is encrypted independently with no chaining; that is
/// what the device expects and it is load-bearing for the client's
/// ciphertext slice search.
pub fn ecb_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let schedule = expand_key(&key_array(key)?);
    let mut out = pkcs7_pad(plaintext);
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        let block: &mut [u8; BLOCK_SIZE] = chunk.try_into().unwrap();
        encrypt_block(block, &schedule);
    }
    Ok(out)
}

/// Decrypt AES-128-ECB ciphertext and strip PKCS#7 padding permissively.
pub fn ecb_decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let key = key_array(key)?;
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::CiphertextLength {
            len: ciphertext.len(),
        });
    }
    let schedule = expand_key(&key);
    let mut out = ciphertext.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        let block: &mut [u8; BLOCK_SIZE] = chunk.try_into().unwrap();
        decrypt_block(block, &schedule);
    }
    Ok(pkcs7_unpad(out))
}
