//! Token identifier generation.

use rand::RngCore;
use rand::rngs::OsRng;

/// Generates a token identifier from `byte_len` bytes of OS randomness.
///
/// The result is lowercase hex, exactly `2 * byte_len` characters long.
#[must_use]
pub fn generate_token_id(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
