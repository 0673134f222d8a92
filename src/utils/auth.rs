use rand::RngCore;
use subtle::ConstantTimeEq;

/// Length in bytes of an admin session token before hex encoding
pub const TOKEN_BYTES: usize = 32;

/// Compare two byte strings in constant time to prevent timing attacks.
///
/// Only the length is allowed to leak.
pub fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    bool::from(provided.ct_eq(expected))
}

/// Generate a random hex-encoded session token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
