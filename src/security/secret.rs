// Salted, deliberately slow hashing for PINs and location secrets

use crate::utils::auth::constant_time_eq;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

pub const PBKDF2_ROUNDS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const DIGEST_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 digest of a secret together with its salt.
///
/// The plaintext is never kept. Equality is constant time and `Debug`
/// never prints the bytes.
#[derive(Clone, Serialize, Deserialize)]
pub struct HashedSecret {
    #[serde(with = "hex_array")]
    digest: [u8; DIGEST_LEN],
    #[serde(with = "hex_array")]
    salt: [u8; SALT_LEN],
}

impl HashedSecret {
    /// Hash `plaintext` under a fresh random salt
    pub fn new(plaintext: &[u8]) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        Self::with_salt(plaintext, salt)
    }

    pub fn with_salt(plaintext: &[u8], salt: [u8; SALT_LEN]) -> Self {
        Self {
            digest: derive(plaintext, &salt, PBKDF2_ROUNDS),
            salt,
        }
    }

    /// Recompute the digest for `attempt` with the stored salt.
    /// A mismatch is a normal `false`, not an error.
    pub fn verify(&self, attempt: &[u8]) -> bool {
        let candidate = derive(attempt, &self.salt, PBKDF2_ROUNDS);
        constant_time_eq(&candidate, &self.digest)
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }
}

/// Verify against a possibly unset secret. Unset always fails.
pub fn verify_secret(stored: Option<&HashedSecret>, attempt: &[u8]) -> bool {
    match stored {
        Some(secret) => secret.verify(attempt),
        None => false,
    }
}

fn derive(plaintext: &[u8], salt: &[u8], rounds: u32) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(plaintext, salt, rounds, &mut digest);
    digest
}

impl PartialEq for HashedSecret {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.salt, &other.salt) & constant_time_eq(&self.digest, &other.digest)
    }
}

impl Eq for HashedSecret {}

impl fmt::Debug for HashedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedSecret(<redacted>)")
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let mut bytes = [0u8; N];
        hex::decode_to_slice(&text, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}
