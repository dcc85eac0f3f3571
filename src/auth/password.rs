//! PBKDF2 password digests.
//!
//! Digests are PHC strings (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`),
//! so the salt and round count travel with the hash and `verify` never needs
//! the current configuration.

use super::AuthError;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};

/// Default PBKDF2 iteration count.
pub const DEFAULT_HASH_ROUNDS: u32 = 100_000;

/// Salt byte length.
const SALT_BYTES: usize = 16;

/// Derived key length in bytes.
const OUTPUT_LEN: usize = 32;

/// Hashes new passwords with a configured round count.
#[derive(Debug, Clone, Copy)]
pub struct PasswordService {
    rounds: u32,
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_ROUNDS)
    }
}

impl PasswordService {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Hash `plaintext` with a fresh random salt. Non-deterministic.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt_bytes: [u8; SALT_BYTES] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Hashing(format!("salt encoding: {e}")))?;
        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_LEN,
        };

        let digest = Pbkdf2
            .hash_password_customized(plaintext.as_bytes(), None, None, params, &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(digest.to_string())
    }
}

/// Check `plaintext` against a stored digest in constant time.
/// A digest that does not parse never verifies.
pub fn verify(plaintext: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Pbkdf2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password digest is malformed: {e}");
            false
        }
    }
}
