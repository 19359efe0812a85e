use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::error;

use super::repo_types::PasswordCredential;

/// Salt length in bytes for new and reset credentials.
pub const DEFAULT_SALT_LEN: usize = 16;
/// Lowest PBKDF2 round count the service accepts.
pub const MIN_ITERATIONS: u32 = 200_000;
pub const DEFAULT_ITERATIONS: u32 = MIN_ITERATIONS;
/// Derived key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("secure random generator unavailable: {0}")]
    Rng(#[from] rand::Error),
    #[error("stored salt is not valid hex")]
    MalformedSalt,
    #[error("pbkdf2 iteration count {0} is below the minimum of {MIN_ITERATIONS}")]
    WeakIterations(u32),
}

/// Result of checking a plaintext password against a stored salt+hash pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Matched the PBKDF2 hash.
    Current,
    /// Matched the old single-pass SHA-256 hash; the credential should be rehashed.
    Legacy,
    Mismatch,
}

impl Verification {
    pub fn is_valid(self) -> bool {
        !matches!(self, Verification::Mismatch)
    }

    pub fn needs_upgrade(self) -> bool {
        matches!(self, Verification::Legacy)
    }
}

/// Random salt of `byte_len` bytes from the OS generator, as lowercase hex.
pub fn generate_salt(byte_len: usize) -> Result<String, PasswordError> {
    let mut buf = vec![0u8; byte_len];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        error!(error = %e, "os rng failed");
        PasswordError::Rng(e)
    })?;
    Ok(hex::encode(buf))
}

/// SHA-256 over `password ∥ salt`, with the salt taken as the stored string.
///
/// Only ever used to recognise credentials written before the PBKDF2 migration.
pub fn legacy_hash(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

fn digest_eq(computed: &str, stored: &str) -> bool {
    computed.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// PBKDF2-HMAC-SHA256 hasher with a configurable round count.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Result<Self, PasswordError> {
        if iterations < MIN_ITERATIONS {
            return Err(PasswordError::WeakIterations(iterations));
        }
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derives the hex-encoded key for `password` under a hex-encoded `salt`.
    pub fn hash(&self, password: &str, salt: &str) -> Result<String, PasswordError> {
        let salt_bytes = hex::decode(salt).map_err(|_| PasswordError::MalformedSalt)?;
        if salt_bytes.is_empty() {
            return Err(PasswordError::MalformedSalt);
        }
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt_bytes, self.iterations, &mut key);
        Ok(hex::encode(key))
    }

    /// Fresh salt plus current-scheme hash, ready to persist.
    pub fn derive(&self, password: &str) -> Result<PasswordCredential, PasswordError> {
        let salt = generate_salt(DEFAULT_SALT_LEN)?;
        let hash = self.hash(password, &salt)?;
        Ok(PasswordCredential { salt, hash })
    }

    /// Checks the current scheme first, then the legacy one.
    pub fn verify(
        &self,
        password: &str,
        salt: &str,
        stored_hash: &str,
    ) -> Result<Verification, PasswordError> {
        if digest_eq(&self.hash(password, salt)?, stored_hash) {
            return Ok(Verification::Current);
        }
        if digest_eq(&legacy_hash(password, salt), stored_hash) {
            return Ok(Verification::Legacy);
        }
        Ok(Verification::Mismatch)
    }
}
