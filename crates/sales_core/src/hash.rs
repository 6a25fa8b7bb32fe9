//! One-way secret hashing.
//!
//! Cores treat the hasher as an opaque function; `Argon2Hasher` is the
//! production implementation and emits PHC-format strings.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use thiserror::Error;

/// Longest accepted secret, in bytes.
pub const MAX_SECRET_BYTES: usize = 72;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("secret length {0} is outside 1..={MAX_SECRET_BYTES} bytes")]
    InvalidLength(usize),
    #[error("stored hash is malformed: {0}")]
    MalformedHash(String),
    #[error("hashing failed: {0}")]
    Backend(String),
}

pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<Vec<u8>, HashError>;

    /// Returns whether `secret` matches `hashed`. A secret that could never
    /// have been hashed does not match.
    fn verify(&self, secret: &str, hashed: &[u8]) -> Result<bool, HashError>;
}

#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Minimal-cost parameters; suitable for tests only.
    pub fn insecure_fast() -> Result<Self, HashError> {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None)
            .map_err(|err| HashError::Backend(err.to_string()))?;
        Ok(Self::new(params))
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<Vec<u8>, HashError> {
        check_length(secret)?;

        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|err| HashError::Backend(err.to_string()))?;

        let hashed = self
            .argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|err| HashError::Backend(err.to_string()))?;
        Ok(hashed.to_string().into_bytes())
    }

    fn verify(&self, secret: &str, hashed: &[u8]) -> Result<bool, HashError> {
        if check_length(secret).is_err() {
            return Ok(false);
        }

        let encoded = std::str::from_utf8(hashed)
            .map_err(|err| HashError::MalformedHash(err.to_string()))?;
        let parsed =
            PasswordHash::new(encoded).map_err(|err| HashError::MalformedHash(err.to_string()))?;

        match self.argon2().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HashError::Backend(err.to_string())),
        }
    }
}

fn check_length(secret: &str) -> Result<(), HashError> {
    let len = secret.len();
    if len == 0 || len > MAX_SECRET_BYTES {
        return Err(HashError::InvalidLength(len));
    }
    Ok(())
}
