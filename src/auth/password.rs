//! Adaptive password hashing.

use crate::error::{Error, Result};

/// Default bcrypt work factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// One-way password hashing with constant-time verification.
pub trait PasswordHasher: Send + Sync {
    /// Hash `plaintext` with a fresh random salt.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Check `plaintext` against a stored hash. A mismatch or a malformed
    /// hash yields `false`.
    fn verify(&self, plaintext: &str, hashed: &str) -> bool;
}

/// bcrypt with a configurable cost.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| Error::Hashing(e.to_string()))
    }

    fn verify(&self, plaintext: &str, hashed: &str) -> bool {
        bcrypt::verify(plaintext, hashed).unwrap_or(false)
    }
}
