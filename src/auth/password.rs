//! Password Hashing
//! Mission: Store only salted bcrypt hashes, never the raw secret

use bcrypt::{hash, verify};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hashing(#[source] bcrypt::BcryptError),
    #[error("stored password hash is malformed: {0}")]
    Verification(#[source] bcrypt::BcryptError),
}

/// One-way password representation.
///
/// An empty hash is what identity snapshots carry after a round trip through
/// the cache; verifying against it is a `Verification` error, not a mismatch.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password {
    hash: String,
}

impl Password {
    /// Hash a raw secret at the given bcrypt cost.
    pub fn set_with_cost(raw: &str, cost: u32) -> Result<Self, PasswordError> {
        let hash = hash(raw, cost).map_err(PasswordError::Hashing)?;
        Ok(Self { hash })
    }

    /// Wrap a hash loaded from the system of record.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// `Ok(false)` on mismatch. bcrypt compares in constant time.
    pub fn verify(&self, attempt: &str) -> Result<bool, PasswordError> {
        verify(attempt, &self.hash).map_err(PasswordError::Verification)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}
