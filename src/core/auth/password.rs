//! Password hashing with bcrypt
//!
//! Digests embed their own cost, so passwords hashed under an older cost
//! policy keep verifying after `BCRYPT_COST` changes.

/// Cost factor used when `BCRYPT_COST` is not configured
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// bcrypt only reads this many bytes of input
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Password hashing errors
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingError(#[from] bcrypt::BcryptError),

    #[error("Password hashing task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("Password is longer than {MAX_PASSWORD_BYTES} bytes")]
    TooLong,
}

/// Outcome of checking a candidate password against a stored digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch,
}

impl Verification {
    pub fn is_match(self) -> bool {
        self == Verification::Match
    }
}

/// bcrypt password hasher
///
/// Hashing and verification are CPU-bound and intentionally slow; the async
/// variants move the work onto tokio's blocking pool so request workers stay
/// responsive.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(PasswordError::TooLong);
        }
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    /// Verify a candidate against a stored digest.
    ///
    /// A digest that cannot be parsed is reported as a mismatch, and so is
    /// a candidate that `hash` would have refused.
    pub fn verify(&self, digest: &str, candidate: &str) -> Verification {
        if candidate.len() > MAX_PASSWORD_BYTES {
            return Verification::Mismatch;
        }
        match bcrypt::verify(candidate, digest) {
            Ok(true) => Verification::Match,
            Ok(false) => Verification::Mismatch,
            Err(e) => {
                tracing::warn!(error = %e, "stored password digest is malformed");
                Verification::Mismatch
            }
        }
    }

    /// `hash` on the blocking pool
    pub async fn hash_blocking(&self, plaintext: &str) -> Result<String, PasswordError> {
        let hasher = *self;
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext)).await?
    }

    /// `verify` on the blocking pool
    pub async fn verify_blocking(
        &self,
        digest: &str,
        candidate: &str,
    ) -> Result<Verification, PasswordError> {
        let hasher = *self;
        let digest = digest.to_owned();
        let candidate = candidate.to_owned();
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&digest, &candidate)).await?)
    }

    /// Stand-in for `verify_blocking` when there is no stored digest.
    ///
    /// Costs one hashing round at the configured cost and always reports a
    /// mismatch, so an unknown login takes as long as a wrong password.
    pub async fn verify_missing_blocking(&self, candidate: &str) -> Result<Verification, PasswordError> {
        let hasher = *self;
        let candidate = candidate.to_owned();
        tokio::task::spawn_blocking(move || {
            bcrypt::hash(&candidate, hasher.cost)?;
            Ok::<_, PasswordError>(Verification::Mismatch)
        })
        .await?
    }
}
