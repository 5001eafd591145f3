//! Argon2 hashing for passwords and session tokens.

use crate::model::{
    account::HashedPassword,
    session::{SESSION_TOKEN_HASH_LEN, SessionToken, SessionTokenHash},
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use thiserror::Error;

const PASSWORD_SALT_LEN: usize = 16;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum HashError {
    #[error("Invalid argon2 parameters: {0}")]
    Params(argon2::Error),
    #[error("Hashing session token failed: {0}")]
    Token(argon2::Error),
    #[error("Hashing password failed: {0}")]
    Password(password_hash::Error),
}

/// Argon2id cost parameters.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct Hasher {
    argon2: Argon2<'static>,
}

impl Hasher {
    pub fn new(cost: HashCost) -> Result<Self, HashError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(HashError::Params)?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<HashedPassword, HashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(HashError::Password)?;

        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(HashError::Password)?;

        Ok(HashedPassword::new(hash.to_string()))
    }

    /// Checks `password` against a stored hash using the parameters encoded in
    /// the hash itself. An unparseable stored hash never verifies.
    #[must_use]
    pub fn verify_password(&self, password: &str, hash: &HashedPassword) -> bool {
        PasswordHash::new(hash.as_str()).is_ok_and(|parsed| {
            self.argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }

    pub fn hash_token(&self, token: &SessionToken) -> Result<SessionTokenHash, HashError> {
        let mut hash = Box::new([0; SESSION_TOKEN_HASH_LEN]);
        self.argon2
            .hash_password_into(&token.core, &token.salt, &mut *hash)
            .map_err(HashError::Token)?;

        Ok(SessionTokenHash(hash))
    }
}
