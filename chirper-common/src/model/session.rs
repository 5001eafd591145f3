use crate::{
    model::{Id, account::AccountMarker},
    util::PositiveDuration,
};
use argon2::Params;
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const SESSION_TOKEN_CORE_LEN: usize = 24;
pub const SESSION_TOKEN_SALT_LEN: usize = 18;
pub const SESSION_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

/// The secret half of a session, held only by the client.
///
/// The server keeps nothing but the argon2 hash of `core` under `salt`, so a
/// leaked sessions table cannot be replayed.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionToken {
    pub core: [u8; SESSION_TOKEN_CORE_LEN],
    pub salt: [u8; SESSION_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionTokenHash(pub Box<[u8; SESSION_TOKEN_HASH_LEN]>);

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub account: Id<AccountMarker>,
    pub token_hash: SessionTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewSession {
    pub token_hash: SessionTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl SessionToken {
    #[must_use]
    pub fn generate_random() -> Self {
        Self {
            core: rand::random(),
            salt: rand::random(),
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{encoded_core}:{encoded_salt}")
    }
}

impl FromStr for SessionToken {
    type Err = SessionTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (core_part, salt_part) = s.split_once(':').ok_or(Self::Err::NotEnoughParts)?;

        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self { core, salt })
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for SessionTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The session token hash had an invalid length")]
pub struct InvalidSessionTokenHashError;

impl TryFrom<Vec<u8>> for SessionTokenHash {
    type Error = InvalidSessionTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let bytes: [u8; SESSION_TOKEN_HASH_LEN] =
            value.try_into().map_err(|_| InvalidSessionTokenHashError)?;
        Ok(Self(Box::new(bytes)))
    }
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::session::{Session, SessionToken, SessionTokenDecodeError, SessionTokenHash},
        util::PositiveDuration,
    };
    use time::{Duration, macros::utc_datetime};

    #[test]
    fn token_string_round_trip() {
        let token = SessionToken::generate_random();
        let parsed: SessionToken = token.as_token_str().parse().unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            "no-separator".parse::<SessionToken>(),
            Err(SessionTokenDecodeError::NotEnoughParts)
        );
        assert_eq!(
            "YWJj:YWJj".parse::<SessionToken>(),
            Err(SessionTokenDecodeError::InvalidCoreLength)
        );
        assert!(matches!(
            "!!!:???".parse::<SessionToken>(),
            Err(SessionTokenDecodeError::Decode(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = SessionToken::generate_random();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains(&token.as_token_str()));
    }

    #[test]
    fn session_expiry() {
        let created_at = utc_datetime!(2025-06-01 12:00);
        let mut session = Session {
            account: 1.into(),
            token_hash: SessionTokenHash(Box::new([0; 32])),
            created_at,
            expires_after: PositiveDuration::from_seconds(60),
        };

        assert!(!session.is_expired_at(created_at + Duration::seconds(60)));
        assert!(session.is_expired_at(created_at + Duration::seconds(61)));

        session.expires_after = None;
        assert!(!session.is_expired_at(created_at + Duration::weeks(520)));
    }

    #[test]
    fn hash_length_is_checked() {
        assert!(SessionTokenHash::try_from(vec![0; 32]).is_ok());
        assert!(SessionTokenHash::try_from(vec![0; 31]).is_err());
    }
}
