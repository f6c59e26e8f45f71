use crate::model::user::{AuthId, InvalidAuthIdError};
use argon2::{Argon2, Params};
use base64::{
    DecodeError, Engine, display::Base64Display, engine::general_purpose::URL_SAFE_NO_PAD,
};
use std::{
    fmt::{Debug, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

pub const SESSION_SECRET_LEN: usize = 32;
pub const SESSION_SALT_LEN: usize = 16;
pub const SESSION_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing session token failed: {0}")]
pub struct SessionHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionTokenDecodeError {
    #[error("Expected three parts separated by '.'")]
    MissingPart,
    #[error("Invalid auth id: {0}")]
    AuthId(#[from] InvalidAuthIdError),
    #[error("Decoding base64 failed: {0}")]
    Base64(#[from] DecodeError),
    #[error("The secret part has the wrong length")]
    BadSecretLength,
    #[error("The salt part has the wrong length")]
    BadSaltLength,
}

/// A bearer credential in the form `auth_id.secret.salt`. The server never
/// stores the secret, only its argon2 hash.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionToken {
    pub auth_id: AuthId,
    pub secret: [u8; SESSION_SECRET_LEN],
    pub salt: [u8; SESSION_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionHash(pub Box<[u8; SESSION_HASH_LEN]>);

/// The stored side of a session: which external identity it belongs to and
/// when it stops being valid.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Session {
    pub auth_id: AuthId,
    pub token_hash: SessionHash,
    pub created_at: UtcDateTime,
    pub expires_at: Option<UtcDateTime>,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

impl SessionToken {
    #[must_use]
    pub fn generate_random(auth_id: AuthId) -> Self {
        Self {
            auth_id,
            secret: rand::random(),
            salt: rand::random(),
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        format!(
            "{}.{}.{}",
            self.auth_id,
            Base64Display::new(&self.secret, &URL_SAFE_NO_PAD),
            Base64Display::new(&self.salt, &URL_SAFE_NO_PAD),
        )
    }

    pub fn hash(&self) -> Result<SessionHash, SessionHashError> {
        let mut hash = Box::new([0; SESSION_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.secret, &self.salt, &mut *hash)
            .map_err(SessionHashError)?;

        Ok(SessionHash(hash))
    }
}

impl FromStr for SessionToken {
    type Err = SessionTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');

        let auth_id_part = parts.next().ok_or(Self::Err::MissingPart)?;
        let secret_part = parts.next().ok_or(Self::Err::MissingPart)?;
        let salt_part = parts.next().ok_or(Self::Err::MissingPart)?;

        let auth_id = AuthId::from_str(auth_id_part)?;
        let secret = URL_SAFE_NO_PAD
            .decode(secret_part)?
            .try_into()
            .map_err(|_| Self::Err::BadSecretLength)?;
        let salt = URL_SAFE_NO_PAD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::BadSaltLength)?;

        Ok(Self {
            auth_id,
            secret,
            salt,
        })
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("auth_id", &self.auth_id)
            .field("secret", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for SessionHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The session token hash had an invalid length")]
pub struct InvalidSessionHashError;

impl TryFrom<Box<[u8]>> for SessionHash {
    type Error = InvalidSessionHashError;

    fn try_from(value: Box<[u8]>) -> Result<Self, Self::Error> {
        Ok(Self(
            value.try_into().map_err(|_| InvalidSessionHashError)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionHash, SessionToken};
    use crate::model::user::AuthId;
    use std::str::FromStr;
    use time::{Duration, UtcDateTime};

    fn auth_id() -> AuthId {
        AuthId::new("user_2NNEqL2sr".to_owned()).unwrap()
    }

    #[test]
    fn token_string_round_trip() {
        let token = SessionToken::generate_random(auth_id());

        let parsed = SessionToken::from_str(&token.as_token_str()).unwrap();

        assert_eq!(parsed, token);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(SessionToken::from_str("only-one-part").is_err());
        assert!(SessionToken::from_str("user.two-parts").is_err());
        assert!(SessionToken::from_str("user.!!!.???").is_err());
        // Valid base64, wrong decoded lengths.
        assert!(SessionToken::from_str("user.YWJj.YWJj").is_err());
    }

    #[test]
    fn hash_is_stable_and_secret_dependent() {
        let token = SessionToken::generate_random(auth_id());
        assert_eq!(token.hash().unwrap(), token.hash().unwrap());

        let mut other = token.clone();
        other.secret[0] ^= 0xFF;
        assert_ne!(token.hash().unwrap(), other.hash().unwrap());
    }

    #[test]
    fn expiry() {
        let now = UtcDateTime::now();
        let session = Session {
            auth_id: auth_id(),
            token_hash: SessionHash(Box::new([0; super::SESSION_HASH_LEN])),
            created_at: now,
            expires_at: Some(now + Duration::hours(1)),
        };

        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::hours(2)));

        let unbounded = Session {
            expires_at: None,
            ..session
        };
        assert!(!unbounded.is_expired_at(now + Duration::days(10_000)));
    }
}
