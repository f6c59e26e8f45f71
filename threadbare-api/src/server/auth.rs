use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use threadbare_common::model::{
    session::{SessionHash, SessionToken},
    user::AuthId,
};
use threadbare_db::client::DbClient;
use time::UtcDateTime;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The external identity behind the request's bearer session. Holding one
/// proves a live, unexpired session; it says nothing about whether a profile
/// exists yet, since sessions precede onboarding.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AuthenticatedUser {
    auth_id: AuthId,
    token_hash: SessionHash,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn auth_id(&self) -> &AuthId {
        &self.auth_id
    }

    /// Hash of the presented token; session revocation deletes by it.
    #[must_use]
    pub fn token_hash(&self) -> &SessionHash {
        &self.token_hash
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token: SessionToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = token.hash()?;

        let session = Arc::<DbClient>::from_ref(state)
            .fetch_session(&token_hash)
            .await?
            .ok_or(ServerError::InvalidSession)?;

        if session.auth_id != token.auth_id || session.is_expired_at(UtcDateTime::now()) {
            return Err(ServerError::InvalidSession);
        }

        Ok(Self {
            auth_id: session.auth_id,
            token_hash,
        })
    }
}
