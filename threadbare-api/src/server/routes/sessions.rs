use crate::server::{Result, ServerError, ServerRouter, auth::AuthenticatedUser, extract::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use threadbare_common::model::{
    session::{Session, SessionToken},
    user::AuthId,
};
use threadbare_db::client::DbClient;
use time::{Duration, UtcDateTime};

/// Sessions issued here outlive most onboarding flows but not a forgotten
/// browser tab.
const SESSION_LIFETIME: Duration = Duration::days(30);

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_session)
        .typed_delete(delete_session)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/sessions", rejection(ServerError))]
struct SessionsPath();

/// The deployment's identity provider vouches for `auth_id` before calling
/// this; the API itself never sees provider credentials.
#[derive(Deserialize)]
struct NewSession {
    auth_id: AuthId,
}

#[derive(Serialize)]
struct IssuedSession {
    token: String,
}

async fn create_session(
    SessionsPath(): SessionsPath,
    State(db): State<Arc<DbClient>>,
    Json(new_session): Json<NewSession>,
) -> Result<Json<IssuedSession>> {
    let token = SessionToken::generate_random(new_session.auth_id);
    let now = UtcDateTime::now();

    let session = Session {
        auth_id: token.auth_id.clone(),
        token_hash: token.hash()?,
        created_at: now,
        expires_at: Some(now + SESSION_LIFETIME),
    };
    db.create_session(&session).await?;

    Ok(Json(IssuedSession {
        token: token.as_token_str(),
    }))
}

async fn delete_session(
    SessionsPath(): SessionsPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    db.delete_session(user.token_hash()).await?;

    Ok(StatusCode::NO_CONTENT)
}
