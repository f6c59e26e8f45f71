use crate::server::{cache::PathCache, extract::Json};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use threadbare_common::model::{
    Id,
    session::{SessionHashError, SessionTokenDecodeError},
    thread::ThreadMarker,
    user::AuthId,
};
use threadbare_db::client::{DbClient, DbError};
use tracing::error;

mod auth;
pub mod cache;
mod extract;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub cache: Arc<dyn PathCache>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The provided session token could not be decoded: {0}")]
    InvalidSessionToken(#[from] SessionTokenDecodeError),
    #[error("The session token could not be hashed: {0}")]
    SessionHash(#[from] SessionHashError),
    #[error("Provided session was invalid or expired")]
    InvalidSession,
    #[error("User {0} has not completed onboarding")]
    NotOnboarded(AuthId),
    #[error("The profile being changed belongs to another user")]
    ProfileOwnerMismatch,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Thread with id {0} was not found.")]
    ThreadByIdNotFound(Id<ThreadMarker>),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(AuthId),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::ThreadByIdNotFound(_)
            | ServerError::UserByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(rejection) if rejection.is_missing() => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::InvalidSession => StatusCode::UNAUTHORIZED,
            ServerError::NotOnboarded(_) | ServerError::ProfileOwnerMismatch => {
                StatusCode::FORBIDDEN
            }
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidSessionToken(_) => StatusCode::BAD_REQUEST,
            ServerError::Database(DbError::UsernameTaken) => StatusCode::CONFLICT,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::SessionHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
        };
        (status, Json(error_response)).into_response()
    }
}
