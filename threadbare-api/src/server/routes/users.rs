use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    cache::PathCache,
    extract::{Json, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use threadbare_common::{
    model::{
        thread::Thread,
        user::{AuthId, ProfileUpdate, SortOrder, User, UserSearch, UserThreads},
    },
    page::{Page, PageNumber, PageSize},
};
use threadbare_db::client::DbClient;

/// The only path a profile edit revalidates; onboarding itself has no cached
/// rendering to purge.
const PROFILE_EDIT_PATH: &str = "/profile/edit";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(search_users)
        .typed_get(get_user)
        .typed_put(update_user)
        .typed_get(get_user_threads)
        .typed_get(get_activity)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/search", rejection(ServerError))]
struct SearchUsersPath();

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    page: PageNumber,
    #[serde(default)]
    size: PageSize,
    #[serde(default)]
    sort: SortOrder,
}

async fn search_users(
    SearchUsersPath(): SearchUsersPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<UserSearch>> {
    let results = db
        .search_users(
            user.auth_id(),
            &params.q,
            Page::new(params.page, params.size),
            params.sort,
        )
        .await?;

    Ok(Json(results))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{auth_id}", rejection(ServerError))]
struct UserPath {
    auth_id: AuthId,
}

async fn get_user(
    UserPath { auth_id }: UserPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<User>> {
    let user = db
        .fetch_user(&auth_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(auth_id))?;

    Ok(Json(user))
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    #[serde(flatten)]
    profile: ProfileUpdate,
    path: String,
}

async fn update_user(
    UserPath { auth_id }: UserPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<dyn PathCache>>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    if user.auth_id() != &auth_id {
        return Err(ServerError::ProfileOwnerMismatch);
    }

    let updated = db.upsert_user(&auth_id, &request.profile).await?;

    if request.path == PROFILE_EDIT_PATH {
        cache.invalidate(&request.path);
    }
    Ok(Json(updated))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{auth_id}/threads", rejection(ServerError))]
struct UserThreadsPath {
    auth_id: AuthId,
}

async fn get_user_threads(
    UserThreadsPath { auth_id }: UserThreadsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<UserThreads>> {
    let threads = db
        .fetch_user_threads(&auth_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(auth_id))?;

    Ok(Json(threads))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{auth_id}/activity", rejection(ServerError))]
struct ActivityPath {
    auth_id: AuthId,
}

/// Replies other users left under this user's threads.
async fn get_activity(
    ActivityPath { auth_id }: ActivityPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<Thread>>> {
    let user = db
        .fetch_user(&auth_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(auth_id))?;

    let activity = db.fetch_activity(user.id).await?;
    Ok(Json(activity))
}
