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
        Id,
        thread::{CommunityMarker, Feed, Thread, ThreadMarker, ThreadText},
        user::User,
    },
    page::{Page, PageNumber, PageSize},
};
use threadbare_db::client::{DbClient, THREAD_VIEW_DEPTH};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_feed)
        .typed_get(get_thread)
        .typed_post(create_thread)
        .typed_post(add_comment)
}

/// Resolves the caller's profile and enforces the onboarding gate content
/// creation sits behind.
async fn onboarded_author(db: &DbClient, user: &AuthenticatedUser) -> Result<User> {
    let profile = db
        .fetch_user(user.auth_id())
        .await?
        .ok_or_else(|| ServerError::NotOnboarded(user.auth_id().clone()))?;

    if !profile.onboarded {
        return Err(ServerError::NotOnboarded(user.auth_id().clone()));
    }
    Ok(profile)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/threads", rejection(ServerError))]
struct ThreadsPath();

#[derive(Deserialize)]
struct NewThread {
    text: ThreadText,
    /// Reserved; accepted but never persisted.
    #[serde(default)]
    community: Option<Id<CommunityMarker>>,
    /// Logical page path whose cached rendering this creation makes stale.
    path: String,
}

async fn create_thread(
    ThreadsPath(): ThreadsPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<dyn PathCache>>,
    user: AuthenticatedUser,
    Json(new_thread): Json<NewThread>,
) -> Result<Json<Thread>> {
    let author = onboarded_author(&db, &user).await?;

    let thread = db
        .create_thread(&author, &new_thread.text, new_thread.community)
        .await?;

    cache.invalidate(&new_thread.path);
    Ok(Json(thread))
}

#[derive(Deserialize)]
struct FeedParams {
    #[serde(default)]
    page: PageNumber,
    #[serde(default)]
    size: PageSize,
}

async fn get_feed(
    ThreadsPath(): ThreadsPath,
    State(db): State<Arc<DbClient>>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Feed>> {
    let feed = db.fetch_feed(Page::new(params.page, params.size)).await?;

    Ok(Json(feed))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/threads/{id}", rejection(ServerError))]
struct GetThreadPath {
    id: Id<ThreadMarker>,
}

async fn get_thread(
    GetThreadPath { id }: GetThreadPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Thread>> {
    let thread = db
        .fetch_thread(id, THREAD_VIEW_DEPTH)
        .await?
        .ok_or(ServerError::ThreadByIdNotFound(id))?;

    Ok(Json(thread))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/threads/{id}/comments", rejection(ServerError))]
struct AddCommentPath {
    id: Id<ThreadMarker>,
}

#[derive(Deserialize)]
struct NewComment {
    text: ThreadText,
    path: String,
}

async fn add_comment(
    AddCommentPath { id }: AddCommentPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<dyn PathCache>>,
    user: AuthenticatedUser,
    Json(new_comment): Json<NewComment>,
) -> Result<Json<Thread>> {
    let author = db
        .fetch_user(user.auth_id())
        .await?
        .ok_or_else(|| ServerError::UserByIdNotFound(user.auth_id().clone()))?;

    let comment = db
        .add_comment(id, &author, &new_comment.text)
        .await?
        .ok_or(ServerError::ThreadByIdNotFound(id))?;

    cache.invalidate(&new_comment.path);
    Ok(Json(comment))
}
