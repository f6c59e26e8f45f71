use crate::server::ServerRouter;
use axum::Router;

mod sessions;
mod threads;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(threads::routes())
        .merge(users::routes())
        .merge(sessions::routes())
}
