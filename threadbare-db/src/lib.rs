pub mod client;
pub mod record;
mod tree;

pub use sqlx;

/// Applies the bundled schema migrations. Run once at process start, before
/// the client serves requests.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
