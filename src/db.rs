//! PostgreSQL pool and schema migrations for the ledger store.

use sqlx::{Pool, Postgres};

pub type DbPool = Pool<Postgres>;

/// Create the connection pool backing `PgLedgerStore`.
///
/// Every ledger unit of work holds one connection until it commits, and the
/// settlement worker takes one per claimed job, so `max_connections` bounds how
/// many wallet operations run at once.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server is unreachable.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply pending migrations from `migrations/`.
///
/// Applied migrations are tracked in `_sqlx_migrations`, so this is safe to run
/// on every startup.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
