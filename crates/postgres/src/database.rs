use settings::DbSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Creates a connection pool to the PostgreSQL database.
///
/// The pool keeps at least `min_connections` connections open; requests
/// block on acquire when the pool is exhausted.
pub async fn create_connection_pool(
    db: &DbSettings,
    min_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(min_connections)
        .connect_with(db.connect_options())
        .await
}

/// Applies pending schema migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// Tests the database connection by executing a simple query.
pub async fn test_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT 1 as test").fetch_one(pool).await?;

    let test_value: i32 = row.get("test");
    log::debug!("Database connection successful. Test value: {}", test_value);

    Ok(())
}
