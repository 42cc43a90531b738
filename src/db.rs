// db.rs
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::store::StoreError;

/// Connects to Postgres and brings the schema up to date.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    info!(max_connections, "Connected to Postgres, running migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
