use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::error::AppError;

/// Opens the pool with foreign keys enforced. An in-memory database is pinned to a single
/// connection that is never recycled, since each connection sees its own database.
#[instrument]
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    info!("Connecting to SQLite database");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;

    Ok(pool)
}
