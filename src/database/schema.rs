use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    home_location_id INTEGER NOT NULL,
    default_grade TEXT CHECK (default_grade IN ('VB', 'V0', 'V3', 'V4-V6', 'V6-V8', 'V7-V10')),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (home_location_id) REFERENCES locations (id)
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    location_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    rating INTEGER CHECK (rating BETWEEN 1 AND 10),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    FOREIGN KEY (location_id) REFERENCES locations (id)
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_date ON sessions (user_id, date);
CREATE INDEX IF NOT EXISTS idx_sessions_location ON sessions (location_id);

CREATE TABLE IF NOT EXISTS problems (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    grade TEXT NOT NULL CHECK (grade IN ('VB', 'V0', 'V3', 'V4-V6', 'V6-V8', 'V7-V10')),
    attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts BETWEEN 0 AND 10000),
    sends INTEGER NOT NULL DEFAULT 0 CHECK (sends BETWEEN 0 AND 10000),
    notes TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (session_id) REFERENCES sessions (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_problems_session ON problems (session_id);
"#;

/// Creates any missing tables and indexes. Safe to run on every start.
#[instrument(skip(pool))]
pub async fn apply_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;
    Ok(())
}
