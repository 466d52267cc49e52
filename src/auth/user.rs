use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{Grade, utc};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub home_location_id: i64,
    pub default_grade: Option<Grade>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub home_location_id: Option<i64>,
    pub default_grade: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        let default_grade = match user.default_grade.as_deref() {
            Some(raw) => Some(Grade::from_str(raw).map_err(|_| {
                AppError::Internal(format!("Stored default grade '{}' is not a known grade", raw))
            })?),
            None => None,
        };

        Ok(Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            home_location_id: user.home_location_id.unwrap_or_default(),
            default_grade,
            created_at: utc(user.created_at),
        })
    }
}

/// Credentials row, only read while logging in.
#[derive(sqlx::FromRow, Clone)]
pub struct DbUserCredentials {
    pub id: i64,
    pub password_hash: String,
}
