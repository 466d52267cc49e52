use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Bouldering grade buckets, ordered from easiest to hardest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "VB")]
    VB,
    #[serde(rename = "V0")]
    V0,
    #[serde(rename = "V3")]
    V3,
    #[serde(rename = "V4-V6")]
    V4V6,
    #[serde(rename = "V6-V8")]
    V6V8,
    #[serde(rename = "V7-V10")]
    V7V10,
}

impl Grade {
    pub const ALL: [Grade; 6] = [
        Grade::VB,
        Grade::V0,
        Grade::V3,
        Grade::V4V6,
        Grade::V6V8,
        Grade::V7V10,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::VB => "VB",
            Grade::V0 => "V0",
            Grade::V3 => "V3",
            Grade::V4V6 => "V4-V6",
            Grade::V6V8 => "V6-V8",
            Grade::V7V10 => "V7-V10",
        }
    }
}

impl FromStr for Grade {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::ALL
            .iter()
            .copied()
            .find(|grade| grade.as_str() == s)
            .ok_or_else(|| AppError::validation("grade", format!("Unknown grade: {}", s)))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

fn stored_grade(raw: Option<String>) -> Result<Grade, AppError> {
    let raw = raw.unwrap_or_default();
    Grade::from_str(&raw)
        .map_err(|_| AppError::Internal(format!("Stored grade '{}' is not a known grade", raw)))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbLocation {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbLocation> for Location {
    fn from(location: DbLocation) -> Self {
        Self {
            id: location.id.unwrap_or_default(),
            name: location.name.unwrap_or_default(),
            slug: location.slug.unwrap_or_default(),
            created_at: utc(location.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Problem {
    pub id: i64,
    pub session_id: i64,
    pub grade: Grade,
    pub attempts: i64,
    pub sends: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbProblem {
    pub id: Option<i64>,
    pub session_id: Option<i64>,
    pub grade: Option<String>,
    pub attempts: Option<i64>,
    pub sends: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<DbProblem> for Problem {
    type Error = AppError;

    fn try_from(db: DbProblem) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            session_id: db.session_id.unwrap_or_default(),
            grade: stored_grade(db.grade)?,
            attempts: db.attempts.unwrap_or_default(),
            sends: db.sends.unwrap_or_default(),
            notes: db.notes,
            created_at: utc(db.created_at),
        })
    }
}

/// One gym visit with the problems logged during it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClimbingSession {
    pub id: i64,
    pub user_id: i64,
    pub location_id: i64,
    pub location_name: String,
    pub date: NaiveDate,
    pub rating: Option<i64>,
    pub problems: Vec<Problem>,
    pub created_at: DateTime<Utc>,
}

/// A session joined with at most one of its problems. A session with no problems comes back
/// as a single row whose `problem_*` columns are all null.
#[derive(sqlx::FromRow, Clone)]
pub struct DbSessionProblemRow {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub rating: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub problem_id: Option<i64>,
    pub problem_grade: Option<String>,
    pub problem_attempts: Option<i64>,
    pub problem_sends: Option<i64>,
    pub problem_notes: Option<String>,
    pub problem_created_at: Option<NaiveDateTime>,
}

impl DbSessionProblemRow {
    fn session(&self) -> ClimbingSession {
        ClimbingSession {
            id: self.id.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_default(),
            location_id: self.location_id.unwrap_or_default(),
            location_name: self.location_name.clone().unwrap_or_default(),
            date: self.date.unwrap_or_default(),
            rating: self.rating,
            problems: Vec::new(),
            created_at: utc(self.created_at),
        }
    }

    fn problem(&self) -> Option<DbProblem> {
        self.problem_id.map(|problem_id| DbProblem {
            id: Some(problem_id),
            session_id: self.id,
            grade: self.problem_grade.clone(),
            attempts: self.problem_attempts,
            sends: self.problem_sends,
            notes: self.problem_notes.clone(),
            created_at: self.problem_created_at,
        })
    }
}

/// Folds joined rows back into sessions, keeping the order in which each session first
/// appears. Rows of one session must be contiguous.
pub fn group_session_rows(
    rows: Vec<DbSessionProblemRow>,
) -> Result<Vec<ClimbingSession>, AppError> {
    let mut sessions: Vec<ClimbingSession> = Vec::new();

    for row in rows {
        let is_same_session = sessions
            .last()
            .is_some_and(|current| Some(current.id) == row.id);

        if !is_same_session {
            sessions.push(row.session());
        }

        if let (Some(problem), Some(current)) = (row.problem(), sessions.last_mut()) {
            current.problems.push(Problem::try_from(problem)?);
        }
    }

    Ok(sessions)
}
