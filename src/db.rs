use chrono::NaiveDate;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::{DbUser, DbUserCredentials, User, hash_password, verify_password};
use crate::error::AppError;
use crate::models::{
    ClimbingSession, DbLocation, DbProblem, DbSessionProblemRow, Grade, Location, Problem,
    group_session_rows,
};

#[derive(Debug, Clone)]
pub struct NewProblem {
    pub grade: Grade,
    pub attempts: i64,
    pub sends: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub location_id: i64,
    pub date: NaiveDate,
    pub rating: Option<i64>,
    pub problems: Vec<NewProblem>,
}

/// Partial session update. `problems`, when present, replaces every problem of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionChanges {
    pub location_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub rating: Option<i64>,
    pub problems: Option<Vec<NewProblem>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProblemChanges {
    pub grade: Option<Grade>,
    pub attempts: Option<i64>,
    pub sends: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserSettings {
    pub home_location_id: Option<i64>,
    pub default_grade: Option<Grade>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionOrder {
    #[default]
    Chronological,
    NewestFirst,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub session_id: Option<i64>,
    pub user_id: Option<i64>,
    pub location_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub order: SessionOrder,
}

const LOCATION_COLUMNS: &str = "SELECT id, name, slug, created_at FROM locations";

const USER_COLUMNS: &str =
    "SELECT id, username, home_location_id, default_grade, created_at FROM users";

const PROBLEM_COLUMNS: &str =
    "SELECT id, session_id, grade, attempts, sends, notes, created_at FROM problems";

const SESSION_ROWS: &str = "SELECT s.id, s.user_id, s.location_id, l.name AS location_name,
        s.date, s.rating, s.created_at,
        p.id AS problem_id, p.grade AS problem_grade, p.attempts AS problem_attempts,
        p.sends AS problem_sends, p.notes AS problem_notes, p.created_at AS problem_created_at
     FROM sessions s
     JOIN locations l ON l.id = s.location_id
     LEFT JOIN problems p ON p.session_id = s.id
     WHERE 1 = 1";

fn check_sends(attempts: i64, sends: i64) -> Result<(), AppError> {
    if sends > attempts {
        return Err(AppError::validation("sends", "Sends cannot exceed attempts"));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_locations(pool: &Pool<Sqlite>) -> Result<Vec<Location>, AppError> {
    info!("Getting all locations");
    let rows = sqlx::query_as::<_, DbLocation>(&format!("{} ORDER BY name", LOCATION_COLUMNS))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Location::from).collect())
}

#[instrument(skip(pool))]
pub async fn find_location(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Location>, AppError> {
    let row = sqlx::query_as::<_, DbLocation>(&format!("{} WHERE id = ?", LOCATION_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Location::from))
}

#[instrument(skip(pool))]
pub async fn get_location(pool: &Pool<Sqlite>, id: i64) -> Result<Location, AppError> {
    info!("Fetching location by ID");
    find_location(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Location not found".to_string()))
}

#[instrument(skip(pool))]
pub async fn get_location_by_slug(pool: &Pool<Sqlite>, slug: &str) -> Result<Location, AppError> {
    info!("Fetching location by slug");
    let row = sqlx::query_as::<_, DbLocation>(&format!("{} WHERE slug = ?", LOCATION_COLUMNS))
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(location) => Ok(Location::from(location)),
        _ => Err(AppError::NotFound("Location not found".to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn location_exists(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
    Ok(find_location(pool, id).await?.is_some())
}

#[instrument(skip(pool))]
pub async fn count_locations(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM locations")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

#[instrument(skip(pool))]
pub async fn create_location(
    pool: &Pool<Sqlite>,
    name: &str,
    slug: &str,
) -> Result<Location, AppError> {
    info!("Creating location");

    let existing =
        sqlx::query_scalar::<_, i64>("SELECT id FROM locations WHERE name = ? OR slug = ?")
            .bind(name)
            .bind(slug)
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Err(AppError::conflict(
            "name",
            format!("Location '{}' already exists", name),
        ));
    }

    let res = sqlx::query("INSERT INTO locations (name, slug) VALUES (?, ?)")
        .bind(name)
        .bind(slug)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_write(e, "name", "Location already exists"))?;

    get_location(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("{} WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Getting user by username");
    let row = sqlx::query_as::<_, DbUser>(&format!("{} WHERE username = ?", USER_COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await?;

    row.map(User::try_from).transpose()
}

#[instrument(skip(pool, password))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    home_location_id: i64,
) -> Result<User, AppError> {
    info!("Creating new user");

    if find_user_by_username(pool, username).await?.is_some() {
        return Err(AppError::conflict("username", "Username already registered"));
    }

    if !location_exists(pool, home_location_id).await? {
        return Err(AppError::validation("home_location_id", "Invalid home location"));
    }

    let password_hash = hash_password(password)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password_hash, home_location_id) VALUES (?, ?, ?)",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(home_location_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "username", "Username already registered"))?;

    get_user(pool, res.last_insert_rowid()).await
}

/// `None` for an unknown username and for a wrong password alike.
#[instrument(skip(pool, password))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let credentials = sqlx::query_as::<_, DbUserCredentials>(
        "SELECT id, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match credentials {
        Some(credentials) if verify_password(password, &credentials.password_hash) => {
            Ok(Some(get_user(pool, credentials.id).await?))
        }
        _ => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn update_user_settings(
    pool: &Pool<Sqlite>,
    user_id: i64,
    settings: &UserSettings,
) -> Result<User, AppError> {
    info!("Updating user settings");

    if let Some(location_id) = settings.home_location_id {
        if !location_exists(pool, location_id).await? {
            return Err(AppError::validation("home_location_id", "Invalid home location"));
        }
    }

    let res = sqlx::query(
        "UPDATE users
         SET home_location_id = COALESCE(?, home_location_id),
             default_grade = COALESCE(?, default_grade)
         WHERE id = ?",
    )
    .bind(settings.home_location_id)
    .bind(settings.default_grade.map(|grade| grade.as_str()))
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    get_user(pool, user_id).await
}

/// Sessions and their problems go with the user through the foreign-key cascade.
#[instrument(skip(pool))]
pub async fn delete_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            user_id
        )));
    }

    Ok(())
}

async fn insert_problem(
    conn: &mut SqliteConnection,
    session_id: i64,
    problem: &NewProblem,
) -> Result<i64, AppError> {
    check_sends(problem.attempts, problem.sends)?;

    let res = sqlx::query(
        "INSERT INTO problems (session_id, grade, attempts, sends, notes) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(session_id)
    .bind(problem.grade.as_str())
    .bind(problem.attempts)
    .bind(problem.sends)
    .bind(problem.notes.as_deref())
    .execute(conn)
    .await?;

    Ok(res.last_insert_rowid())
}

async fn owned_session_exists(
    conn: &mut SqliteConnection,
    session_id: i64,
    user_id: i64,
) -> Result<bool, AppError> {
    let row = sqlx::query_scalar::<_, i64>("SELECT id FROM sessions WHERE id = ? AND user_id = ?")
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

    Ok(row.is_some())
}

/// Sessions with their problems, filtered in SQL. Problems keep insertion order within a
/// session; sessions on the same date keep id order.
#[instrument(skip(pool))]
pub async fn fetch_sessions(
    pool: &Pool<Sqlite>,
    filter: &SessionFilter,
) -> Result<Vec<ClimbingSession>, AppError> {
    info!("Fetching sessions");
    let mut query = QueryBuilder::<Sqlite>::new(SESSION_ROWS);

    if let Some(session_id) = filter.session_id {
        query.push(" AND s.id = ").push_bind(session_id);
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND s.user_id = ").push_bind(user_id);
    }
    if let Some(location_id) = filter.location_id {
        query.push(" AND s.location_id = ").push_bind(location_id);
    }
    if let Some(start_date) = filter.start_date {
        query.push(" AND s.date >= ").push_bind(start_date);
    }
    if let Some(end_date) = filter.end_date {
        query.push(" AND s.date <= ").push_bind(end_date);
    }

    query.push(match filter.order {
        SessionOrder::Chronological => " ORDER BY s.date ASC, s.id ASC, p.id ASC",
        SessionOrder::NewestFirst => " ORDER BY s.date DESC, s.id DESC, p.id ASC",
    });

    let rows = query
        .build_query_as::<DbSessionProblemRow>()
        .fetch_all(pool)
        .await?;

    group_session_rows(rows)
}

#[instrument(skip(pool))]
pub async fn get_sessions(
    pool: &Pool<Sqlite>,
    user_id: i64,
    location_id: Option<i64>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<Vec<ClimbingSession>, AppError> {
    let filter = SessionFilter {
        user_id: Some(user_id),
        location_id,
        start_date,
        end_date,
        order: SessionOrder::NewestFirst,
        ..SessionFilter::default()
    };

    fetch_sessions(pool, &filter).await
}

/// Another user's session is reported exactly like a missing one.
#[instrument(skip(pool))]
pub async fn get_session(
    pool: &Pool<Sqlite>,
    session_id: i64,
    user_id: i64,
) -> Result<ClimbingSession, AppError> {
    let filter = SessionFilter {
        session_id: Some(session_id),
        user_id: Some(user_id),
        ..SessionFilter::default()
    };

    fetch_sessions(pool, &filter)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

#[instrument(skip(pool, session))]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    session: &NewSession,
) -> Result<ClimbingSession, AppError> {
    info!(problems = session.problems.len(), "Creating session");

    if !location_exists(pool, session.location_id).await? {
        return Err(AppError::validation("location_id", "Invalid location"));
    }

    let mut tx = pool.begin().await?;

    let session_id = sqlx::query(
        "INSERT INTO sessions (user_id, location_id, date, rating) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(session.location_id)
    .bind(session.date)
    .bind(session.rating)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for problem in &session.problems {
        insert_problem(&mut tx, session_id, problem).await?;
    }

    tx.commit().await?;

    get_session(pool, session_id, user_id).await
}

#[instrument(skip(pool, changes))]
pub async fn update_session(
    pool: &Pool<Sqlite>,
    session_id: i64,
    user_id: i64,
    changes: &SessionChanges,
) -> Result<ClimbingSession, AppError> {
    info!("Updating session");

    if let Some(location_id) = changes.location_id {
        if !location_exists(pool, location_id).await? {
            return Err(AppError::validation("location_id", "Invalid location"));
        }
    }

    let mut tx = pool.begin().await?;

    if !owned_session_exists(&mut tx, session_id, user_id).await? {
        return Err(AppError::NotFound("Session not found".to_string()));
    }

    sqlx::query(
        "UPDATE sessions
         SET location_id = COALESCE(?, location_id),
             date = COALESCE(?, date),
             rating = COALESCE(?, rating)
         WHERE id = ?",
    )
    .bind(changes.location_id)
    .bind(changes.date)
    .bind(changes.rating)
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    if let Some(problems) = &changes.problems {
        sqlx::query("DELETE FROM problems WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        for problem in problems {
            insert_problem(&mut tx, session_id, problem).await?;
        }
    }

    tx.commit().await?;

    get_session(pool, session_id, user_id).await
}

#[instrument(skip(pool))]
pub async fn delete_session(
    pool: &Pool<Sqlite>,
    session_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    info!("Deleting session");
    let res = sqlx::query("DELETE FROM sessions WHERE id = ? AND user_id = ?")
        .bind(session_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Session not found".to_string()));
    }

    Ok(())
}

async fn get_problem(pool: &Pool<Sqlite>, problem_id: i64) -> Result<Problem, AppError> {
    let row = sqlx::query_as::<_, DbProblem>(&format!("{} WHERE id = ?", PROBLEM_COLUMNS))
        .bind(problem_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(problem) => Problem::try_from(problem),
        _ => Err(AppError::NotFound("Problem not found".to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn get_owned_problem(
    pool: &Pool<Sqlite>,
    problem_id: i64,
    user_id: i64,
) -> Result<Problem, AppError> {
    let row = sqlx::query_as::<_, DbProblem>(
        "SELECT p.id, p.session_id, p.grade, p.attempts, p.sends, p.notes, p.created_at
         FROM problems p
         JOIN sessions s ON s.id = p.session_id
         WHERE p.id = ? AND s.user_id = ?",
    )
    .bind(problem_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(problem) => Problem::try_from(problem),
        _ => Err(AppError::NotFound("Problem not found".to_string())),
    }
}

#[instrument(skip(pool, problem))]
pub async fn create_problem(
    pool: &Pool<Sqlite>,
    session_id: i64,
    user_id: i64,
    problem: &NewProblem,
) -> Result<Problem, AppError> {
    info!("Adding problem to session");
    let mut tx = pool.begin().await?;

    if !owned_session_exists(&mut tx, session_id, user_id).await? {
        return Err(AppError::NotFound("Session not found".to_string()));
    }

    let problem_id = insert_problem(&mut tx, session_id, problem).await?;
    tx.commit().await?;

    get_problem(pool, problem_id).await
}

#[instrument(skip(pool, changes))]
pub async fn update_problem(
    pool: &Pool<Sqlite>,
    problem_id: i64,
    user_id: i64,
    changes: &ProblemChanges,
) -> Result<Problem, AppError> {
    info!("Updating problem");
    let current = get_owned_problem(pool, problem_id, user_id).await?;

    let grade = changes.grade.unwrap_or(current.grade);
    let attempts = changes.attempts.unwrap_or(current.attempts);
    let sends = changes.sends.unwrap_or(current.sends);
    let notes = changes.notes.clone().or(current.notes);

    check_sends(attempts, sends)?;

    sqlx::query("UPDATE problems SET grade = ?, attempts = ?, sends = ?, notes = ? WHERE id = ?")
        .bind(grade.as_str())
        .bind(attempts)
        .bind(sends)
        .bind(notes.as_deref())
        .bind(problem_id)
        .execute(pool)
        .await?;

    get_problem(pool, problem_id).await
}

#[instrument(skip(pool))]
pub async fn delete_problem(
    pool: &Pool<Sqlite>,
    problem_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    info!("Deleting problem");
    let res = sqlx::query(
        "DELETE FROM problems
         WHERE id = ? AND session_id IN (SELECT id FROM sessions WHERE user_id = ?)",
    )
    .bind(problem_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Problem not found".to_string()));
    }

    Ok(())
}
