use chrono::{Local, NaiveDate};
use rocket::FromForm;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::auth::User;
use crate::db::{
    NewProblem, NewSession, ProblemChanges, SessionChanges, create_problem, create_session,
    delete_problem, delete_session, get_session, get_sessions, update_problem, update_session,
};
use crate::error::AppError;
use crate::models::{ClimbingSession, Grade, Problem};
use crate::validation::{JsonValidateExt, parse_query_date, validate_grade};

fn sends_exceed_attempts() -> ValidationError {
    ValidationError::new("sends").with_message("Sends cannot exceed attempts".into())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_problem_counts"))]
pub struct ProblemInput {
    #[validate(custom(function = "validate_grade"))]
    pub grade: String,
    #[validate(range(min = 0, max = 10000, message = "Attempts must be between 0 and 10000"))]
    pub attempts: i64,
    #[validate(range(min = 0, max = 10000, message = "Sends must be between 0 and 10000"))]
    pub sends: i64,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

fn validate_problem_counts(problem: &ProblemInput) -> Result<(), ValidationError> {
    if problem.sends > problem.attempts {
        return Err(sends_exceed_attempts());
    }
    Ok(())
}

impl ProblemInput {
    fn into_new_problem(self) -> Result<NewProblem, AppError> {
        Ok(NewProblem {
            grade: Grade::from_str(&self.grade)?,
            attempts: self.attempts,
            sends: self.sends,
            notes: self.notes,
        })
    }
}

fn into_new_problems(problems: Vec<ProblemInput>) -> Result<Vec<NewProblem>, AppError> {
    problems.into_iter().map(ProblemInput::into_new_problem).collect()
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_problem_update_counts"))]
pub struct UpdateProblemRequest {
    #[validate(custom(function = "validate_grade"))]
    pub grade: Option<String>,
    #[validate(range(min = 0, max = 10000, message = "Attempts must be between 0 and 10000"))]
    pub attempts: Option<i64>,
    #[validate(range(min = 0, max = 10000, message = "Sends must be between 0 and 10000"))]
    pub sends: Option<i64>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

// Only checks a body carrying both counts; partial bodies are checked after merging.
fn validate_problem_update_counts(problem: &UpdateProblemRequest) -> Result<(), ValidationError> {
    match (problem.attempts, problem.sends) {
        (Some(attempts), Some(sends)) if sends > attempts => Err(sends_exceed_attempts()),
        _ => Ok(()),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub location_id: i64,
    #[serde(default = "today")]
    pub date: NaiveDate,
    #[validate(range(min = 1, max = 10, message = "Rating must be between 1 and 10"))]
    pub rating: Option<i64>,
    #[validate(
        length(min = 1, message = "A session needs at least one problem"),
        nested
    )]
    pub problems: Vec<ProblemInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSessionRequest {
    pub location_id: Option<i64>,
    pub date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 10, message = "Rating must be between 1 and 10"))]
    pub rating: Option<i64>,
    #[validate(nested)]
    pub problems: Option<Vec<ProblemInput>>,
}

#[derive(Debug, FromForm)]
pub struct SessionQuery {
    pub location_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[post("/", data = "<request>")]
pub async fn api_create_session(
    request: Json<CreateSessionRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<ClimbingSession>>, AppError> {
    let request = request.validated()?;

    let new_session = NewSession {
        location_id: request.location_id,
        date: request.date,
        rating: request.rating,
        problems: into_new_problems(request.problems)?,
    };

    let session = create_session(db, user.id, &new_session).await?;
    Ok(Created::new(format!("/sessions/{}", session.id)).body(Json(session)))
}

#[get("/?<query..>")]
pub async fn api_get_sessions(
    query: SessionQuery,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ClimbingSession>>, AppError> {
    let start_date = parse_query_date("start_date", query.start_date.as_deref())?;
    let end_date = parse_query_date("end_date", query.end_date.as_deref())?;

    let sessions = get_sessions(db, user.id, query.location_id, start_date, end_date).await?;
    Ok(Json(sessions))
}

#[get("/<session_id>")]
pub async fn api_get_session(
    session_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ClimbingSession>, AppError> {
    Ok(Json(get_session(db, session_id, user.id).await?))
}

#[put("/<session_id>", data = "<request>")]
pub async fn api_update_session(
    session_id: i64,
    request: Json<UpdateSessionRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ClimbingSession>, AppError> {
    let request = request.validated()?;

    let changes = SessionChanges {
        location_id: request.location_id,
        date: request.date,
        rating: request.rating,
        problems: request.problems.map(into_new_problems).transpose()?,
    };

    Ok(Json(update_session(db, session_id, user.id, &changes).await?))
}

#[delete("/<session_id>")]
pub async fn api_delete_session(
    session_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    delete_session(db, session_id, user.id).await?;
    Ok(Status::NoContent)
}

#[post("/<session_id>/problems", data = "<request>")]
pub async fn api_create_problem(
    session_id: i64,
    request: Json<ProblemInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<Problem>>, AppError> {
    let problem = request.validated()?.into_new_problem()?;

    let problem = create_problem(db, session_id, user.id, &problem).await?;
    Ok(Created::new(format!("/sessions/problems/{}", problem.id)).body(Json(problem)))
}

#[put("/problems/<problem_id>", data = "<request>")]
pub async fn api_update_problem(
    problem_id: i64,
    request: Json<UpdateProblemRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Problem>, AppError> {
    let request = request.validated()?;

    let changes = ProblemChanges {
        grade: request.grade.as_deref().map(Grade::from_str).transpose()?,
        attempts: request.attempts,
        sends: request.sends,
        notes: request.notes,
    };

    Ok(Json(update_problem(db, problem_id, user.id, &changes).await?))
}

#[delete("/problems/<problem_id>")]
pub async fn api_delete_problem(
    problem_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    delete_problem(db, problem_id, user.id).await?;
    Ok(Status::NoContent)
}
