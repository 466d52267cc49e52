use chrono::Local;
use rocket::FromForm;
use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;

use crate::auth::User;
use crate::db::{SessionFilter, fetch_sessions, get_location};
use crate::error::AppError;
use crate::models::Grade;
use crate::stats::{
    AggregateStats, LocationStats, Period, ProgressPoint, aggregate_stats, grade_distribution,
    location_stats, progress_series,
};
use crate::validation::parse_query_date;

#[derive(Debug, FromForm)]
pub struct ProgressQuery {
    pub location_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, FromForm)]
pub struct PeriodQuery {
    pub location_id: Option<i64>,
    pub period: Option<String>,
}

impl ProgressQuery {
    fn filter(&self, user_id: Option<i64>) -> Result<SessionFilter, AppError> {
        Ok(SessionFilter {
            user_id,
            location_id: self.location_id,
            start_date: parse_query_date("start_date", self.start_date.as_deref())?,
            end_date: parse_query_date("end_date", self.end_date.as_deref())?,
            ..SessionFilter::default()
        })
    }
}

impl PeriodQuery {
    fn filter(&self, user_id: Option<i64>) -> SessionFilter {
        let today = Local::now().date_naive();
        let period = Period::from_keyword(self.period.as_deref());
        SessionFilter {
            user_id,
            location_id: self.location_id,
            start_date: period.start_date(today),
            end_date: period.end_date(today),
            ..SessionFilter::default()
        }
    }
}

#[get("/user/progress?<query..>")]
pub async fn api_user_progress(
    query: ProgressQuery,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProgressPoint>>, AppError> {
    let sessions = fetch_sessions(db, &query.filter(Some(user.id))?).await?;
    Ok(Json(progress_series(&sessions)))
}

#[get("/user/distribution?<query..>")]
pub async fn api_user_distribution(
    query: PeriodQuery,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BTreeMap<Grade, i64>>, AppError> {
    let sessions = fetch_sessions(db, &query.filter(Some(user.id))).await?;
    Ok(Json(grade_distribution(&sessions)))
}

#[get("/location/<location_id>")]
pub async fn api_location_stats(
    location_id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LocationStats>, AppError> {
    get_location(db, location_id).await?;

    let filter = SessionFilter {
        location_id: Some(location_id),
        ..SessionFilter::default()
    };
    let sessions = fetch_sessions(db, &filter).await?;
    Ok(Json(location_stats(&sessions)))
}

#[get("/aggregate?<query..>")]
pub async fn api_aggregate_stats(
    query: PeriodQuery,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AggregateStats>, AppError> {
    let sessions = fetch_sessions(db, &query.filter(None)).await?;
    Ok(Json(aggregate_stats(&sessions)))
}

#[get("/aggregate/progress?<query..>")]
pub async fn api_aggregate_progress(
    query: ProgressQuery,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ProgressPoint>>, AppError> {
    let sessions = fetch_sessions(db, &query.filter(None)?).await?;
    Ok(Json(progress_series(&sessions)))
}
