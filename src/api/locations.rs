use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::db::{get_location_by_slug, get_locations};
use crate::error::AppError;
use crate::models::Location;

#[get("/")]
pub async fn api_get_locations(db: &State<Pool<Sqlite>>) -> Result<Json<Vec<Location>>, AppError> {
    Ok(Json(get_locations(db).await?))
}

#[get("/<slug>")]
pub async fn api_get_location(
    slug: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Location>, AppError> {
    Ok(Json(get_location_by_slug(db, slug).await?))
}
