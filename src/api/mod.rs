pub mod auth;
pub mod locations;
pub mod sessions;
pub mod stats;

use rocket::http::Status;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[get("/health")]
pub fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Answers CORS preflight requests; the headers come from `CorsFairing`.
#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}
