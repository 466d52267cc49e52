use rocket::{Request, Responder};
use rocket::http::{Header, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::db::find_user_by_username;
use crate::error::AppError;
use crate::validation::{ToValidationResponse, ValidationResponse};

use super::{TokenService, User};

fn bearer_token<'r>(request: &'r Request<'_>) -> Result<&'r str, AppError> {
    let header = request
        .headers()
        .get_one("Authorization")
        .ok_or_else(|| AppError::Authentication("Missing Authorization header".to_string()))?;

    match header.split_once(' ') {
        Some((scheme, token))
            if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() =>
        {
            Ok(token.trim())
        }
        _ => Err(AppError::Authentication(
            "Authorization header is not a bearer token".to_string(),
        )),
    }
}

async fn authenticate(request: &Request<'_>) -> Result<User, AppError> {
    let token = bearer_token(request)?;

    let tokens = request
        .rocket()
        .state::<TokenService>()
        .ok_or_else(|| AppError::Internal("Token service not found in managed state".to_string()))?;
    let pool = request
        .rocket()
        .state::<SqlitePool>()
        .ok_or_else(|| AppError::Internal("Database pool not found in managed state".to_string()))?;

    let username = tokens.verify(token)?;

    match find_user_by_username(pool, &username).await? {
        Some(user) => Ok(user),
        None => Err(AppError::Authentication(
            "Token subject no longer exists".to_string(),
        )),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let outcome = authenticate(request)
            .instrument(tracing::info_span!("user_auth_guard"))
            .await;

        match outcome {
            Ok(user) => {
                tracing::info!(username = %user.username, "User authenticated via bearer token");
                Outcome::Success(user)
            }
            Err(err) => {
                err.log_and_record("Bearer authentication");
                let status = match err {
                    AppError::Authentication(_) => Status::Unauthorized,
                    _ => Status::InternalServerError,
                };
                Outcome::Error((status, ()))
            }
        }
    }
}

#[derive(Responder)]
#[response(status = 401)]
pub struct UnauthorizedResponse {
    body: Json<ValidationResponse>,
    challenge: Header<'static>,
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> UnauthorizedResponse {
    UnauthorizedResponse {
        body: Json(ValidationResponse::with_error(
            "authentication",
            "Could not validate credentials",
        )),
        challenge: Header::new("WWW-Authenticate", "Bearer"),
    }
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::BadRequest.to_validation_response()
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::NotFound.to_validation_response()
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::UnprocessableEntity.to_validation_response()
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::InternalServerError.to_validation_response()
}
