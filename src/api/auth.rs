use rocket::FromForm;
use rocket::State;
use rocket::form::Form;
use rocket::http::Status;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;
use validator::Validate;

use crate::auth::{TokenResponse, TokenService, User};
use crate::db::{UserSettings, authenticate_user, create_user, delete_user, update_user_settings};
use crate::error::AppError;
use crate::models::Grade;
use crate::validation::{
    JsonValidateExt, USERNAME_RE, validate_grade, validate_username_language,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 50, message = "Username must be between 3 and 50 characters"),
        regex(
            path = *USERNAME_RE,
            message = "Username may only contain letters, digits, '.', '_' and '-'"
        ),
        custom(function = "validate_username_language")
    )]
    pub username: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub home_location_id: i64,
}

/// OAuth2 password-flow style login body.
#[derive(Debug, FromForm)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub home_location_id: Option<i64>,
    #[validate(custom(function = "validate_grade"))]
    pub default_grade: Option<String>,
}

#[post("/register", data = "<request>")]
pub async fn api_register(
    request: Json<RegisterRequest>,
    db: &State<Pool<Sqlite>>,
    tokens: &State<TokenService>,
) -> Result<Json<TokenResponse>, AppError> {
    let request = request.validated()?;

    let user = create_user(
        db,
        &request.username,
        &request.password,
        request.home_location_id,
    )
    .await?;
    info!(user_id = user.id, "Registered new user");

    Ok(Json(TokenResponse::bearer(tokens.issue(&user.username)?)))
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Form<LoginForm>,
    db: &State<Pool<Sqlite>>,
    tokens: &State<TokenService>,
) -> Result<Json<TokenResponse>, AppError> {
    match authenticate_user(db, &login.username, &login.password).await? {
        Some(user) => Ok(Json(TokenResponse::bearer(tokens.issue(&user.username)?))),
        None => Err(AppError::Authentication(
            "Incorrect username or password".to_string(),
        )),
    }
}

#[get("/me")]
pub fn api_me(user: User) -> Json<User> {
    Json(user)
}

#[patch("/me", data = "<request>")]
pub async fn api_update_me(
    request: Json<UpdateSettingsRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    let request = request.validated()?;

    let settings = UserSettings {
        home_location_id: request.home_location_id,
        default_grade: request
            .default_grade
            .as_deref()
            .map(Grade::from_str)
            .transpose()?,
    };

    Ok(Json(update_user_settings(db, user.id, &settings).await?))
}

#[delete("/me")]
pub async fn api_delete_me(user: User, db: &State<Pool<Sqlite>>) -> Result<Status, AppError> {
    delete_user(db, user.id).await?;
    info!(user_id = user.id, "Deleted user account");
    Ok(Status::NoContent)
}
