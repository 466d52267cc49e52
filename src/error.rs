use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use thiserror::Error;
use tracing::{Span, error, warn};

use crate::validation::{ToValidationResponse, ValidationResponse};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("Conflict: {field}: {message}")]
    Conflict { field: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn conflict(field: &str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Maps a SQLite unique-constraint violation onto `Conflict`, anything else stays a
    /// database error.
    pub fn from_write(err: sqlx::Error, field: &str, message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::conflict(field, message)
            }
            _ => AppError::Database(err),
        }
    }

    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
                "database_error"
            }
            AppError::Authentication(msg) => {
                warn!(message = %msg, context = %ctx, "Authentication error");
                "authentication_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::Validation { field, message } => {
                warn!(field = %field, message = %message, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::InvalidInput(errors) => {
                warn!(errors = ?errors, context = %ctx, "Invalid input");
                "invalid_input_error"
            }
            AppError::Conflict { field, message } => {
                warn!(field = %field, message = %message, context = %ctx, "Conflict error");
                "conflict_error"
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
                "internal_error"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));

            if let AppError::Database(_) | AppError::Internal(_) = self {
                current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::Authentication(_) => Status::Unauthorized,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation { .. } => Status::BadRequest,
            AppError::InvalidInput(_) => Status::UnprocessableEntity,
            AppError::Conflict { .. } => Status::Conflict,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.log_and_record(&format!("Request to {} {}", req.method(), req.uri()));
        let response: Custom<Json<ValidationResponse>> = self.to_validation_response();
        response.respond_to(req)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Cryptography error: {}", error))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        AppError::Authentication(format!("Invalid token: {}", error))
    }
}
