use crate::error::AppError;
use crate::models::Grade;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use validator::{Validate, ValidationError};

pub static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").expect("username pattern is a valid regex")
});

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }

    pub fn from_validation_errors(errors: &validator::ValidationErrors) -> Self {
        let mut error_map = HashMap::new();
        collect_field_errors(errors, None, &mut error_map);
        Self::new(error_map)
    }

    /// First message reported for `field`, if any.
    #[cfg(test)]
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }
}

fn collect_field_errors(
    errors: &validator::ValidationErrors,
    prefix: Option<&str>,
    out: &mut HashMap<String, Vec<String>>,
) {
    for (field, kind) in errors.errors() {
        // struct-level checks report under `__all__`
        let path = match (prefix, &**field) {
            (Some(prefix), "__all__") => prefix.to_string(),
            (None, "__all__") => "request".to_string(),
            (Some(prefix), _) => format!("{}.{}", prefix, field),
            (None, _) => field.to_string(),
        };

        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                let messages = field_errors.iter().map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                });
                out.entry(path).or_default().extend(messages);
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                collect_field_errors(nested, Some(&path), out);
            }
            validator::ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(nested, Some(&format!("{}[{}]", path, index)), out);
                }
            }
        }
    }
}

pub trait ToValidationResponse {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>>;
}

impl ToValidationResponse for AppError {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        let status = self.status_code();

        let body = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                ValidationResponse::with_error("server", "Internal server error")
            }
            AppError::Authentication(msg) => ValidationResponse::with_error("authentication", msg),
            AppError::NotFound(msg) => ValidationResponse::with_error("resource", msg),
            AppError::Validation { field, message } | AppError::Conflict { field, message } => {
                ValidationResponse::with_error(field, message)
            }
            AppError::InvalidInput(errors) => ValidationResponse::from_validation_errors(errors),
        };

        Custom(status, Json(body))
    }
}

impl ToValidationResponse for Status {
    fn to_validation_response(self) -> Custom<Json<ValidationResponse>> {
        let (field, message) = match self.code {
            401 => ("authentication", "Authentication required"),
            404 => ("resource", "Resource not found"),
            409 => ("resource", "Resource already exists"),
            400 => ("request", "Bad request"),
            422 => ("request", "Request body could not be parsed"),
            500 => ("server", "Internal server error"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

pub trait JsonValidateExt<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

pub fn validate_grade(grade: &str) -> Result<(), ValidationError> {
    match Grade::from_str(grade) {
        Ok(_) => Ok(()),
        Err(_) => {
            let labels: Vec<&str> = Grade::ALL.iter().map(|g| g.as_str()).collect();
            Err(ValidationError::new("grade")
                .with_message(format!("Grade must be one of: {}", labels.join(", ")).into()))
        }
    }
}

pub fn validate_username_language(username: &str) -> Result<(), ValidationError> {
    if username.is_inappropriate() {
        return Err(ValidationError::new("username_language")
            .with_message("Username contains inappropriate language".into()));
    }
    Ok(())
}

/// Parses an optional `YYYY-MM-DD` query value.
pub fn parse_query_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::validation(field, "Expected a date formatted as YYYY-MM-DD")),
    }
}
