use crate::error::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// A malformed stored hash verifies as `false` rather than erroring.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}
