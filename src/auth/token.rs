use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Issues and checks signed access tokens whose subject is a username.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, algorithm: Algorithm, lifetime: Duration) -> Result<Self, AppError> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AppError::Internal(format!(
                "Unsupported token algorithm {:?}, expected an HMAC algorithm",
                algorithm
            )));
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let lifetime = Duration::try_minutes(config.access_token_expire_minutes)
            .ok_or_else(|| AppError::Internal("Token lifetime is out of range".to_string()))?;
        Self::new(&config.secret_key, config.algorithm, lifetime)
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, username: &str) -> Result<String, AppError> {
        self.issue_at(username, Utc::now().timestamp())
    }

    #[instrument(skip(self))]
    pub fn issue_at(&self, username: &str, issued_at: i64) -> Result<String, AppError> {
        let exp = issued_at
            .checked_add(self.lifetime.num_seconds())
            .ok_or_else(|| AppError::Internal("Token expiry is out of range".to_string()))?;
        let claims = Claims {
            sub: Some(username.to_string()),
            iat: issued_at,
            exp,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Returns the token's subject.
    pub fn verify(&self, token: &str) -> Result<String, AppError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// A token stays valid up to and including its `exp` second.
    #[instrument(skip(self, token))]
    pub fn verify_at(&self, token: &str, now: i64) -> Result<String, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if now > data.claims.exp {
            return Err(AppError::Authentication("Token has expired".to_string()));
        }

        match data.claims.sub {
            Some(sub) if !sub.is_empty() => Ok(sub),
            _ => Err(AppError::Authentication(
                "Token is missing its subject".to_string(),
            )),
        }
    }
}
