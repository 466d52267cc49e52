use anyhow::{Context, bail};
use chrono::Duration;
use jsonwebtoken::Algorithm;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://overhang.db";
pub const DEFAULT_TOKEN_MINUTES: i64 = 60 * 24 * 7;
pub const DEFAULT_ALLOWED_ORIGINS: &str =
    "http://localhost:8000,http://127.0.0.1:8000,http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub seed_locations: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = env_or("ENVIRONMENT", "development");
        let is_production = environment.eq_ignore_ascii_case("production");

        let secret_key = match std::env::var("SECRET_KEY") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if is_production => bail!("SECRET_KEY must be set in production environment"),
            _ => {
                warn!("SECRET_KEY not set, generating an ephemeral development key");
                generate_secret()
            }
        };

        let algorithm_name = env_or("ALGORITHM", "HS256");
        let algorithm = Algorithm::from_str(&algorithm_name)
            .with_context(|| format!("ALGORITHM '{}' is not a known algorithm", algorithm_name))?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            bail!("ALGORITHM must be one of HS256, HS384, HS512");
        }

        let expire_raw = env_or(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            &DEFAULT_TOKEN_MINUTES.to_string(),
        );
        let access_token_expire_minutes: i64 = expire_raw.trim().parse().with_context(|| {
            format!("ACCESS_TOKEN_EXPIRE_MINUTES '{}' is not an integer", expire_raw)
        })?;
        if access_token_expire_minutes <= 0 {
            bail!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        }
        Duration::try_minutes(access_token_expire_minutes).with_context(|| {
            format!("ACCESS_TOKEN_EXPIRE_MINUTES '{}' is too large", expire_raw)
        })?;

        let seed_raw = env_or("SEED_LOCATIONS", "true");
        let seed_locations = bool::from_str(&seed_raw.to_ascii_lowercase())
            .with_context(|| format!("SEED_LOCATIONS '{}' is not a boolean", seed_raw))?;

        Ok(Self {
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            secret_key,
            algorithm,
            access_token_expire_minutes,
            environment,
            allowed_origins: parse_origins(&env_or("ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)),
            seed_locations,
        })
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            secret_key: "test_secret_for_testing_only".to_string(),
            algorithm: Algorithm::HS256,
            access_token_expire_minutes: DEFAULT_TOKEN_MINUTES,
            environment: "test".to_string(),
            allowed_origins: parse_origins(DEFAULT_ALLOWED_ORIGINS),
            seed_locations: false,
        }
    }
}
