#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod database;
mod db;
mod env;
mod error;
mod models;
mod stats;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::auth::{api_delete_me, api_login, api_me, api_register, api_update_me};
use api::locations::{api_get_location, api_get_locations};
use api::sessions::{
    api_create_problem, api_create_session, api_delete_problem, api_delete_session,
    api_get_session, api_get_sessions, api_update_problem, api_update_session,
};
use api::stats::{
    api_aggregate_progress, api_aggregate_stats, api_location_stats, api_user_distribution,
    api_user_progress,
};
use api::{health, preflight};
use auth::{
    TokenService, bad_request_api, internal_error_api, not_found_api, unauthorized_api,
    unprocessable_api,
};
use config::Config;
use error::AppError;
use once_cell::sync::Lazy;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use std::sync::Mutex;
use telemetry::{CorsFairing, OtelGuard, TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::info;

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    env::load_environment()?;
    init_tracing()?;

    let config = Config::from_env()?;

    let pool = database::connect(&config.database_url).await?;
    database::apply_schema(&pool).await?;

    if config.seed_locations {
        let seeded = database::seed_default_locations(&pool).await?;
        if seeded > 0 {
            info!("Seeded {} default locations", seeded);
        }
    }

    let result = init_rocket(pool, config)?.launch().await;

    shutdown_telemetry();
    result?;

    Ok(())
}

pub fn init_rocket(pool: SqlitePool, config: Config) -> Result<Rocket<Build>, AppError> {
    info!(environment = %config.environment, "Starting overhang");

    let tokens = TokenService::from_config(&config)?;
    info!(
        token_lifetime_minutes = tokens.lifetime().num_minutes(),
        "Token service ready"
    );

    Ok(rocket::build()
        .manage(pool)
        .manage(tokens)
        .mount(
            "/auth",
            routes![api_register, api_login, api_me, api_update_me, api_delete_me],
        )
        .mount("/locations", routes![api_get_locations, api_get_location])
        .mount(
            "/sessions",
            routes![
                api_create_session,
                api_get_sessions,
                api_get_session,
                api_update_session,
                api_delete_session,
                api_create_problem,
                api_update_problem,
                api_delete_problem,
            ],
        )
        .mount(
            "/stats",
            routes![
                api_user_progress,
                api_user_distribution,
                api_location_stats,
                api_aggregate_stats,
                api_aggregate_progress,
            ],
        )
        .mount("/", routes![health, preflight])
        .register(
            "/",
            catchers![
                bad_request_api,
                unauthorized_api,
                not_found_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .attach(TelemetryFairing)
        .attach(CorsFairing::new(config)))
}
