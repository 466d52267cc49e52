use std::path::Path;

use tracing::{info, warn};

pub fn load_environment() -> anyhow::Result<()> {
    let is_production = dotenvy::var("ENVIRONMENT")
        .or_else(|_| dotenvy::var("ROCKET_PROFILE"))
        .unwrap_or_else(|_| "development".to_string())
        == "production";

    let env_files = if is_production {
        vec![".env", "config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec![".env", "config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> anyhow::Result<()> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
