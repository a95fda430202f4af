use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::anyhow;
use tracing::{info, warn};

use crate::engine::DEFAULT_MAX_IMAGE_BYTES;

pub struct Config {
    pub port: u16,
    /// Unset means rooms live in process memory only.
    pub database_url: Option<String>,
    pub image_dir: PathBuf,
    pub max_image_bytes: usize,
    pub voter_session_days: i64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        if dotenv::dotenv().is_err() {
            info!("No .env file, reading the environment only");
        }

        Ok(Self {
            port: try_load("PORT", "8080")?,
            database_url: env::var("DATABASE_URL").ok(),
            image_dir: try_load::<String>("IMAGE_DIR", "./uploads")?.into(),
            max_image_bytes: try_load("MAX_IMAGE_BYTES", &DEFAULT_MAX_IMAGE_BYTES.to_string())?,
            voter_session_days: try_load("VOTER_SESSION_DAYS", "30")?,
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value: {e}"))
}
