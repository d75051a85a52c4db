use std::{env, net::SocketAddr};

use url::Url;

use crate::error::AppError;

const ENV_PREFIX: &str = "TRIP_PLANNER_";
/// One year.
const MAX_TOKEN_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub access_token_expire_minutes: i64,
    pub geocoding_url: Url,
    pub forecast_url: Url,
    pub cors_origins: Vec<String>,
    pub seed_demo: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite://tripplanner.db".into());

        let listen_addr: SocketAddr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8000".into())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid {ENV_PREFIX}LISTEN_ADDR: {err}")))?;

        let access_token_expire_minutes = match var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Some(raw) => parse_token_minutes(&raw)?,
            None => 60 * 24,
        };

        let geocoding_url = parse_url(
            "GEOCODING_URL",
            "https://geocoding-api.open-meteo.com/v1/search",
        )?;
        let forecast_url = parse_url("FORECAST_URL", "https://api.open-meteo.com/v1/forecast")?;

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://127.0.0.1:5173".into())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let seed_demo = var("SEED_DEMO")
            .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            listen_addr,
            access_token_expire_minutes,
            geocoding_url,
            forecast_url,
            cors_origins,
            seed_demo,
        })
    }
}

fn var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn parse_token_minutes(raw: &str) -> Result<i64, AppError> {
    let minutes: i64 = raw.trim().parse().map_err(|err| {
        AppError::Config(format!("invalid {ENV_PREFIX}ACCESS_TOKEN_EXPIRE_MINUTES: {err}"))
    })?;
    if !(1..=MAX_TOKEN_MINUTES).contains(&minutes) {
        return Err(AppError::Config(format!(
            "{ENV_PREFIX}ACCESS_TOKEN_EXPIRE_MINUTES must be between 1 and {MAX_TOKEN_MINUTES}"
        )));
    }
    Ok(minutes)
}

fn parse_url(name: &str, default: &str) -> Result<Url, AppError> {
    let raw = var(name).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|err| AppError::Config(format!("invalid {ENV_PREFIX}{name}: {err}")))
}
