use std::sync::Arc;

use crate::{config::AppConfig, db::DbPool, services::weather_client::ForecastProvider};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub forecast: Arc<dyn ForecastProvider>,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, forecast: Arc<dyn ForecastProvider>) -> Self {
        Self {
            config,
            db,
            forecast,
        }
    }
}
