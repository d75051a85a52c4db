use std::sync::Arc;

use chrono::Local;
use tokio::net::TcpListener;
use tracing::{error, info};
use tripplanner::config::AppConfig;
use tripplanner::db::{init_pool, run_migrations};
use tripplanner::error::AppError;
use tripplanner::routes::create_router;
use tripplanner::services::{seed, weather_client::OpenMeteo};
use tripplanner::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let db = init_pool(&config.database_url).await?;

    if let Err(err) = run_migrations(&db).await {
        error!("migration failed: {err:?}");
        return Err(err);
    }

    if config.seed_demo {
        let trip_id = seed::seed_demo(&db, Local::now().date_naive()).await?;
        info!(
            trip_id,
            "demo data seeded, log in as {} / {}",
            seed::DEMO_EMAIL,
            seed::DEMO_PASSWORD
        );
    }

    let forecast = OpenMeteo::new(config.geocoding_url.clone(), config.forecast_url.clone())?;
    let state = AppState::new(config.clone(), db.clone(), Arc::new(forecast));

    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tripplanner=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
