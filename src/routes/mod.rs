pub mod auth;
pub mod budget;
pub mod destinations;
pub mod events;
pub mod trips;
pub mod weather;

use axum::{
    http::{request::Parts, HeaderValue},
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{models::HealthResponse, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .nest("/auth", auth::router())
        .merge(trips::router())
        .merge(destinations::router())
        .merge(events::router())
        .merge(budget::router())
        .merge(weather::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Configured origins plus any Vercel preview deployment.
pub fn origin_allowed(origin: &str, configured: &[String]) -> bool {
    configured.iter().any(|allowed| allowed == origin)
        || origin
            .strip_prefix("https://")
            .and_then(|host| host.strip_suffix(".vercel.app"))
            .is_some_and(|sub| !sub.is_empty() && !sub.contains('/'))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let configured = origins.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| origin_allowed(origin, &configured))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
}
