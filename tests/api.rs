use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use tripplanner::{
    config::AppConfig,
    db::{init_pool, run_migrations},
    error::AppError,
    routes::create_router,
    services::weather_client::{Coordinates, ForecastDay, ForecastProvider},
    state::AppState,
};
use url::Url;

/// Knows every city except Atlantis; storms on the 3rd of the month.
struct StormOnThird;

#[async_trait]
impl ForecastProvider for StormOnThird {
    async fn geocode(&self, name: &str) -> Result<Option<Coordinates>, AppError> {
        Ok((name != "Atlantis").then_some(Coordinates {
            latitude: 38.7,
            longitude: -9.1,
        }))
    }

    async fn daily_forecast(
        &self,
        _at: Coordinates,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ForecastDay>, AppError> {
        Ok(start
            .iter_days()
            .take_while(|day| *day <= end)
            .map(|day| {
                if day.format("%d").to_string() == "03" {
                    ForecastDay {
                        precip_prob: 95,
                        precip_sum: 20.0,
                        wind_gust: 70.0,
                        apparent_max: 33.0,
                        ..ForecastDay::calm(day)
                    }
                } else {
                    ForecastDay::calm(day)
                }
            })
            .collect())
    }
}

struct TestApp {
    router: Router,
    _root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let database_url = format!("sqlite://{}", root.path().join("api.sqlite").display());
        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            access_token_expire_minutes: 60,
            geocoding_url: Url::parse("http://127.0.0.1:9/v1/search").unwrap(),
            forecast_url: Url::parse("http://127.0.0.1:9/v1/forecast").unwrap(),
            cors_origins: vec!["http://localhost:5173".into()],
            seed_demo: false,
        };
        let db = init_pool(&database_url).await.unwrap();
        run_migrations(&db).await.unwrap();
        let state = AppState::new(config, db, Arc::new(StormOnThird));
        Self {
            router: create_router(state),
            _root: root,
        }
    }

    async fn raw(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.raw(request).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Registers and logs in, returning the user id and bearer token.
    async fn sign_up(&self, username: &str) -> (i64, String) {
        let (status, user) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": format!("{username}@example.com"),
                    "username": username,
                    "password": "secret"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, token) = self
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": username, "password": "secret" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(token["token_type"], "bearer");
        (
            user["id"].as_i64().unwrap(),
            token["access_token"].as_str().unwrap().to_string(),
        )
    }

    async fn create_trip(&self, token: &str, destination: &str) -> i64 {
        let (status, trip) = self
            .call(
                Method::POST,
                "/trips",
                Some(token),
                Some(json!({
                    "name": "June getaway",
                    "destination": destination,
                    "start_date": "2026-06-01",
                    "end_date": "2026-06-05",
                    "total_budget": 1000.0,
                    "owner_id": 999
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        trip["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    for path in ["/", "/health"] {
        let (status, body) = app.call(Method::GET, path, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }
}

#[tokio::test]
async fn missing_or_bad_tokens_are_rejected() {
    let app = TestApp::new().await;
    let response = app
        .raw(Request::get("/trips").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let (status, body) = app.call(Method::GET, "/auth/me", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Could not validate credentials");
}

#[tokio::test]
async fn login_logout_round() {
    let app = TestApp::new().await;
    let (user_id, token) = app.sign_up("ana").await;

    let (status, me) = app.call(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user_id);
    assert_eq!(me["username"], "ana");

    let (status, _) = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "identifier": "ana@example.com", "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::POST, "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trips_belong_to_the_caller() {
    let app = TestApp::new().await;
    let (ana_id, ana) = app.sign_up("ana").await;
    let (bo_id, bo) = app.sign_up("bo").await;
    let trip_id = app.create_trip(&ana, "Lisbon").await;

    let (_, trip) = app
        .call(Method::GET, &format!("/trips/{trip_id}"), Some(&ana), None)
        .await;
    assert_eq!(trip["owner_id"], ana_id);
    assert_eq!(trip["currency"], "USD");
    assert_eq!(trip["party_size"], 1);

    let (status, body) = app
        .call(Method::GET, &format!("/trips/{trip_id}"), Some(&bo), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Not authorized for this trip");

    let (status, body) = app.call(Method::GET, "/trips/4242", Some(&bo), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Trip not found");

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/members"),
            Some(&ana),
            Some(json!({ "user_id": bo_id, "role": "captain" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, member) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/members"),
            Some(&ana),
            Some(json!({ "user_id": bo_id, "role": "viewer" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["role"], "viewer");

    let (_, listed) = app.call(Method::GET, "/trips", Some(&bo), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/events"),
            Some(&bo),
            Some(json!({
                "trip_id": trip_id, "date": "2026-06-02", "title": "Tram 28", "type": "activity"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Only owner or editor can modify this trip");

    let (status, _) = app
        .call(Method::DELETE, &format!("/trips/{trip_id}"), Some(&bo), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::DELETE, &format!("/trips/{trip_id}"), Some(&ana), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(Method::GET, &format!("/trips/{trip_id}"), Some(&ana), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn event_patch_distinguishes_null_from_absent() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("ana").await;
    let trip_id = app.create_trip(&token, "Lisbon").await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/events"),
            Some(&token),
            Some(json!({
                "trip_id": trip_id + 1, "date": "2026-06-02", "title": "Tram", "type": "activity"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Trip ID mismatch");

    let (status, event) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/events"),
            Some(&token),
            Some(json!({
                "trip_id": trip_id, "date": "2026-06-02", "title": "Fado night",
                "type": "show", "notes": "book ahead", "cost": 35.0, "start_time": "21:00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["category_type"], "other");
    assert_eq!(event["is_refundable"], false);
    let event_id = event["id"].as_i64().unwrap();

    let (status, patched) = app
        .call(
            Method::PATCH,
            &format!("/events/{event_id}"),
            Some(&token),
            Some(json!({ "notes": null, "title": "Fado at Alfama" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["notes"], Value::Null);
    assert_eq!(patched["title"], "Fado at Alfama");
    assert_eq!(patched["cost"], 35.0);

    let (status, patched) = app
        .call(
            Method::PATCH,
            &format!("/events/{event_id}"),
            Some(&token),
            Some(json!({ "category_type": "outdoor" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["category_type"], "outdoor");

    let (status, patched) = app
        .call(
            Method::PATCH,
            &format!("/events/{event_id}"),
            Some(&token),
            Some(json!({ "category_type": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["category_type"], "other");
    let (_, events) = app
        .call(Method::GET, &format!("/trips/{trip_id}/events"), Some(&token), None)
        .await;
    assert_eq!(events[0]["category_type"], "other");

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/events/{event_id}"),
            Some(&token),
            Some(json!({ "end_time": "20:00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::DELETE, &format!("/events/{event_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .call(Method::DELETE, &format!("/events/{event_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn budget_endpoints_track_spending() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("ana").await;
    let trip_id = app.create_trip(&token, "Lisbon").await;

    let (_, summary) = app
        .call(Method::GET, &format!("/trips/{trip_id}/budget"), Some(&token), None)
        .await;
    assert_eq!(summary["envelopes"].as_array().unwrap().len(), 4);
    assert_eq!(summary["totals"]["planned_total_all"], 1000.0);

    let food_id = summary["envelopes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["envelope"]["category"] == "food")
        .map(|row| row["envelope"]["id"].as_i64().unwrap())
        .unwrap();

    let (status, expense) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/expenses"),
            Some(&token),
            Some(json!({
                "trip_id": trip_id, "envelope_id": food_id, "description": "Pasteis",
                "amount": 12.5, "spent_at_date": "2026-06-01"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(expense["currency"], "USD");

    let (_, summary) = app
        .call(Method::GET, &format!("/trips/{trip_id}/budget"), Some(&token), None)
        .await;
    assert_eq!(summary["totals"]["actual_total_all"], 12.5);
    assert_eq!(summary["categories"]["food"]["actual_total"], 12.5);

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/envelopes/{food_id}"),
            Some(&token),
            Some(json!({ "trip_id": trip_id + 7 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Cannot move envelope to another trip");

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/envelopes/{food_id}"),
            Some(&token),
            Some(json!({ "planned_amount": 1.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, envelopes) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/budget/recalculate"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let food = envelopes
        .as_array()
        .unwrap()
        .iter()
        .find(|env| env["category"] == "food")
        .unwrap()
        .clone();
    assert_eq!(food["planned_amount"], 300.0);

    let (status, _) = app
        .call(Method::DELETE, &format!("/envelopes/{food_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, summary) = app
        .call(Method::GET, &format!("/trips/{trip_id}/budget"), Some(&token), None)
        .await;
    assert_eq!(summary["expenses"][0]["envelope_id"], Value::Null);
    assert_eq!(summary["categories"]["uncategorized"]["actual_total"], 12.5);
}

#[tokio::test]
async fn weather_scores_days_and_flags_outdoor_events() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("ana").await;
    let trip_id = app.create_trip(&token, "Lisbon").await;

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/events"),
            Some(&token),
            Some(json!({
                "trip_id": trip_id, "date": "2026-06-03", "title": "Sintra hike",
                "type": "excursion", "category_type": "hiking"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, weather) = app
        .call(Method::GET, &format!("/trips/{trip_id}/weather"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(weather["city"], "Lisbon");
    let days = weather["days"].as_array().unwrap();
    assert_eq!(days.len(), 5);
    assert_eq!(days[2]["risk_score"], 77);
    assert_eq!(days[2]["risk_category"], "high");
    assert_eq!(days[0]["risk_category"], "low");
    let alerts = weather["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "high");
    assert_eq!(alerts[0]["summary"], "High risk: Rainy");
    assert_eq!(alerts[0]["contributing_factors"].as_array().unwrap().len(), 4);

    let (status, impacts) = app
        .call(
            Method::GET,
            &format!("/trips/{trip_id}/schedule/alerts"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let impacts = impacts.as_array().unwrap();
    assert_eq!(impacts.len(), 1);
    assert_eq!(impacts[0]["event"]["title"], "Sintra hike");
    assert_eq!(impacts[0]["event"]["type"], "excursion");
    assert_eq!(impacts[0]["suggested_date"], "2026-06-02");
    assert_eq!(impacts[0]["reason"], "High risk (high) on 2026-06-03");

    let (_, stored) = app
        .call(Method::GET, &format!("/trips/{trip_id}/alerts"), Some(&token), None)
        .await;
    assert_eq!(stored.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_destination_is_not_found() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("ana").await;
    let trip_id = app.create_trip(&token, "Atlantis").await;

    let (status, body) = app
        .call(Method::GET, &format!("/trips/{trip_id}/weather"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["detail"],
        "Could not find location for this trip's destination"
    );
}

#[tokio::test]
async fn destinations_reorder_over_http() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("ana").await;
    let trip_id = app.create_trip(&token, "Lisbon").await;

    let mut ids = Vec::new();
    for name in ["Lisbon", "Sintra", "Cascais"] {
        let (status, stop) = app
            .call(
                Method::POST,
                &format!("/trips/{trip_id}/destinations"),
                Some(&token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stop["location"]["type"], "city");
        ids.push(stop["id"].as_i64().unwrap());
    }

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/trips/{trip_id}/destinations"),
            Some(&token),
            Some(json!({ "name": "  " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reordered) = app
        .call(
            Method::PATCH,
            &format!("/trips/{trip_id}/destinations/{}?direction=up", ids[2]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = reordered
        .as_array()
        .unwrap()
        .iter()
        .map(|stop| stop["location"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Lisbon", "Cascais", "Sintra"]);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/trips/{trip_id}/destinations/{}", ids[0]),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, remaining) = app
        .call(
            Method::GET,
            &format!("/trips/{trip_id}/destinations"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(remaining.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn export_is_a_downloadable_page() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("ana").await;
    let trip_id = app.create_trip(&token, "Lisbon").await;

    let response = app
        .raw(
            Request::get(format!("/trips/{trip_id}/export"))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"trip-{trip_id}.html\"").as_str()
    );
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(html.to_vec()).unwrap();
    assert!(html.contains("June getaway"));
    assert!(html.contains("No events planned yet."));
}

#[tokio::test]
async fn cors_allows_configured_and_vercel_origins() {
    let app = TestApp::new().await;
    for origin in ["http://localhost:5173", "https://trip-preview.vercel.app"] {
        let response = app
            .raw(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/trips")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            origin
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    let response = app
        .raw(
            Request::get("/health")
                .header(header::ORIGIN, "https://elsewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
