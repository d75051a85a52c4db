use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::ClientError;
use crate::models::{
    budget::{
        BudgetEnvelope, BudgetEnvelopeCreate, BudgetEnvelopeUpdate, BudgetSummary, Expense,
        ExpenseCreate, ExpenseUpdate,
    },
    destination::{Destination, DestinationCreate, MoveDirection},
    event::{Event, EventCreate, EventUpdate},
    trip::{Trip, TripCreate, TripMember, TripMemberUpsert, TripUpdate},
    user::{TokenResponse, UserCreate, UserLogin, UserRead},
    weather::{AlertDetail, ScheduleImpact, TripWeather},
    HealthResponse,
};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Every call goes through here so the bearer token is never forgotten.
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.base.join(path.trim_start_matches('/'))?;
        let builder = self.http.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn checked(builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("detail").map(detail_text))
            .unwrap_or(body);
        Err(ClientError::Status { status, detail })
    }

    async fn fetch<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T, ClientError> {
        let response = Self::checked(self.request(method, path)?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = Self::checked(self.request(method, path)?.json(body)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn remove(&self, path: &str) -> Result<(), ClientError> {
        Self::checked(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.fetch(Method::GET, "/health").await
    }

    pub async fn register(&self, payload: &UserCreate) -> Result<UserRead, ClientError> {
        self.send(Method::POST, "/auth/register", payload).await
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let payload = UserLogin {
            identifier: Some(identifier.to_string()),
            password: password.to_string(),
            ..UserLogin::default()
        };
        self.send(Method::POST, "/auth/login", &payload).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        Self::checked(self.request(Method::POST, "/auth/logout")?).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserRead, ClientError> {
        self.fetch(Method::GET, "/auth/me").await
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, ClientError> {
        self.fetch(Method::GET, "/trips").await
    }

    pub async fn create_trip(&self, payload: &TripCreate) -> Result<Trip, ClientError> {
        self.send(Method::POST, "/trips", payload).await
    }

    pub async fn get_trip(&self, trip_id: i64) -> Result<Trip, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}")).await
    }

    pub async fn update_trip(&self, trip_id: i64, payload: &TripUpdate) -> Result<Trip, ClientError> {
        self.send(Method::PATCH, &format!("/trips/{trip_id}"), payload)
            .await
    }

    pub async fn delete_trip(&self, trip_id: i64) -> Result<(), ClientError> {
        self.remove(&format!("/trips/{trip_id}")).await
    }

    pub async fn list_members(&self, trip_id: i64) -> Result<Vec<TripMember>, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/members"))
            .await
    }

    pub async fn upsert_member(
        &self,
        trip_id: i64,
        payload: &TripMemberUpsert,
    ) -> Result<TripMember, ClientError> {
        self.send(Method::POST, &format!("/trips/{trip_id}/members"), payload)
            .await
    }

    pub async fn remove_member(&self, trip_id: i64, user_id: i64) -> Result<(), ClientError> {
        self.remove(&format!("/trips/{trip_id}/members/{user_id}"))
            .await
    }

    /// Printable HTML itinerary.
    pub async fn export_trip(&self, trip_id: i64) -> Result<String, ClientError> {
        let response =
            Self::checked(self.request(Method::GET, &format!("/trips/{trip_id}/export"))?).await?;
        Ok(response.text().await?)
    }

    pub async fn list_destinations(&self, trip_id: i64) -> Result<Vec<Destination>, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/destinations"))
            .await
    }

    pub async fn add_destination(
        &self,
        trip_id: i64,
        payload: &DestinationCreate,
    ) -> Result<Destination, ClientError> {
        self.send(
            Method::POST,
            &format!("/trips/{trip_id}/destinations"),
            payload,
        )
        .await
    }

    pub async fn move_destination(
        &self,
        trip_id: i64,
        destination_id: i64,
        direction: MoveDirection,
    ) -> Result<Vec<Destination>, ClientError> {
        self.fetch(
            Method::PATCH,
            &format!(
                "/trips/{trip_id}/destinations/{destination_id}?direction={}",
                direction.as_str()
            ),
        )
        .await
    }

    pub async fn remove_destination(&self, trip_id: i64, destination_id: i64) -> Result<(), ClientError> {
        self.remove(&format!("/trips/{trip_id}/destinations/{destination_id}"))
            .await
    }

    pub async fn list_events(&self, trip_id: i64) -> Result<Vec<Event>, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/events"))
            .await
    }

    pub async fn create_event(&self, trip_id: i64, payload: &EventCreate) -> Result<Event, ClientError> {
        self.send(Method::POST, &format!("/trips/{trip_id}/events"), payload)
            .await
    }

    pub async fn update_event(&self, event_id: i64, payload: &EventUpdate) -> Result<Event, ClientError> {
        self.send(Method::PATCH, &format!("/events/{event_id}"), payload)
            .await
    }

    pub async fn delete_event(&self, event_id: i64) -> Result<(), ClientError> {
        self.remove(&format!("/events/{event_id}")).await
    }

    pub async fn budget_summary(&self, trip_id: i64) -> Result<BudgetSummary, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/budget"))
            .await
    }

    pub async fn recalculate_budget(&self, trip_id: i64) -> Result<Vec<BudgetEnvelope>, ClientError> {
        self.send(
            Method::POST,
            &format!("/trips/{trip_id}/budget/recalculate"),
            &json!({}),
        )
        .await
    }

    pub async fn create_envelope(
        &self,
        trip_id: i64,
        payload: &BudgetEnvelopeCreate,
    ) -> Result<BudgetEnvelope, ClientError> {
        self.send(Method::POST, &format!("/trips/{trip_id}/envelopes"), payload)
            .await
    }

    pub async fn update_envelope(
        &self,
        envelope_id: i64,
        payload: &BudgetEnvelopeUpdate,
    ) -> Result<BudgetEnvelope, ClientError> {
        self.send(Method::PATCH, &format!("/envelopes/{envelope_id}"), payload)
            .await
    }

    pub async fn delete_envelope(&self, envelope_id: i64) -> Result<(), ClientError> {
        self.remove(&format!("/envelopes/{envelope_id}")).await
    }

    pub async fn create_expense(&self, trip_id: i64, payload: &ExpenseCreate) -> Result<Expense, ClientError> {
        self.send(Method::POST, &format!("/trips/{trip_id}/expenses"), payload)
            .await
    }

    pub async fn update_expense(
        &self,
        expense_id: i64,
        payload: &ExpenseUpdate,
    ) -> Result<Expense, ClientError> {
        self.send(Method::PATCH, &format!("/expenses/{expense_id}"), payload)
            .await
    }

    pub async fn delete_expense(&self, expense_id: i64) -> Result<(), ClientError> {
        self.remove(&format!("/expenses/{expense_id}")).await
    }

    pub async fn trip_weather(&self, trip_id: i64) -> Result<TripWeather, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/weather"))
            .await
    }

    pub async fn trip_alerts(&self, trip_id: i64) -> Result<Vec<AlertDetail>, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/alerts"))
            .await
    }

    pub async fn schedule_alerts(&self, trip_id: i64) -> Result<Vec<ScheduleImpact>, ClientError> {
        self.fetch(Method::GET, &format!("/trips/{trip_id}/schedule/alerts"))
            .await
    }
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn token_is_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 1, "email": "a@b.c", "username": "ana"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap().with_token("tok-1");
        let me = client.me().await.unwrap();
        assert_eq!(me.username, "ana");
    }

    #[tokio::test]
    async fn login_posts_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "identifier": "ana", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "t", "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let token = client.login("ana", "pw").await.unwrap();
        assert_eq!(token.access_token, "t");
    }

    #[tokio::test]
    async fn unauthorized_and_detail_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trips"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "detail": "Could not validate credentials"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/trips/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "detail": "Trip not found"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        assert!(client.list_trips().await.unwrap_err().is_unauthorized());
        match client.get_trip(9).await.unwrap_err() {
            ClientError::Status { status, detail } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert_eq!(detail, "Trip not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn base_path_is_preserved() {
        let client = ApiClient::new("http://localhost:8000/api").unwrap();
        let request = client
            .request(Method::GET, "/trips")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8000/api/trips");
    }
}
