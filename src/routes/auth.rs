use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    models::user::{TokenResponse, UserCreate, UserLogin, UserRead},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserRead>), AppError> {
    let user =
        auth::register_user(&state.db, &payload.email, &payload.username, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<UserLogin>,
) -> Result<Json<TokenResponse>, AppError> {
    let identifier = payload.login_name().ok_or_else(|| {
        AppError::BadRequest("Email or username is required".into())
    })?;
    let user = auth::authenticate_user(&state.db, identifier, &payload.password).await?;
    let token = auth::create_session(&state, user.id).await?;
    Ok(Json(TokenResponse::bearer(token)))
}

async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<StatusCode, AppError> {
    current.require_user()?;
    if let Some(TypedHeader(Authorization(bearer))) = bearer {
        auth::destroy_session(&state, bearer.token()).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(current: CurrentUser) -> Result<Json<UserRead>, AppError> {
    let user = current.require_user()?;
    Ok(Json(UserRead {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
    }))
}
