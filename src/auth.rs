use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{session::Session, user::User},
    state::AppState,
};

const USER_COLUMNS: &str = "id, email, username, password_hash, created_at, last_login_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub username: String,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
        }
    }
}

/// The caller behind the request's bearer token, if it maps to a live
/// session.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Ok(TypedHeader(Authorization(bearer))) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
        else {
            return Ok(Self(None));
        };
        let user = resolve_session(&state.db, bearer.token()).await?;
        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| AppError::Other(anyhow::anyhow!("salt encoding failed: {err}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub fn token_digest(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub async fn find_user(db: &DbPool, user_id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn register_user(
    db: &DbPool,
    email: &str,
    username: &str,
    password: &str,
) -> Result<User, AppError> {
    let email = email.trim();
    let username = username.trim();
    if email.is_empty() || username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Email, username and password are required".into(),
        ));
    }

    let taken: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = ?1 OR username = ?2")
            .bind(email)
            .bind(username)
            .fetch_optional(db)
            .await?;
    if taken.is_some() {
        return Err(AppError::Conflict(
            "Email or username already registered".into(),
        ));
    }

    let password_hash = hash_password(password)?;
    let id = insert_user(db, email, username, &password_hash).await?;

    info!(user_id = id, username, "user registered");
    find_user(db, id)
        .await?
        .ok_or(AppError::NotFound("User not found"))
}

/// A concurrent registration can slip past the lookup above; the unique
/// constraints still reject it here.
async fn insert_user(
    db: &DbPool,
    email: &str,
    username: &str,
    password_hash: &str,
) -> Result<i64, AppError> {
    let inserted = sqlx::query(
        "INSERT INTO users (email, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(db)
    .await;

    match inserted {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(AppError::Conflict(
            "Email or username already registered".into(),
        )),
        Err(err) => Err(err.into()),
    }
}

/// Checks a password against the account whose email or username is
/// `identifier`. Unknown accounts and wrong passwords look the same.
pub async fn authenticate_user(
    db: &DbPool,
    identifier: &str,
    password: &str,
) -> Result<User, AppError> {
    let identifier = identifier.trim();
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 OR username = ?1"
    ))
    .bind(identifier)
    .fetch_optional(db)
    .await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => {
            sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
                .bind(Utc::now())
                .bind(user.id)
                .execute(db)
                .await?;
            Ok(user)
        }
        _ => {
            debug!(identifier, "login rejected");
            Err(AppError::Unauthorized)
        }
    }
}

/// Issues a new bearer token for `user_id`. Only the token's digest is
/// stored.
pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let token = Uuid::new_v4().simple().to_string();
    let now = Utc::now();
    let expires_at = now + Duration::minutes(state.config.access_token_expire_minutes);

    sqlx::query("INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(token_digest(&token))
        .bind(user_id)
        .bind(now)
        .bind(expires_at)
        .execute(&state.db)
        .await?;
    Ok(token)
}

pub async fn destroy_session(state: &AppState, token: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?1")
        .bind(token_digest(token))
        .execute(&state.db)
        .await?;
    Ok(())
}

/// Maps a bearer token to its user. Expired sessions are removed on sight.
pub async fn resolve_session(db: &DbPool, token: &str) -> Result<Option<AuthenticatedUser>, AppError> {
    let digest = token_digest(token);
    let session = sqlx::query_as::<_, Session>(
        "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
    )
    .bind(&digest)
    .fetch_optional(db)
    .await?;

    let Some(session) = session else {
        return Ok(None);
    };
    if session.is_expired(Utc::now()) {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(&digest)
            .execute(db)
            .await?;
        return Ok(None);
    }

    Ok(find_user(db, session.user_id)
        .await?
        .map(AuthenticatedUser::from))
}
