use crate::db::{self, DbUser};
use crate::domain::models::UserRole;
use crate::domain::submission::normalize_email;
use crate::error::{ApiError, ApiJson};
use crate::middleware::{client_ip, RateLimiter};
use crate::state::SharedState;
use crate::web::session;
use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

// 5 attempts per minute per client IP
static LOGIN_LIMITER: Lazy<RateLimiter> = Lazy::new(|| RateLimiter::new(5, 60));

const PASSWORD_SPECIALS: &str = "!@#$%^&*";

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for UserView {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state)
}

pub async fn prune_login_attempts() -> usize {
    LOGIN_LIMITER.cleanup().await
}

pub fn check_password_strength(password: &str) -> Result<(), ApiError> {
    let message = if password.chars().count() < 8 {
        "Password must be at least 8 characters long"
    } else if !password.chars().any(|c| c.is_ascii_uppercase()) {
        "Password must contain at least one uppercase letter"
    } else if !password.chars().any(|c| c.is_ascii_lowercase()) {
        "Password must contain at least one lowercase letter"
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        "Password must contain at least one number"
    } else if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        "Password must contain at least one special character (!@#$%^&*)"
    } else {
        return Ok(());
    };
    Err(ApiError::BadRequest(message.to_string()))
}

async fn register(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() || payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("Please provide all required fields".to_string()));
    }
    check_password_strength(&payload.password)?;
    let email = normalize_email(Some(&payload.email), true)?
        .ok_or_else(|| ApiError::BadRequest("Please provide all required fields".to_string()))?;

    let salt = SaltString::generate(OsRng);
    let hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user = db::insert_user(&state.pool, name, &email, &hash)
        .await?
        .ok_or_else(|| ApiError::Conflict("User already exists".to_string()))?;

    tracing::info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(UserView::from(user))))
}

async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(addr, &headers, state.trust_proxy);
    if !LOGIN_LIMITER.check(&ip).await {
        tracing::warn!("Login rate limit exceeded for IP: {}", ip);
        return Err(ApiError::TooManyRequests);
    }

    let email = payload.email.trim().to_lowercase();
    let user = db::find_user_by_email(&state.pool, &email)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.hash).map_err(|_| ApiError::Unauthorized)?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let token = session::sign_session(user.id, user.role, &state.session_key, state.session_ttl)
        .map_err(|e| anyhow!("session signing failed: {e}"))?;
    let cookie = session::session_cookie(&token, state.session_ttl, state.secure_cookies);

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        cookie.parse().map_err(|_| anyhow!("session cookie is not a valid header"))?,
    );

    tracing::info!("User {} logged in", user.id);
    Ok((
        response_headers,
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(password: &str) -> String {
        check_password_strength(password).unwrap_err().to_string()
    }

    #[test]
    fn test_password_strength_rules() {
        assert!(rejection("Ab1!").contains("at least 8 characters"));
        assert!(rejection("abcdefg1!").contains("uppercase"));
        assert!(rejection("ABCDEFG1!").contains("lowercase"));
        assert!(rejection("Abcdefgh!").contains("number"));
        assert!(rejection("Abcdefgh1").contains("special character"));
        assert!(check_password_strength("Abcdefg1!").is_ok());
    }
}
