use crate::crypto::PiiCipher;
use crate::middleware::RateLimiter;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cipher: Arc<PiiCipher>,
    pub session_key: Vec<u8>,
    pub session_ttl: chrono::Duration,
    pub secure_cookies: bool,
    /// Believe `x-forwarded-for` / `x-real-ip` (set when behind a reverse proxy).
    pub trust_proxy: bool,
    pub submit_limiter: RateLimiter, // keyed by client IP
}

pub type SharedState = Arc<AppState>;
