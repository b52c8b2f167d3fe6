use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::{env, fmt::Display, str::FromStr};
use tracing::info;

pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub session_key: Vec<u8>,
    pub enc_key: Vec<u8>,
    pub session_ttl_hours: i64,
    pub submit_rate_limit: usize,
    pub submit_rate_window_secs: u64,
    pub secure_cookies: bool,
    pub trust_proxy: bool,
    /// `ADMIN_EMAIL` + `ADMIN_PASSWORD`; both must be set to seed an admin.
    pub admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL missing")?;

        let session_key = env::var("SESSION_KEY").context("SESSION_KEY missing")?;
        let session_key = decode_key("SESSION_KEY", &session_key)?;

        let enc_key = env::var("APP_ENC_KEY").context("APP_ENC_KEY missing")?;
        let enc_key = decode_key("APP_ENC_KEY", &enc_key)?;
        if enc_key.len() != 32 {
            return Err(anyhow!("APP_ENC_KEY must decode to 32 bytes"));
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| {
            let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections: load("DB_MAX_CONNECTIONS", "10")?,
            session_key,
            enc_key,
            session_ttl_hours: load("SESSION_TTL_HOURS", "24")?,
            submit_rate_limit: load("SUBMIT_RATE_LIMIT", "30")?,
            submit_rate_window_secs: load("SUBMIT_RATE_WINDOW_SECS", "60")?,
            secure_cookies: env::var("PRODUCTION").is_ok(),
            trust_proxy: load("TRUST_PROXY", "false")?,
            admin: env::var("ADMIN_EMAIL").ok().zip(env::var("ADMIN_PASSWORD").ok()),
        })
    }
}

fn load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    parse_or_default(key, env::var(key).ok(), default)
}

fn parse_or_default<T: FromStr>(key: &str, raw: Option<String>, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = raw.unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}

fn decode_key(key: &str, value: &str) -> Result<Vec<u8>> {
    general_purpose::STANDARD
        .decode(value.trim())
        .with_context(|| format!("{key} must be base64"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default() {
        let port: u32 = parse_or_default("DB_MAX_CONNECTIONS", None, "10").unwrap();
        assert_eq!(port, 10);

        let limit: usize = parse_or_default("SUBMIT_RATE_LIMIT", Some(" 5 ".to_string()), "30").unwrap();
        assert_eq!(limit, 5);

        let err = parse_or_default::<u64>("SUBMIT_RATE_WINDOW_SECS", Some("soon".to_string()), "60").unwrap_err();
        assert!(err.to_string().contains("SUBMIT_RATE_WINDOW_SECS"));
    }

    #[test]
    fn test_session_key_has_no_fallback() {
        env::set_var("DATABASE_URL", "postgres://localhost/survey");
        env::set_var("APP_ENC_KEY", general_purpose::STANDARD.encode([7u8; 32]));
        env::remove_var("SESSION_KEY");

        let err = Config::from_env().err().unwrap();
        assert_eq!(err.to_string(), "SESSION_KEY missing");
    }

    #[test]
    fn test_decode_key() {
        assert_eq!(decode_key("SESSION_KEY", "c2VjcmV0").unwrap(), b"secret".to_vec());
        assert!(decode_key("SESSION_KEY", "%%%").is_err());
    }
}
