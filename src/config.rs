// src/config.rs

use std::env;

use anyhow::{Context, Result};

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub server_port: u16,
    /// Name of the cookie carrying the session JWT.
    pub auth_cookie_name: String,
    /// Length of the access window granted to a new assignment.
    pub assignment_validity_days: i64,
    /// Interval of the in-process expiry sweep. Zero disables it.
    pub sweep_interval_secs: u64,
    pub cors_origins: Vec<String>,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let server_port = parse_or("SERVER_PORT", 3000)?;
        let auth_cookie_name =
            env::var("AUTH_COOKIE_NAME").unwrap_or_else(|_| "token".to_string());
        let assignment_validity_days = parse_or("ASSIGNMENT_VALIDITY_DAYS", 7)?;
        let sweep_interval_secs = parse_or("SWEEP_INTERVAL_SECS", 300)?;
        let cors_origins = split_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );
        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

        if assignment_validity_days <= 0 {
            anyhow::bail!("ASSIGNMENT_VALIDITY_DAYS must be positive");
        }

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            server_port,
            auth_cookie_name,
            assignment_validity_days,
            sweep_interval_secs,
            cors_origins,
            log_dir,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
