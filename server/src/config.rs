use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Signing key for bearer tokens.
    pub auth_secret: String,
    pub token_ttl_secs: i64,
    /// Upper bound for order table numbers; the lower bound is fixed at 1.
    pub table_max: i64,
    /// Maximum size in bytes of an encoded (base64 data URI) image.
    pub max_receipt_bytes: usize,
    /// Exact origin allowed by CORS; unset means any origin.
    pub cors_origin: Option<String>,
    pub admin_password: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "3000"),
            database_url: try_load("DATABASE_URL", "sqlite://comanda.db"),
            auth_secret: load_secret("AUTH_SECRET", "comanda-dev-secret"),
            token_ttl_secs: try_load("TOKEN_TTL_SECS", "28800"),
            table_max: try_load("TABLE_MAX", "50"),
            max_receipt_bytes: try_load("MAX_RECEIPT_BYTES", "2097152"),
            cors_origin: env::var("CORS_ORIGIN").ok(),
            admin_password: load_secret("ADMIN_PASSWORD", "admin"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Secrets come from a mounted secrets file when deployed, from the
/// environment otherwise. The fallback default is for local development
/// only.
fn load_secret(secret_name: &str, default: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    if let Ok(value) = read_to_string(&path) {
        return value.trim().to_string();
    }

    env::var(secret_name).unwrap_or_else(|_| {
        warn!("{secret_name} not provided, using development default");
        default.to_string()
    })
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        auth_secret: "test-secret".to_string(),
        token_ttl_secs: 3600,
        table_max: 50,
        max_receipt_bytes: 2048,
        cors_origin: None,
        admin_password: "admin".to_string(),
    }
}
