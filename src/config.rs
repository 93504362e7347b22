use std::env;
use std::net::SocketAddr;

use crate::store::DEFAULT_TRANSACTION_ATTEMPTS;

const DEFAULT_DATABASE_URL: &str = "sqlite:data/logsphere.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub secure_cookies: bool,
    pub transaction_attempts: u32,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    var_or(name, default)
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl Config {
    /// Read configuration from the environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let transaction_attempts: u32 =
            parse_var("TRANSACTION_ATTEMPTS", &DEFAULT_TRANSACTION_ATTEMPTS.to_string())?;
        if transaction_attempts == 0 {
            return Err(ConfigError::InvalidValue("TRANSACTION_ATTEMPTS".to_string()));
        }

        Ok(Self {
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_addr: parse_var("BIND_ADDR", DEFAULT_BIND_ADDR)?,
            secure_cookies: parse_var("SECURE_COOKIES", "false")?,
            transaction_attempts,
        })
    }
}
