//! Configuration module for the Cadence backend.

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// JWT secret for token signing
    pub jwt_secret: String,
    /// Address to bind the server to
    pub bind_address: String,
    /// Base URL of the priority oracle chat endpoint. Empty disables the oracle
    /// and forces the deterministic fallback.
    pub oracle_base_url: String,
    /// API key for the priority oracle
    pub oracle_api_key: String,
    /// Model identifier sent to the priority oracle
    pub oracle_model: String,
    /// Per-request oracle deadline in seconds
    pub oracle_timeout_seconds: u64,
    /// VAPID private key for web push. Empty disables push delivery.
    pub vapid_private_key: String,
    /// Contact address embedded in VAPID claims
    pub vapid_subject: String,
    /// Checkout escalator tick interval in seconds
    pub escalator_interval_seconds: u64,
    /// Reschedule suggestion expiry sweep interval in seconds
    pub expiry_sweep_interval_seconds: u64,
    /// Weekly selector solve deadline in seconds
    pub weekly_solver_timeout_seconds: u64,
    /// Daily packer solve deadline in seconds
    pub daily_solver_timeout_seconds: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            jwt_secret: env_var("JWT_SECRET")?,
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            oracle_base_url: env_var_or("ORACLE_BASE_URL", ""),
            oracle_api_key: env_var_or("ORACLE_API_KEY", ""),
            oracle_model: env_var_or("ORACLE_MODEL", "gpt-4o-mini"),
            oracle_timeout_seconds: env_var_parsed("ORACLE_TIMEOUT_SECONDS", 20)?,
            vapid_private_key: env_var_or("VAPID_PRIVATE_KEY", ""),
            vapid_subject: env_var_or("VAPID_SUBJECT", "mailto:ops@cadence.local"),
            escalator_interval_seconds: env_var_parsed("ESCALATOR_INTERVAL_SECONDS", 60)?,
            expiry_sweep_interval_seconds: env_var_parsed("EXPIRY_SWEEP_INTERVAL_SECONDS", 300)?,
            weekly_solver_timeout_seconds: env_var_parsed("WEEKLY_SOLVER_TIMEOUT_SECONDS", 30)?,
            daily_solver_timeout_seconds: env_var_parsed("DAILY_SOLVER_TIMEOUT_SECONDS", 5)?,
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_var_parsed(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_uses_default() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn test_env_var_parsed_uses_default_when_unset() {
        let val = env_var_parsed("NON_EXISTENT_VAR_67890", 42).unwrap();
        assert_eq!(val, 42);
    }
}
