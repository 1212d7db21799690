use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub mod database;
pub mod processing;
pub mod server;

pub use database::DatabaseConfig;
pub use processing::{IdempotencyConfig, ProcessingConfig};
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
    pub idempotency: IdempotencyConfig,
    pub integrations: IntegrationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// Minutes between scheduled sweep runs of the job runner
    pub job_interval_minutes: u64,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// Endpoints of the collaborators the engine calls out to
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub merchant_id: String,
    pub risk_base_url: String,
    pub notification_base_url: String,
    pub request_timeout_secs: u64,
}

/// Read an environment variable, falling back to `default`, and parse it
pub(crate) fn env_or<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| AppError::Configuration(format!("Invalid {}", key)))
}

pub(crate) fn env_required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::Configuration(format!("{} not set", key)))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                job_interval_minutes: env_or("JOB_INTERVAL_MINUTES", "15")?,
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            processing: ProcessingConfig::from_env()?,
            idempotency: IdempotencyConfig::from_env()?,
            integrations: IntegrationConfig {
                gateway_base_url: env_required("GATEWAY_BASE_URL")?,
                gateway_api_key: env_required("GATEWAY_API_KEY")?,
                merchant_id: env_required("MERCHANT_ID")?,
                risk_base_url: env_required("RISK_SERVICE_URL")?,
                notification_base_url: env_required("NOTIFICATION_SERVICE_URL")?,
                request_timeout_secs: env_or("COLLABORATOR_TIMEOUT_SECS", "30")?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.app.job_interval_minutes == 0 {
            return Err(AppError::Configuration(
                "Job interval must be greater than 0".to_string(),
            ));
        }

        if self.integrations.request_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Collaborator timeout must be greater than 0".to_string(),
            ));
        }

        self.processing.validate()?;
        self.idempotency.validate()?;

        Ok(())
    }
}
