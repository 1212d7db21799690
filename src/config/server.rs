use serde::Deserialize;

use super::env_or;
use crate::core::Result;

/// Server configuration for the job-trigger and health HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            // job triggers are rare; a couple of workers is plenty
            workers: 2,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_or("SERVER_HOST", "0.0.0.0")?,
            port: env_or("SERVER_PORT", "8080")?,
            workers: env_or("SERVER_WORKERS", "2")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
