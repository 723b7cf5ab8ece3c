//! Configuration module
//!
//! Handles CLI configuration: backend URL, request timeout and the polling
//! settings handed to the job controller.

use librarian_jobs::ControllerConfig;
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the backend serving the job endpoints
    pub server_url: String,

    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,

    /// Polling intervals and backoff bounds
    pub controller: ControllerConfig,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            anyhow::bail!("server_url must start with http:// or https://");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request timeout must be greater than 0");
        }

        self.controller.validate()
    }
}
