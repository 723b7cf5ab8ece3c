//! Librarian HTTP Client
//!
//! A small, type-safe client for the backend's per-module job endpoints
//! (run, status, output, cancel).
//!
//! # Example
//!
//! ```no_run
//! use librarian_client::LibrarianClient;
//! use librarian_core::domain::module::ModuleId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), librarian_client::ClientError> {
//!     let client = LibrarianClient::new("http://localhost:8000");
//!
//!     let status = client.check_status(ModuleId::DuplicateScan).await?;
//!     println!("duplicate scan running: {}", status.running);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
pub mod transport;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use transport::Transport;

use librarian_core::domain::module::{ModuleId, Operation};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the backend job endpoints
#[derive(Debug, Clone)]
pub struct LibrarianClient {
    /// Base URL of the backend (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl LibrarianClient {
    /// Create a new client with reqwest's default settings
    ///
    /// # Example
    /// ```
    /// use librarian_client::LibrarianClient;
    ///
    /// let client = LibrarianClient::new("http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create a new client whose requests fail after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve the absolute URL of a module operation
    ///
    /// Returns `ClientError::Unsupported` when the module has no endpoint
    /// for the operation.
    fn endpoint_url(&self, module: ModuleId, operation: Operation) -> Result<String> {
        let path = module
            .endpoints()
            .path(operation)
            .ok_or(ClientError::Unsupported { module, operation })?;
        Ok(format!("{}{}", self.base_url, path))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
