//! Transport contract
//!
//! The job controller never talks HTTP directly. It drives a [`Transport`],
//! which maps a (module, operation) pair to one network call. Tests swap in
//! scripted doubles.

use async_trait::async_trait;
use librarian_core::domain::module::ModuleId;
use librarian_core::dto::run::{RunPayload, RunResponse};
use librarian_core::dto::status::{CancelAck, OutputResponse, StatusResponse};

use crate::LibrarianClient;
use crate::error::Result;

/// Network boundary for module jobs
///
/// Every failure is reported as a [`ClientError`](crate::ClientError).
/// A module lacking an endpoint yields `ClientError::Unsupported` without
/// performing any request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Asks whether the module's job is running
    async fn check_status(&self, module: ModuleId) -> Result<StatusResponse>;

    /// Fetches output produced since the previous call
    async fn get_output(&self, module: ModuleId) -> Result<OutputResponse>;

    /// Starts the module's job
    async fn run_script(&self, module: ModuleId, payload: &RunPayload) -> Result<RunResponse>;

    /// Requests cancellation of the module's job
    async fn cancel_script(&self, module: ModuleId) -> Result<CancelAck>;
}

#[async_trait]
impl Transport for LibrarianClient {
    async fn check_status(&self, module: ModuleId) -> Result<StatusResponse> {
        LibrarianClient::check_status(self, module).await
    }

    async fn get_output(&self, module: ModuleId) -> Result<OutputResponse> {
        LibrarianClient::get_output(self, module).await
    }

    async fn run_script(&self, module: ModuleId, payload: &RunPayload) -> Result<RunResponse> {
        LibrarianClient::run_script(self, module, payload).await
    }

    async fn cancel_script(&self, module: ModuleId) -> Result<CancelAck> {
        LibrarianClient::cancel_script(self, module).await
    }
}
