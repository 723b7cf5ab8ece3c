//! Module job endpoints

use librarian_core::domain::module::{ModuleId, Operation};
use librarian_core::dto::run::{RunPayload, RunResponse};
use librarian_core::dto::status::{CancelAck, OutputResponse, StatusResponse};
use tracing::debug;

use crate::LibrarianClient;
use crate::error::Result;

impl LibrarianClient {
    // =============================================================================
    // Polling
    // =============================================================================

    /// Ask whether a module's job is running
    pub async fn check_status(&self, module: ModuleId) -> Result<StatusResponse> {
        let url = self.endpoint_url(module, Operation::Status)?;
        debug!("Checking {} status at {}", module, url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Fetch output lines produced since the previous call
    ///
    /// The backend clears its buffer on every read; lines are returned in the
    /// order they were produced.
    pub async fn get_output(&self, module: ModuleId) -> Result<OutputResponse> {
        let url = self.endpoint_url(module, Operation::Output)?;
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Lifecycle
    // =============================================================================

    /// Start a module's job
    ///
    /// # Arguments
    /// * `module` - The module whose run endpoint is called
    /// * `payload` - Request body; serialized as a flat JSON object
    pub async fn run_script(&self, module: ModuleId, payload: &RunPayload) -> Result<RunResponse> {
        let url = self.endpoint_url(module, Operation::Run)?;
        debug!("Starting {} job at {}", module, url);
        let response = self.client.post(&url).json(payload).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a module's job
    ///
    /// Modules without a cancel endpoint fail with `ClientError::Unsupported`
    /// and no request is sent.
    pub async fn cancel_script(&self, module: ModuleId) -> Result<CancelAck> {
        let url = self.endpoint_url(module, Operation::Cancel)?;
        debug!("Requesting {} cancellation at {}", module, url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use librarian_core::dto::run::RunStatus;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_check_status_reads_counters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/check_status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"running":true,"files_checked":4,"total_files":9}"#)
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let status = client.check_status(ModuleId::DuplicateScan).await.unwrap();

        assert!(status.running);
        assert_eq!(status.files_checked, Some(4));
        assert_eq!(status.total_files, Some(9));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_output_preserves_line_order() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/get_sorter_output")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"output":["first","second","third"]}"#)
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let output = client.get_output(ModuleId::Sort).await.unwrap();

        assert_eq!(output.output, vec!["first", "second", "third"]);
        assert!(!output.has_progress());
    }

    #[tokio::test]
    async fn test_run_script_posts_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/run_pdf_splitter")
            .match_body(Matcher::Json(serde_json::json!({
                "target_folder": "/library/pdfs",
                "max_size_mb": 8.0,
                "initial_page_count": 25
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"started"}"#)
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let payload = RunPayload::segmentation("/library/pdfs", 8.0, 25);
        let response = client
            .run_script(ModuleId::Segmentation, &payload)
            .await
            .unwrap();

        assert_eq!(response.status, RunStatus::Started);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_becomes_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/check_pdf_status")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let err = client
            .check_status(ModuleId::Segmentation)
            .await
            .unwrap_err();

        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_invalid_json_becomes_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/get_output")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let err = client.get_output(ModuleId::DuplicateScan).await.unwrap_err();

        assert!(matches!(err, ClientError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_cancel_without_endpoint_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let err = client.cancel_script(ModuleId::Sort).await.unwrap_err();

        assert!(err.is_unsupported());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_script_returns_ack() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/cancel_script")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"cancelled"}"#)
            .create_async()
            .await;

        let client = LibrarianClient::new(server.url());
        let ack = client.cancel_script(ModuleId::DuplicateScan).await.unwrap();

        assert_eq!(ack.status, "cancelled");
    }

    #[tokio::test]
    async fn test_connection_failure_is_request_error() {
        // Nothing listens on port 9 locally
        let client = LibrarianClient::new("http://127.0.0.1:9");
        let err = client.check_status(ModuleId::Sort).await.unwrap_err();

        assert!(matches!(err, ClientError::RequestFailed(_)));
        assert!(!err.is_server_error());
    }
}
