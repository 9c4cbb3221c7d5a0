//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission, queue inspection,
//! history retrieval, artifact download, cancellation, interruption)
//! using [`reqwest`] with a pooled connection.

use comfykit_protocol::history::{ArtifactRef, HistoryEntry, HistoryResponse};
use comfykit_protocol::queue::QueueSnapshot;
use comfykit_protocol::ticket::SubmissionTicket;
use comfykit_protocol::PromptId;

/// HTTP client for a single ComfyUI server.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The queried prompt ID is absent from the history response.
    #[error("prompt {0} not present in history")]
    PromptNotFound(PromptId),
}

impl HttpApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across multiple sessions).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Base HTTP URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow JSON, client ID, and the
    /// caller-chosen prompt ID. A validation rejection comes back as an
    /// `Ok` ticket whose [`SubmissionTicket::rejection`] is `Some`; the
    /// server reports those with a 400 status but a parseable body.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
        prompt_id: &str,
    ) -> Result<SubmissionTicket, ApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
            "prompt_id": prompt_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            // Validation rejections carry their detail in the body.
            if let Ok(ticket) = serde_json::from_str::<SubmissionTicket>(&body) {
                if ticket.rejection().is_some() {
                    return Ok(ticket);
                }
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<SubmissionTicket>().await?)
    }

    /// Fetch the current queue snapshot via `GET /queue`.
    pub async fn get_queue(&self) -> Result<QueueSnapshot, ApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.base_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the durable history record for one prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. The server answers with a map
    /// keyed by prompt ID; an empty map means the prompt is unknown,
    /// which surfaces as [`ApiError::PromptNotFound`].
    pub async fn get_history(&self, prompt_id: &str) -> Result<HistoryEntry, ApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .send()
            .await?;

        let mut history: HistoryResponse = Self::parse_response(response).await?;
        history
            .remove(prompt_id)
            .ok_or_else(|| ApiError::PromptNotFound(prompt_id.to_string()))
    }

    /// Download one stored artifact via `GET /view`.
    pub async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.base_url))
            .query(&[
                ("filename", artifact.filename.as_str()),
                ("subfolder", artifact.subfolder.as_str()),
                ("type", artifact.folder_type.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Remove a queued prompt via `POST /queue` with a delete list.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.base_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt the currently running execution via `POST /interrupt`.
    ///
    /// This does not target a specific prompt -- it interrupts whatever
    /// is executing right now.
    pub async fn interrupt(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.base_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Probe the server with a queue request.
    pub async fn test_connection(&self) -> bool {
        self.get_queue().await.is_ok()
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Status`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
