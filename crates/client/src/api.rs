//! REST client for the convolution backend.
//!
//! Wraps the backend's HTTP API (health check, synchronous convolution,
//! opening a progress stream) using [`reqwest`].

use std::time::Duration;

use convlab_core::job::{Dim2, JobRequest};
use serde::Deserialize;

/// `status` value the backend uses for a successful run.
const STATUS_OK: &str = "ok";

/// HTTP client for a single backend.
#[derive(Debug, Clone)]
pub struct ConvolveApi {
    client: reqwest::Client,
    api_url: String,
    request_timeout: Option<Duration>,
}

/// Response body of `POST /convolve`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvolveResponse {
    pub status: String,
    #[serde(default)]
    pub result_image_base64: String,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub kernel_time_ms: f64,
    #[serde(default)]
    pub mask_size_used: u32,
    #[serde(default)]
    pub block_dim: Dim2,
    #[serde(default)]
    pub grid_dim: Dim2,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub filter_used: Option<String>,
    /// Explanation accompanying a non-"ok" status.
    pub message: Option<String>,
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend error ({status}): {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `detail`/`message` from the body, or the raw body.
        detail: String,
    },

    /// The backend answered 2xx but reported a failed run.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ConvolveApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            request_timeout: None,
        }
    }

    /// Total timeout for synchronous calls. Never applied to streams,
    /// which may legitimately run for a long time.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Check that the backend is up.
    ///
    /// Sends `GET /health` and expects `{"status": "ok"}`.
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        let response = self
            .timed(self.client.get(format!("{}/health", self.api_url)))
            .send()
            .await?;

        let health: HealthResponse = Self::parse_response(response).await?;
        if health.status != STATUS_OK {
            return Err(ApiError::Backend(format!(
                "health status is '{}'",
                health.status
            )));
        }
        Ok(health)
    }

    /// Run a convolution and wait for the full result.
    ///
    /// Sends `POST /convolve`. A 2xx response whose `status` is not
    /// `"ok"` is reported as [`ApiError::Backend`].
    pub async fn convolve(&self, job: &JobRequest) -> Result<ConvolveResponse, ApiError> {
        let response = self
            .timed(self.client.post(format!("{}/convolve", self.api_url)))
            .json(job)
            .send()
            .await?;

        let result: ConvolveResponse = Self::parse_response(response).await?;
        if result.status != STATUS_OK {
            return Err(ApiError::Backend(
                result
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        Ok(result)
    }

    /// Open a progress stream for `job`.
    ///
    /// Sends `POST /convolve-stream` with the gain-carrying payload and
    /// returns the response once headers arrive; the body is left unread.
    pub async fn open_stream(&self, job: &JobRequest) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .post(format!("{}/convolve-stream", self.api_url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&job.for_stream())
            .send()
            .await?;

        Self::ensure_success(response).await
    }

    // ---- private helpers ----

    fn timed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Status`] carrying
    /// the most useful explanation found in the body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let detail = error_detail(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or(body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
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
}

/// Pull `detail` (string or structured) or `message` out of an error body.
fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        Some(serde_json::Value::String(detail)) => Some(detail),
        Some(serde_json::Value::Null) | None => parsed.message,
        Some(other) => Some(other.to_string()),
    }
}
