//! Progress frames sent by the `/convolve-stream` endpoint.
//!
//! Each `data:` frame carries one JSON object. Regular frames describe
//! how far the backend got and include a preview of the partially
//! filtered image; the last one sets `completed`. A failing backend
//! sends a bare `{"error": ..., "traceback": ...}` object instead, so
//! every field defaults.

use serde::Deserialize;

/// One decoded progress frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamUpdate {
    /// Completion percentage (0-100).
    pub progress: f64,
    pub chunk: u32,
    pub total_chunks: u32,
    pub rows_processed: u32,
    pub total_rows: u32,
    pub elapsed_ms: f64,
    /// Partially processed image, bare base64 or a `data:` URL.
    #[serde(rename = "result_image_base64", alias = "preview_image")]
    pub preview_image: String,
    /// Filter the backend actually applied.
    pub filter_used: String,
    /// Mask size after server-side clamping, when reported.
    pub mask_size_used: Option<u32>,
    pub completed: Option<bool>,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

impl StreamUpdate {
    /// The backend-reported error, if this frame carries a non-empty one.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    pub fn is_completed(&self) -> bool {
        self.completed.unwrap_or(false)
    }
}

/// Parse the JSON body of a single frame.
pub fn parse_update(json: &str) -> Result<StreamUpdate, serde_json::Error> {
    serde_json::from_str(json)
}
