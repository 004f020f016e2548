//! Observable state of the streaming consumer.
//!
//! A single [`StreamState`] value is published through a
//! `tokio::sync::watch` channel. Every accepted frame supersedes the
//! previous one; nothing older than the latest frame is retained.

use convlab_core::image_ref::normalize_image_ref;

use crate::messages::StreamUpdate;

/// Lifecycle of the current (or most recent) stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamStatus {
    /// No stream has been started yet.
    #[default]
    Idle,
    /// A stream is open and frames are being applied.
    Streaming,
    /// A frame with `completed: true` was received.
    Completed,
    /// The backend reported an error or the transfer failed.
    Failed(String),
    /// The stream was stopped or superseded.
    Cancelled,
    /// The body ended without a `completed` or `error` frame.
    Ended,
}

impl StreamStatus {
    /// Whether the status can no longer change for the current stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Streaming)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    pub status: StreamStatus,
    /// Completion percentage (0-100) from the latest frame.
    pub progress: f64,
    /// Latest preview as a displayable `data:` URL.
    pub preview_image: Option<String>,
    pub rows_processed: u32,
    pub total_rows: u32,
    pub chunk: u32,
    pub total_chunks: u32,
    pub elapsed_ms: f64,
    /// Filter the backend actually used; may differ from the request.
    pub filter_used: String,
    pub mask_size_used: Option<u32>,
    /// Number of frames applied in the current stream.
    pub updates: u64,
}

impl StreamState {
    /// Fresh state for a stream that is about to start.
    pub fn streaming() -> Self {
        Self {
            status: StreamStatus::Streaming,
            ..Self::default()
        }
    }

    /// Apply one accepted frame.
    ///
    /// All counters are replaced by the frame's values. A `completed`
    /// frame moves the status to [`StreamStatus::Completed`], which later
    /// frames of the same stream leave in place.
    pub fn apply(&mut self, update: &StreamUpdate) {
        self.progress = update.progress;
        self.rows_processed = update.rows_processed;
        self.total_rows = update.total_rows;
        self.chunk = update.chunk;
        self.total_chunks = update.total_chunks;
        self.elapsed_ms = update.elapsed_ms;
        self.filter_used.clone_from(&update.filter_used);
        if update.mask_size_used.is_some() {
            self.mask_size_used = update.mask_size_used;
        }
        if !update.preview_image.is_empty() {
            self.preview_image = Some(normalize_image_ref(&update.preview_image).into_owned());
        }
        if update.is_completed() {
            self.status = StreamStatus::Completed;
        }
        self.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(progress: f64, preview: &str) -> StreamUpdate {
        StreamUpdate {
            progress,
            chunk: 1,
            total_chunks: 4,
            rows_processed: 120,
            total_rows: 480,
            elapsed_ms: 3.5,
            preview_image: preview.to_string(),
            filter_used: "laplacian".to_string(),
            mask_size_used: Some(3),
            ..StreamUpdate::default()
        }
    }

    #[test]
    fn apply_replaces_counters_and_normalizes_preview() {
        let mut state = StreamState::streaming();
        state.apply(&update(25.0, "AAA"));

        assert_eq!(state.status, StreamStatus::Streaming);
        assert_eq!(state.progress, 25.0);
        assert_eq!(state.rows_processed, 120);
        assert_eq!(state.total_rows, 480);
        assert_eq!(state.chunk, 1);
        assert_eq!(state.total_chunks, 4);
        assert_eq!(state.filter_used, "laplacian");
        assert_eq!(state.mask_size_used, Some(3));
        assert_eq!(state.preview_image.as_deref(), Some("data:image/png;base64,AAA"));
        assert_eq!(state.updates, 1);
    }

    #[test]
    fn prefixed_preview_is_kept_verbatim() {
        let mut state = StreamState::streaming();
        state.apply(&update(10.0, "data:image/jpeg;base64,BBB"));
        assert_eq!(state.preview_image.as_deref(), Some("data:image/jpeg;base64,BBB"));
    }

    #[test]
    fn frame_without_preview_keeps_previous_one() {
        let mut state = StreamState::streaming();
        state.apply(&update(10.0, "AAA"));
        state.apply(&update(20.0, ""));
        assert_eq!(state.preview_image.as_deref(), Some("data:image/png;base64,AAA"));
        assert_eq!(state.progress, 20.0);
    }

    #[test]
    fn progress_is_taken_as_reported_even_when_it_goes_backwards() {
        let mut state = StreamState::streaming();
        state.apply(&update(60.0, "AAA"));
        state.apply(&update(40.0, "AAA"));
        assert_eq!(state.progress, 40.0);
    }

    #[test]
    fn completed_status_sticks() {
        let mut state = StreamState::streaming();
        state.apply(&StreamUpdate {
            completed: Some(true),
            ..update(100.0, "AAA")
        });
        state.apply(&update(100.0, "AAA"));
        assert_eq!(state.status, StreamStatus::Completed);
        assert!(state.status.is_terminal());
    }
}
