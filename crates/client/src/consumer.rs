//! Streaming progress consumer.
//!
//! [`consume`] is the transport-independent read loop: it pulls byte
//! chunks, feeds them through a [`FrameBuffer`], decodes frames and hands
//! accepted updates to a callback. [`StreamConsumer`] drives it against
//! the backend's `/convolve-stream` endpoint and publishes the resulting
//! [`StreamState`] through a `watch` channel.
//!
//! At most one stream is active per consumer. Starting a new stream
//! cancels the previous one first, and publication is checked against
//! the stream's cancellation token under the channel lock, so a stopped
//! or superseded stream can never publish again.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use convlab_core::job::JobRequest;
use futures::{Stream, StreamExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiError, ConvolveApi};
use crate::messages::StreamUpdate;
use crate::sse::{parse_frame, FrameBuffer};
use crate::state::{StreamState, StreamStatus};

/// Status message published when the stream cannot be opened or breaks.
pub const CONNECTIVITY_FAILURE: &str = "Could not connect to the processing backend";

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `completed` frame was seen and the body ended.
    Completed,
    /// A frame carried a non-empty `error`.
    Failed(String),
    /// The stream was stopped or superseded.
    Cancelled,
    /// The body ended without a `completed` or `error` frame.
    Ended,
}

/// Errors that abort a stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream could not be opened.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The transfer broke while the body was being read.
    #[error("Stream transport failed: {0}")]
    Transport(String),

    /// The task driving the stream panicked.
    #[error("Stream task failed: {0}")]
    Task(String),
}

/// Read a progress stream to its end.
///
/// Chunks are awaited one at a time; cancellation is checked before each
/// read and before each frame, and discards anything still buffered. Frames that do not
/// start with `data: ` are ignored and frames that fail to decode are
/// logged and skipped. An `error` frame stops reading immediately,
/// dropping whatever else is buffered. `on_update` receives every other
/// frame in arrival order and may return [`ControlFlow::Break`] to
/// abandon the stream as cancelled.
pub async fn consume<S, E, F>(
    body: S,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<StreamOutcome, StreamError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(&StreamUpdate) -> ControlFlow<()>,
{
    let mut body = std::pin::pin!(body);
    let mut buffer = FrameBuffer::new();
    let mut completed = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                buffer.clear();
                return Ok(StreamOutcome::Cancelled);
            }
            next = body.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
            None => break,
        };

        for frame in buffer.push(&chunk) {
            if cancel.is_cancelled() {
                buffer.clear();
                return Ok(StreamOutcome::Cancelled);
            }

            let update = match parse_frame(&frame) {
                Some(Ok(update)) => update,
                Some(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        raw_frame = %truncate(&String::from_utf8_lossy(&frame), 100),
                        "Failed to parse stream update",
                    );
                    continue;
                }
                None => {
                    tracing::trace!(
                        raw_frame = %truncate(&String::from_utf8_lossy(&frame), 100),
                        "Ignoring non-data frame",
                    );
                    continue;
                }
            };

            if let Some(error) = update.error_message() {
                return Ok(StreamOutcome::Failed(error.to_string()));
            }

            if on_update(&update).is_break() {
                buffer.clear();
                return Ok(StreamOutcome::Cancelled);
            }

            if update.is_completed() {
                completed = true;
            }
        }
    }

    if !buffer.pending().is_empty() {
        tracing::debug!(
            pending_bytes = buffer.pending().len(),
            "Discarding unterminated frame at end of stream",
        );
    }

    if completed {
        Ok(StreamOutcome::Completed)
    } else {
        Ok(StreamOutcome::Ended)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Owns the single active stream and the published state.
pub struct StreamConsumer {
    api: ConvolveApi,
    state_tx: Arc<watch::Sender<StreamState>>,
    /// Stream currently allowed to publish; cleared when it finishes.
    active: Arc<Mutex<Option<ActiveStream>>>,
    /// Master cancellation token -- cancelled on shutdown or drop.
    cancel: CancellationToken,
}

/// Bookkeeping for the stream currently allowed to publish.
struct ActiveStream {
    id: Uuid,
    cancel: CancellationToken,
}

/// Handle to a started stream.
pub struct StreamHandle {
    id: Uuid,
    task: JoinHandle<Result<StreamOutcome, StreamError>>,
}

impl StreamHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the stream to finish.
    pub async fn wait(self) -> Result<StreamOutcome, StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StreamError::Task(e.to_string())),
        }
    }
}

impl StreamConsumer {
    pub fn new(api: ConvolveApi) -> Self {
        let (state_tx, _) = watch::channel(StreamState::default());
        Self {
            api,
            state_tx: Arc::new(state_tx),
            active: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StreamState {
        self.state_tx.borrow().clone()
    }

    /// Start streaming `job`, cancelling any stream already running.
    ///
    /// After [`shutdown`](Self::shutdown) nothing is started: the handle
    /// resolves to [`StreamOutcome::Cancelled`] and the published state is
    /// left alone.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&self, job: JobRequest) -> StreamHandle {
        let id = Uuid::now_v7();
        let token = self.cancel.child_token();

        let mut active = self.active.lock().await;
        if self.cancel.is_cancelled() {
            drop(active);
            tracing::warn!(stream_id = %id, "Consumer is shut down, stream not started");
            let task = tokio::spawn(async { Ok(StreamOutcome::Cancelled) });
            return StreamHandle { id, task };
        }

        let previous = active.replace(ActiveStream {
            id,
            cancel: token.clone(),
        });

        self.state_tx.send_modify(|state| {
            if let Some(previous) = &previous {
                previous.cancel.cancel();
            }
            *state = StreamState::streaming();
        });
        drop(active);

        if let Some(previous) = previous {
            tracing::info!(stream_id = %previous.id, superseded_by = %id, "Stream superseded");
        }

        let api = self.api.clone();
        let state_tx = Arc::clone(&self.state_tx);
        let active = Arc::clone(&self.active);
        let task = tokio::spawn(async move {
            let result = run_stream(api, job, id, token, state_tx).await;
            release(&active, id).await;
            result
        });

        StreamHandle { id, task }
    }

    /// Stop the active stream.
    ///
    /// Once this returns, the stopped stream publishes nothing more; the
    /// last applied update stays as it was. Returns `false` when no
    /// stream was running, including one that already finished.
    pub async fn stop(&self) -> bool {
        match self.active.lock().await.take() {
            Some(active) => self.cancel_stream(&active),
            None => false,
        }
    }

    /// Cancel every stream started by this consumer and refuse new ones.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        self.cancel.cancel();
        if let Some(stream) = active.take() {
            self.cancel_stream(&stream);
        }
    }

    /// Cancel `stream` and mark it cancelled unless it already finished.
    fn cancel_stream(&self, stream: &ActiveStream) -> bool {
        let stopped = self.state_tx.send_if_modified(|state| {
            stream.cancel.cancel();
            if state.status.is_terminal() {
                return false;
            }
            state.status = StreamStatus::Cancelled;
            true
        });

        if stopped {
            tracing::info!(stream_id = %stream.id, "Stream stopped");
        }
        stopped
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forget stream `id` if it is still the active one.
async fn release(active: &Mutex<Option<ActiveStream>>, id: Uuid) {
    let mut slot = active.lock().await;
    if slot.as_ref().is_some_and(|stream| stream.id == id) {
        *slot = None;
    }
}

/// Open the stream, read it to the end and publish terminal status.
async fn run_stream(
    api: ConvolveApi,
    job: JobRequest,
    id: Uuid,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<StreamState>>,
) -> Result<StreamOutcome, StreamError> {
    tracing::info!(
        stream_id = %id,
        filter = %job.filter().kind,
        mask_size = job.filter().mask_size,
        "Opening progress stream",
    );

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(stream_id = %id, "Stream cancelled before it opened");
            return Ok(StreamOutcome::Cancelled);
        }
        opened = api.open_stream(&job) => opened,
    };

    let response = match opened {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(stream_id = %id, error = %e, "Failed to open progress stream");
            finish(&state_tx, &cancel, StreamStatus::Failed(CONNECTIVITY_FAILURE.to_string()));
            return Err(e.into());
        }
    };

    let result = consume(response.bytes_stream(), &cancel, |update| {
        publish(&state_tx, &cancel, id, update)
    })
    .await;

    match &result {
        Ok(StreamOutcome::Completed) => {
            tracing::info!(stream_id = %id, "Stream completed");
        }
        Ok(StreamOutcome::Failed(error)) => {
            tracing::error!(stream_id = %id, error = %error, "Backend reported a stream error");
            finish(&state_tx, &cancel, StreamStatus::Failed(error.clone()));
        }
        Ok(StreamOutcome::Cancelled) => {
            tracing::info!(stream_id = %id, "Stream cancelled");
        }
        Ok(StreamOutcome::Ended) => {
            tracing::warn!(stream_id = %id, "Stream ended without a completion frame");
            finish(&state_tx, &cancel, StreamStatus::Ended);
        }
        Err(e) => {
            tracing::error!(stream_id = %id, error = %e, "Stream transfer failed");
            finish(&state_tx, &cancel, StreamStatus::Failed(CONNECTIVITY_FAILURE.to_string()));
        }
    }

    result
}

/// Apply an update unless the stream has been cancelled.
///
/// The token is checked under the channel's write lock, the same lock
/// [`StreamConsumer::stop`] cancels under.
fn publish(
    state_tx: &watch::Sender<StreamState>,
    cancel: &CancellationToken,
    id: Uuid,
    update: &StreamUpdate,
) -> ControlFlow<()> {
    let mut accepted = false;
    state_tx.send_if_modified(|state| {
        if cancel.is_cancelled() {
            return false;
        }
        state.apply(update);
        accepted = true;
        true
    });

    if !accepted {
        return ControlFlow::Break(());
    }

    tracing::debug!(
        stream_id = %id,
        progress = update.progress,
        chunk = update.chunk,
        total_chunks = update.total_chunks,
        rows_processed = update.rows_processed,
        total_rows = update.total_rows,
        has_preview = !update.preview_image.is_empty(),
        "Stream update",
    );
    ControlFlow::Continue(())
}

/// Publish a terminal status unless the stream has been cancelled.
fn finish(state_tx: &watch::Sender<StreamState>, cancel: &CancellationToken, status: StreamStatus) {
    state_tx.send_if_modified(|state| {
        if cancel.is_cancelled() {
            return false;
        }
        state.status = status;
        true
    });
}
