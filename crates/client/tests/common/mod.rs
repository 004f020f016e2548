//! In-process mock of the convolution backend.
//!
//! `/convolve-stream` bodies are fed from channels the test holds, so a
//! test decides exactly when each chunk reaches the client.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use convlab_core::filter::{FilterKind, FilterSpec};
use convlab_core::job::{ExecutionConfig, JobRequest};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

pub type Chunk = Result<Bytes, std::io::Error>;

#[derive(Clone, Default)]
pub struct MockState {
    /// Bodies handed out to stream requests, oldest first.
    pub stream_bodies: Arc<Mutex<VecDeque<mpsc::Receiver<Chunk>>>>,
    /// JSON payloads received on any POST route.
    pub requests: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MockState {
    /// Queue a body for the next stream request and return its sender.
    pub async fn queue_stream(&self) -> mpsc::Sender<Chunk> {
        let (tx, rx) = mpsc::channel(32);
        self.stream_bodies.lock().await.push_back(rx);
        tx
    }
}

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("mock backend address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock backend");
    });
    format!("http://{addr}")
}

/// Backend whose `/convolve-stream` replays queued channel bodies.
pub async fn streaming_backend() -> (String, MockState) {
    let state = MockState::default();
    let router = Router::new()
        .route("/convolve-stream", post(stream_handler))
        .with_state(state.clone());
    (serve(router).await, state)
}

async fn stream_handler(
    State(state): State<MockState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    state.requests.lock().await.push(payload);

    let Some(rx) = state.stream_bodies.lock().await.pop_front() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no stream queued").into_response();
    };

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// Send one chunk of body text.
pub async fn send(tx: &mpsc::Sender<Chunk>, text: &str) {
    tx.send(Ok(Bytes::copy_from_slice(text.as_bytes())))
        .await
        .expect("stream body receiver dropped");
}

pub fn test_job() -> JobRequest {
    JobRequest::new(
        b"\x89PNG fake image",
        FilterSpec::new(FilterKind::Gaussian, 9),
        ExecutionConfig::default(),
    )
    .expect("valid test job")
}
