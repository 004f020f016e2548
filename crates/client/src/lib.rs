//! HTTP and streaming client for the convolution backend.
//!
//! Provides the REST wrapper for `/health` and `/convolve`, incremental
//! decoding of the `/convolve-stream` Server-Sent-Events body, and a
//! cancellable consumer that publishes progress as observable state.

pub mod api;
pub mod consumer;
pub mod messages;
pub mod sse;
pub mod state;
