//! Domain types for the convolution lab client.
//!
//! Everything here is pure: filter selection, job payload construction
//! and validation, image reference handling, the run history store and
//! the derived performance report. Network access lives in
//! `convlab-client`.

pub mod error;
pub mod filter;
pub mod history;
pub mod image_ref;
pub mod job;
pub mod metrics;
pub mod types;
