//! Job request payload sent to the convolution backend.
//!
//! A [`JobRequest`] is built once per submission and never mutated
//! afterwards. Construction validates the mask size and execution
//! dimensions, so an invalid job can never reach the network layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::filter::{validate_mask_size, FilterSpec, DEFAULT_GAIN};
use crate::image_ref::encode_image;

/// Default edge length for both block and grid dimensions.
pub const DEFAULT_DIM: u32 = 16;

/// A two-component launch dimension (`x`, `y`).
///
/// Serialized as a two-element JSON array, matching the backend's
/// `block_dim` / `grid_dim` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Dim2 {
    pub x: u32,
    pub y: u32,
}

impl Dim2 {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Product of both components.
    pub fn area(self) -> u64 {
        u64::from(self.x) * u64::from(self.y)
    }

    fn validate(self, field: &str) -> Result<(), CoreError> {
        if self.x == 0 || self.y == 0 {
            return Err(CoreError::Validation(format!(
                "{field} values must be > 0 (got {self})"
            )));
        }
        Ok(())
    }
}

impl Default for Dim2 {
    fn default() -> Self {
        Self::new(DEFAULT_DIM, DEFAULT_DIM)
    }
}

impl From<[u32; 2]> for Dim2 {
    fn from([x, y]: [u32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Dim2> for [u32; 2] {
    fn from(dim: Dim2) -> Self {
        [dim.x, dim.y]
    }
}

impl fmt::Display for Dim2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

impl FromStr for Dim2 {
    type Err = CoreError;

    /// Accepts `16x16`, `16X16` or `16,16`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || CoreError::Validation(format!("Expected dimensions like '16x16' (got '{s}')"));

        let (x, y) = s
            .trim()
            .split_once(|c: char| matches!(c, 'x' | 'X' | ','))
            .ok_or_else(invalid)?;
        let x: u32 = x.trim().parse().map_err(|_| invalid())?;
        let y: u32 = y.trim().parse().map_err(|_| invalid())?;
        Ok(Self { x, y })
    }
}

/// Thread-block and grid layout requested for the kernel launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub block_dim: Dim2,
    pub grid_dim: Dim2,
}

impl ExecutionConfig {
    pub fn new(block_dim: Dim2, grid_dim: Dim2) -> Self {
        Self {
            block_dim,
            grid_dim,
        }
    }

    pub fn threads_per_block(&self) -> u64 {
        self.block_dim.area()
    }

    pub fn total_blocks(&self) -> u64 {
        self.grid_dim.area()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.block_dim.validate("block_dim")?;
        self.grid_dim.validate("grid_dim")
    }
}

/// The JSON payload for `/convolve` and `/convolve-stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest {
    image_base64: String,
    filter: FilterSpec,
    cuda_config: ExecutionConfig,
}

impl JobRequest {
    /// Validate the job parameters and encode the image.
    ///
    /// Validation happens first; nothing is encoded for a rejected job.
    pub fn new(
        image: &[u8],
        filter: FilterSpec,
        config: ExecutionConfig,
    ) -> Result<Self, CoreError> {
        validate_mask_size(i64::from(filter.mask_size))?;
        config.validate()?;
        if image.is_empty() {
            return Err(CoreError::Validation("Image is empty".to_string()));
        }

        Ok(Self {
            image_base64: encode_image(image),
            filter,
            cuda_config: config,
        })
    }

    pub fn image_base64(&self) -> &str {
        &self.image_base64
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.cuda_config
    }

    /// Copy of this job whose filter always carries a gain, as the
    /// streaming endpoint expects.
    pub fn for_stream(&self) -> Self {
        let mut job = self.clone();
        if job.filter.gain.is_none() {
            job.filter.gain = Some(DEFAULT_GAIN);
        }
        job
    }
}
