//! Convolution filter selection and mask-size validation.
//!
//! The backend accepts four filters. Laplacian and Prewitt use fixed 3x3
//! kernels, so the backend may report a different `mask_size_used` than
//! the one requested.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/* --------------------------------------------------------------------------
Named constants
-------------------------------------------------------------------------- */

/// Filter name: Prewitt edge detection.
pub const FILTER_PREWITT: &str = "prewitt";

/// Filter name: Laplacian edge detection.
pub const FILTER_LAPLACIAN: &str = "laplacian";

/// Filter name: Gaussian blur.
pub const FILTER_GAUSSIAN: &str = "gaussian";

/// Filter name: box (mean) blur.
pub const FILTER_BOX_BLUR: &str = "box_blur";

/// All filter names the backend recognizes.
pub const ALL_FILTER_NAMES: &[&str] = &[
    FILTER_PREWITT,
    FILTER_LAPLACIAN,
    FILTER_GAUSSIAN,
    FILTER_BOX_BLUR,
];

/// Edge-enhancement gain the backend applies when none is sent.
pub const DEFAULT_GAIN: f64 = 8.0;

/// Mask size preselected for new jobs.
pub const DEFAULT_MASK_SIZE: u32 = 9;

/* --------------------------------------------------------------------------
Filter kind
-------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Prewitt,
    Laplacian,
    #[default]
    Gaussian,
    BoxBlur,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prewitt => FILTER_PREWITT,
            Self::Laplacian => FILTER_LAPLACIAN,
            Self::Gaussian => FILTER_GAUSSIAN,
            Self::BoxBlur => FILTER_BOX_BLUR,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            FILTER_PREWITT => Ok(Self::Prewitt),
            FILTER_LAPLACIAN => Ok(Self::Laplacian),
            FILTER_GAUSSIAN => Ok(Self::Gaussian),
            FILTER_BOX_BLUR => Ok(Self::BoxBlur),
            _ => Err(CoreError::Validation(format!(
                "Unknown filter type: '{}'. Valid filters: {}",
                s,
                ALL_FILTER_NAMES.join(", ")
            ))),
        }
    }
}

/* --------------------------------------------------------------------------
Filter spec (wire shape of the `filter` object)
-------------------------------------------------------------------------- */

/// The `filter` object of a job request.
///
/// `gain` is only sent to the streaming endpoint; it is omitted from the
/// JSON entirely when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub mask_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
}

impl FilterSpec {
    pub fn new(kind: FilterKind, mask_size: u32) -> Self {
        Self {
            kind,
            mask_size,
            gain: None,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = Some(gain);
        self
    }
}

/* --------------------------------------------------------------------------
Validation functions
-------------------------------------------------------------------------- */

/// Validate that a mask size is a positive odd integer.
pub fn validate_mask_size(mask_size: i64) -> Result<(), CoreError> {
    if mask_size <= 0 || mask_size % 2 == 0 {
        return Err(CoreError::Validation(format!(
            "Mask size must be a positive odd integer (got {mask_size})"
        )));
    }
    if mask_size > i64::from(u32::MAX) {
        return Err(CoreError::Validation(format!(
            "Mask size {mask_size} is out of range"
        )));
    }
    Ok(())
}

/// Parse user input into a validated mask size.
///
/// Anything that is not an integer literal (`3.5`, `abc`, an empty
/// string) is rejected before the odd/positive check.
pub fn parse_mask_size(input: &str) -> Result<u32, CoreError> {
    let trimmed = input.trim();
    let value: i64 = trimmed.parse().map_err(|_| {
        CoreError::Validation(format!(
            "Mask size must be a positive odd integer (got '{trimmed}')"
        ))
    })?;
    validate_mask_size(value)?;
    u32::try_from(value)
        .map_err(|_| CoreError::Validation(format!("Mask size {value} is out of range")))
}
