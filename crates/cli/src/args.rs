//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use convlab_core::error::CoreError;
use convlab_core::filter::{parse_mask_size, FilterKind, FilterSpec, DEFAULT_GAIN, DEFAULT_MASK_SIZE};
use convlab_core::job::{Dim2, ExecutionConfig, JobRequest};

use crate::history::DEFAULT_HISTORY_FILE;

#[derive(Debug, Parser)]
#[command(name = "convlab", version, about = "Client for the GPU convolution backend")]
pub struct Cli {
    /// Backend base URL; overrides `CONVLAB_API_URL`.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the backend is reachable.
    Health,
    /// Run one synchronous convolution and record it in the history.
    Convolve {
        #[command(flatten)]
        job: JobArgs,
        /// Where to write the result image [default: processed_<filter>.png].
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        history: HistoryArgs,
    },
    /// Run a convolution and follow its progress stream.
    Stream {
        #[command(flatten)]
        job: JobArgs,
        /// Edge-enhancement gain sent with the stream request.
        #[arg(long, default_value_t = DEFAULT_GAIN)]
        gain: f64,
        /// Where to write the final preview [default: processed_<filter>.png].
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run one convolution per mask size and report speedup and efficiency.
    Sweep {
        #[command(flatten)]
        input: ImageArgs,
        /// Mask sizes to run, comma separated.
        #[arg(long, value_delimiter = ',', value_parser = parse_mask_size, default_value = "3,5,7,9")]
        mask_sizes: Vec<u32>,
        /// Report path [default: convlab-results-<timestamp>.json].
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show speedup and efficiency for the recorded runs.
    Report {
        #[command(flatten)]
        history: HistoryArgs,
        /// Also write the report as JSON.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Clear the recorded runs.
    Reset {
        #[command(flatten)]
        history: HistoryArgs,
    },
}

/// Location of the persisted run history.
#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Run history file.
    #[arg(long = "history", default_value = DEFAULT_HISTORY_FILE)]
    pub path: PathBuf,
}

/// A single job: input plus mask size.
#[derive(Debug, Args)]
pub struct JobArgs {
    #[command(flatten)]
    pub input: ImageArgs,
    /// Odd, positive mask size.
    #[arg(long, value_parser = parse_mask_size, default_value_t = DEFAULT_MASK_SIZE)]
    pub mask_size: u32,
}

/// Input image, filter and launch geometry; everything but the mask size.
#[derive(Debug, Args)]
pub struct ImageArgs {
    /// Input image file.
    #[arg(long)]
    pub image: PathBuf,
    /// prewitt, laplacian, gaussian or box_blur.
    #[arg(long, default_value_t = FilterKind::default())]
    pub filter: FilterKind,
    /// Threads per block, e.g. `16x16`.
    #[arg(long, default_value_t = Dim2::default())]
    pub block: Dim2,
    /// Blocks per grid, e.g. `16x16`.
    #[arg(long, default_value_t = Dim2::default())]
    pub grid: Dim2,
}

impl ImageArgs {
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig::new(self.block, self.grid)
    }

    /// Build a validated job from already loaded image bytes.
    pub fn job(&self, image: &[u8], mask_size: u32) -> Result<JobRequest, CoreError> {
        JobRequest::new(
            image,
            FilterSpec::new(self.filter, mask_size),
            self.execution_config(),
        )
    }
}
