//! Relative performance of recorded runs.
//!
//! The first run in the history is the baseline. Speedup is
//! `T_baseline / T_run`; efficiency normalizes the speedup by the ratio
//! of threads per block, i.e. how well the additional threads were used.

use serde::Serialize;

use crate::filter::FilterKind;
use crate::history::RunRecord;
use crate::job::Dim2;

/// One line of the performance report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRow {
    /// 1-based position in the report.
    pub index: usize,
    pub filter: FilterKind,
    pub mask_size: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub block_dim: Dim2,
    pub grid_dim: Dim2,
    pub threads_per_block: u64,
    pub total_blocks: u64,
    pub execution_time_ms: f64,
    pub kernel_time_ms: f64,
    pub speedup: f64,
    pub efficiency: f64,
    pub baseline: bool,
}

/// Build the report for `runs`, using the first run as baseline.
pub fn performance_report(runs: &[RunRecord]) -> Vec<PerformanceRow> {
    let Some(baseline) = runs.first() else {
        return Vec::new();
    };
    let baseline_time = baseline.execution_time_ms;
    let baseline_threads = baseline.threads_per_block() as f64;

    runs.iter()
        .enumerate()
        .map(|(i, run)| {
            let is_baseline = i == 0;
            let threads = run.threads_per_block();
            let (speedup, efficiency) = if is_baseline {
                (1.0, 1.0)
            } else {
                let speedup = ratio(baseline_time, run.execution_time_ms);
                let thread_ratio = ratio(threads as f64, baseline_threads);
                let efficiency = if thread_ratio > 0.0 {
                    speedup / thread_ratio
                } else {
                    0.0
                };
                (speedup, efficiency)
            };

            PerformanceRow {
                index: i + 1,
                filter: run.filter,
                mask_size: run.mask_size,
                image_width: run.image_width,
                image_height: run.image_height,
                block_dim: run.block_dim,
                grid_dim: run.grid_dim,
                threads_per_block: threads,
                total_blocks: run.total_blocks(),
                execution_time_ms: run.execution_time_ms,
                kernel_time_ms: run.kernel_time_ms,
                speedup,
                efficiency,
                baseline: is_baseline,
            }
        })
        .collect()
}

/// Division that yields 0 instead of inf/NaN for a zero denominator.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
