//! Subcommand implementations.
//!
//! Each command validates its input before any network call, talks to the
//! backend through [`ConvolveApi`] and reports through `tracing`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use convlab_client::api::{ConvolveApi, ConvolveResponse};
use convlab_client::consumer::{StreamConsumer, StreamOutcome};
use convlab_client::state::StreamState;
use convlab_core::filter::{FilterKind, FilterSpec};
use convlab_core::history::{HistoryAction, NewRun, RunHistory, RunRecord};
use convlab_core::image_ref::decode_image_ref;
use convlab_core::job::JobRequest;
use convlab_core::metrics::{performance_report, PerformanceRow};

use crate::args::{Cli, Command, ImageArgs, JobArgs};
use crate::config::ClientConfig;
use crate::history;

/// Dispatch `cli` to its subcommand.
///
/// Configuration is loaded only for commands that talk to the backend.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let api_url = cli.api_url.as_deref();

    match cli.command {
        Command::Health => health(&connect(api_url)?).await,
        Command::Convolve { job, out, history } => {
            convolve(&connect(api_url)?, &job, out, &history.path)
                .await
                .map(|_| ())
        }
        Command::Stream { job, gain, out } => {
            stream(&connect(api_url)?, &job, gain, out).await.map(|_| ())
        }
        Command::Sweep {
            input,
            mask_sizes,
            report,
        } => sweep(&connect(api_url)?, &input, &mask_sizes, report)
            .await
            .map(|_| ()),
        Command::Report { history, out } => report(&history.path, out).await.map(|_| ()),
        Command::Reset { history } => reset(&history.path).await,
    }
}

fn connect(api_url: Option<&str>) -> anyhow::Result<ConvolveApi> {
    let config = ClientConfig::from_env(api_url).context("Invalid configuration")?;
    build_api(&config)
}

/// Build the REST client with the configured timeouts.
pub fn build_api(config: &ClientConfig) -> anyhow::Result<ConvolveApi> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    Ok(ConvolveApi::with_client(client, config.api_url.clone())
        .with_request_timeout(config.request_timeout))
}

pub async fn health(api: &ConvolveApi) -> anyhow::Result<()> {
    api.health()
        .await
        .with_context(|| format!("Backend at {} is not healthy", api.api_url()))?;
    tracing::info!(api_url = %api.api_url(), "Backend is healthy");
    Ok(())
}

/// Run one synchronous convolution, write the result image and record
/// the run in the history file.
pub async fn convolve(
    api: &ConvolveApi,
    args: &JobArgs,
    out: Option<PathBuf>,
    history_path: &Path,
) -> anyhow::Result<RunRecord> {
    let image = read_image(&args.input.image).await?;
    let job = args.input.job(&image, args.mask_size)?;
    let mut runs = history::load(history_path).await?;

    let response = api.convolve(&job).await.context("Convolution failed")?;
    log_response(&response);

    let out = out.unwrap_or_else(|| default_output(args.input.filter));
    write_image(&out, &response.result_image_base64).await?;

    runs.apply(HistoryAction::Record(new_run(args.input.filter, &job, &response)))?;
    history::save(history_path, &runs).await?;

    let record = runs.runs().last().cloned().context("Run was not recorded")?;
    tracing::info!(run = record.id, recorded = runs.len(), "Run recorded");
    Ok(record)
}

/// Report speedup and efficiency for the runs in the history file.
pub async fn report(
    history_path: &Path,
    out: Option<PathBuf>,
) -> anyhow::Result<Vec<PerformanceRow>> {
    let runs = history::load(history_path).await?;
    if runs.is_empty() {
        bail!("No runs recorded in {}", history_path.display());
    }

    let rows = performance_report(runs.runs());
    log_rows(&rows);
    if let Some(path) = out {
        write_report(&path, &runs, &rows).await?;
    }
    Ok(rows)
}

/// Clear the history file.
pub async fn reset(history_path: &Path) -> anyhow::Result<()> {
    let mut runs = history::load(history_path).await?;
    let cleared = runs.len();
    runs.apply(HistoryAction::Reset)
        .with_context(|| format!("Nothing to reset in {}", history_path.display()))?;
    history::save(history_path, &runs).await?;

    tracing::info!(path = %history_path.display(), cleared, "History reset");
    Ok(())
}

/// Follow a progress stream until it finishes or Ctrl-C stops it.
pub async fn stream(
    api: &ConvolveApi,
    args: &JobArgs,
    gain: f64,
    out: Option<PathBuf>,
) -> anyhow::Result<StreamOutcome> {
    let image = read_image(&args.input.image).await?;
    let job = JobRequest::new(
        &image,
        FilterSpec::new(args.input.filter, args.mask_size).with_gain(gain),
        args.input.execution_config(),
    )?;

    let consumer = StreamConsumer::new(api.clone());
    let mut updates = consumer.subscribe();
    let handle = consumer.start(job).await;
    let stream_id = handle.id();

    let mut finished = std::pin::pin!(handle.wait());
    let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;

    let result = loop {
        tokio::select! {
            result = &mut finished => break result,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut finished).await;
                }
                let state = updates.borrow_and_update().clone();
                log_progress(&state);
            }
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                tracing::info!(stream_id = %stream_id, "Interrupted, stopping stream");
                consumer.stop().await;
            }
        }
    };

    let state = consumer.state();
    let outcome = result.context("Stream failed")?;
    match &outcome {
        StreamOutcome::Completed => {
            let out = out.unwrap_or_else(|| default_output(args.input.filter));
            match &state.preview_image {
                Some(preview) => write_image(&out, preview).await?,
                None => tracing::warn!("Stream completed without a preview image"),
            }
        }
        StreamOutcome::Cancelled => {
            tracing::info!(progress = state.progress, "Stream stopped before completion");
        }
        StreamOutcome::Failed(e) => bail!("Processing failed: {e}"),
        StreamOutcome::Ended => {
            bail!("Stream ended before the backend reported completion")
        }
    }

    Ok(outcome)
}

/// Run one convolution per mask size and write the performance report.
pub async fn sweep(
    api: &ConvolveApi,
    input: &ImageArgs,
    mask_sizes: &[u32],
    report: Option<PathBuf>,
) -> anyhow::Result<Vec<PerformanceRow>> {
    if mask_sizes.is_empty() {
        bail!("No mask sizes to sweep");
    }

    let image = read_image(&input.image).await?;
    let jobs = mask_sizes
        .iter()
        .map(|&mask_size| input.job(&image, mask_size))
        .collect::<Result<Vec<_>, _>>()?;

    let mut history = RunHistory::new();
    for job in &jobs {
        let response = api
            .convolve(job)
            .await
            .with_context(|| format!("Convolution failed for mask size {}", job.filter().mask_size))?;
        log_response(&response);
        history.apply(HistoryAction::Record(new_run(input.filter, job, &response)))?;
    }

    let rows = performance_report(history.runs());
    log_rows(&rows);

    let path = report.unwrap_or_else(|| {
        PathBuf::from(format!(
            "convlab-results-{}.json",
            chrono::Utc::now().format("%Y%m%dT%H%M%S")
        ))
    });
    write_report(&path, &history, &rows).await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn log_rows(rows: &[PerformanceRow]) {
    for row in rows {
        tracing::info!(
            run = row.index,
            filter = %row.filter,
            mask_size = row.mask_size,
            execution_ms = row.execution_time_ms,
            kernel_ms = row.kernel_time_ms,
            threads_per_block = row.threads_per_block,
            total_blocks = row.total_blocks,
            speedup = format!("{:.2}x", row.speedup),
            efficiency = format!("{:.1}%", row.efficiency * 100.0),
            baseline = row.baseline,
            "Performance",
        );
    }
}

async fn write_report(
    path: &Path,
    history: &RunHistory,
    rows: &[PerformanceRow],
) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(&serde_json::json!({
        "generated_at": chrono::Utc::now(),
        "runs": history.runs(),
        "performance": rows,
    }))?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    tracing::info!(path = %path.display(), runs = rows.len(), "Report written");
    Ok(())
}

fn default_output(filter: FilterKind) -> PathBuf {
    PathBuf::from(format!("processed_{filter}.png"))
}

async fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))
}

async fn write_image(path: &Path, image_ref: &str) -> anyhow::Result<()> {
    let bytes = decode_image_ref(image_ref).context("Backend returned an unreadable image")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write image {}", path.display()))?;
    tracing::info!(path = %path.display(), "Image written");
    Ok(())
}

/// History entry for a finished run; falls back to the request where the
/// backend left a field out.
fn new_run(filter: FilterKind, job: &JobRequest, response: &ConvolveResponse) -> NewRun {
    let mask_size = match response.mask_size_used {
        0 => job.filter().mask_size,
        used => used,
    };
    NewRun {
        filter,
        mask_size,
        execution_time_ms: response.execution_time_ms,
        kernel_time_ms: response.kernel_time_ms,
        block_dim: response.block_dim,
        grid_dim: response.grid_dim,
        image_width: response.image_width.unwrap_or(0),
        image_height: response.image_height.unwrap_or(0),
    }
}

fn log_response(response: &ConvolveResponse) {
    tracing::info!(
        mask_size = response.mask_size_used,
        execution_ms = response.execution_time_ms,
        kernel_ms = response.kernel_time_ms,
        block = %response.block_dim,
        grid = %response.grid_dim,
        "Convolution finished",
    );
}

fn log_progress(state: &StreamState) {
    tracing::info!(
        status = ?state.status,
        progress = format!("{:.1}%", state.progress),
        rows = format!("{}/{}", state.rows_processed, state.total_rows),
        chunk = format!("{}/{}", state.chunk, state.total_chunks),
        filter = %state.filter_used,
        elapsed_ms = state.elapsed_ms,
        "Stream progress",
    );
}
