//! End-to-end tests for the subcommands against an in-process backend.

use std::time::Duration;

use assert_matches::assert_matches;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use convlab_cli::args::{ImageArgs, JobArgs};
use convlab_cli::commands;
use convlab_cli::config::ClientConfig;
use convlab_client::api::ConvolveApi;
use convlab_client::consumer::StreamOutcome;
use convlab_core::filter::FilterKind;
use convlab_core::job::Dim2;
use serde_json::{json, Value};

/// `AAEC` decodes to these bytes.
const RESULT_BYTES: [u8; 3] = [0, 1, 2];

async fn serve(router: Router) -> ConvolveApi {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("mock backend address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock backend");
    });

    let config = ClientConfig {
        api_url: format!("http://{addr}"),
        connect_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
    };
    commands::build_api(&config).expect("api client")
}

/// `/convolve` that takes `mask_size` milliseconds and echoes the request.
async fn convolve_backend() -> ConvolveApi {
    serve(Router::new().route(
        "/convolve",
        post(|Json(request): Json<Value>| async move {
            let mask_size = request["filter"]["mask_size"].as_u64().unwrap_or(0);
            Json(json!({
                "status": "ok",
                "result_image_base64": "data:image/png;base64,AAEC",
                "execution_time_ms": mask_size as f64,
                "kernel_time_ms": mask_size as f64 / 2.0,
                "mask_size_used": mask_size,
                "block_dim": request["cuda_config"]["block_dim"],
                "grid_dim": request["cuda_config"]["grid_dim"],
                "image_width": 4,
                "image_height": 2,
            }))
        }),
    ))
    .await
}

/// `/convolve-stream` answering with a fixed body.
async fn stream_backend(body: &'static str) -> ConvolveApi {
    serve(Router::new().route(
        "/convolve-stream",
        post(move || async move {
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }),
    ))
    .await
}

fn input(dir: &tempfile::TempDir) -> ImageArgs {
    let image = dir.path().join("in.png");
    std::fs::write(&image, b"\x89PNG fake").expect("write input image");
    ImageArgs {
        image,
        filter: FilterKind::Gaussian,
        block: Dim2::new(16, 16),
        grid: Dim2::new(8, 8),
    }
}

fn job(dir: &tempfile::TempDir, mask_size: u32) -> JobArgs {
    JobArgs {
        input: input(dir),
        mask_size,
    }
}

#[tokio::test]
async fn convolve_writes_result_and_records_run() {
    let dir = tempfile::tempdir().unwrap();
    let api = convolve_backend().await;
    let out = dir.path().join("out.png");
    let history = dir.path().join("history.json");

    let run = commands::convolve(&api, &job(&dir, 5), Some(out.clone()), &history)
        .await
        .unwrap();

    assert_eq!(run.id, 1);
    assert_eq!(run.mask_size, 5);
    assert_eq!(run.execution_time_ms, 5.0);
    assert_eq!(run.grid_dim, Dim2::new(8, 8));
    assert_eq!(run.image_width, 4);
    assert_eq!(std::fs::read(out).unwrap(), RESULT_BYTES);
}

#[tokio::test]
async fn missing_image_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    // Nothing listens here; reaching the network would be a different error.
    let api = ConvolveApi::new("http://127.0.0.1:9");
    let mut args = job(&dir, 5);
    args.input.image = dir.path().join("missing.png");

    let err = commands::convolve(&api, &args, None, &dir.path().join("history.json"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read image"), "{err:#}");
}

#[tokio::test]
async fn recorded_runs_feed_report_until_reset() {
    let dir = tempfile::tempdir().unwrap();
    let api = convolve_backend().await;
    let history = dir.path().join("history.json");
    let out = dir.path().join("out.png");

    for mask_size in [3, 9, 3] {
        commands::convolve(&api, &job(&dir, mask_size), Some(out.clone()), &history)
            .await
            .unwrap();
    }

    // The repeated mask size replaced its earlier run.
    let report_path = dir.path().join("report.json");
    let rows = commands::report(&history, Some(report_path.clone())).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].mask_size, 9);
    assert_eq!(rows[1].mask_size, 3);
    assert_eq!(rows[1].speedup, 3.0);

    let written: Value = serde_json::from_slice(&std::fs::read(report_path).unwrap()).unwrap();
    assert_eq!(written["runs"][1]["id"], 3);

    commands::reset(&history).await.unwrap();
    let err = commands::report(&history, None).await.unwrap_err();
    assert!(err.to_string().contains("No runs recorded"), "{err:#}");

    let err = commands::reset(&history).await.unwrap_err();
    assert!(err.to_string().contains("Nothing to reset"), "{err:#}");
}

#[tokio::test]
async fn sweep_reports_speedup_against_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let api = convolve_backend().await;
    let report = dir.path().join("report.json");

    let rows = commands::sweep(&api, &input(&dir), &[3, 5, 9], Some(report.clone()))
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert!(rows[0].baseline);
    assert_eq!(rows[0].speedup, 1.0);
    assert_eq!(rows[2].speedup, 3.0 / 9.0);
    // Same launch geometry throughout, so efficiency equals speedup.
    assert_eq!(rows[2].efficiency, rows[2].speedup);

    let written: Value = serde_json::from_slice(&std::fs::read(report).unwrap()).unwrap();
    assert_eq!(written["runs"].as_array().unwrap().len(), 3);
    assert_eq!(written["performance"][1]["mask_size"], 5);
}

#[tokio::test]
async fn stream_writes_final_preview() {
    let dir = tempfile::tempdir().unwrap();
    let api = stream_backend(
        "data: {\"progress\":50,\"result_image_base64\":\"AAAA\"}\n\n\
         data: {\"progress\":100,\"result_image_base64\":\"AAEC\",\"completed\":true}\n\n",
    )
    .await;
    let out = dir.path().join("preview.png");

    let outcome = commands::stream(&api, &job(&dir, 9), 8.0, Some(out.clone()))
        .await
        .unwrap();

    assert_matches!(outcome, StreamOutcome::Completed);
    assert_eq!(std::fs::read(out).unwrap(), RESULT_BYTES);
}

#[tokio::test]
async fn stream_error_frame_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let api = stream_backend("data: {\"error\":\"CUDA out of memory\"}\n\n").await;

    let err = commands::stream(&api, &job(&dir, 9), 8.0, Some(dir.path().join("x.png")))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("CUDA out of memory"), "{err:#}");
}

#[tokio::test]
async fn stream_without_terminal_frame_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let api = stream_backend("data: {\"progress\":40}\n\n").await;
    let out = dir.path().join("x.png");

    let err = commands::stream(&api, &job(&dir, 9), 8.0, Some(out.clone()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ended before"), "{err:#}");
    assert!(!out.exists());
}
