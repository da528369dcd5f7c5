use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use vidpress_server::routes::build_router;
use vidpress_server::state::{AppState, ServerEvent};
use vidpress_transcoder::{JobSupervisor, TranscoderConfig};

/// A stand-in ffmpeg that writes a partial file and then hangs until killed.
static SLOW_FFMPEG: LazyLock<PathBuf> = LazyLock::new(|| {
    let dir = tempfile::Builder::new()
        .prefix("vidpress-server-fixtures")
        .tempdir()
        .unwrap()
        .keep();
    let path = dir.join("ffmpeg");
    std::fs::write(
        &path,
        "#!/bin/sh\n\
         [ \"$2\" = \"-encoders\" ] && { echo ' V....D h264_nvenc NVIDIA NVENC'; exit 0; }\n\
         for out; do :; done\n\
         printf 'partial' > \"$out\"\n\
         exec sleep 30\n",
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
});

/// Create a test server around a supervisor using `ffmpeg_path`.
fn test_app(ffmpeg_path: PathBuf) -> (TestServer, AppState) {
    let tc_config = TranscoderConfig {
        ffmpeg_path,
        ffprobe_path: PathBuf::from("/nonexistent/vidpress/ffprobe"),
        ..Default::default()
    };
    let transcoder = Arc::new(JobSupervisor::new(tc_config));
    let state = AppState::new(transcoder, 64);

    let app = build_router(state.clone());
    (TestServer::new(app).unwrap(), state)
}

fn missing_ffmpeg() -> PathBuf {
    PathBuf::from("/nonexistent/vidpress/ffmpeg")
}

async fn next_event(rx: &mut broadcast::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for server event")
        .expect("event channel closed")
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (server, _) = test_app(missing_ffmpeg());
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn compress_missing_file_is_bad_request() {
    let (server, state) = test_app(missing_ffmpeg());
    let mut rx = state.events.subscribe();

    let resp = server
        .post("/api/v1/compress")
        .json(&json!({ "filePath": "/nonexistent/vidpress/movie.mp4", "method": "CRF" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "bad_request");

    match next_event(&mut rx).await {
        ServerEvent::Error { source, .. } => {
            assert_eq!(source, PathBuf::from("/nonexistent/vidpress/movie.mp4"))
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn compress_with_missing_encoder_is_internal_error() {
    let (server, _) = test_app(missing_ffmpeg());
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("movie.mp4");
    std::fs::write(&src, b"source").unwrap();

    let resp = server
        .post("/api/v1/compress")
        .json(&json!({ "filePath": src }))
        .await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "internal_error");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("ffmpeg failed to start")
    );
}

#[tokio::test]
async fn cancel_without_job_is_not_found() {
    let (server, state) = test_app(missing_ffmpeg());
    let mut rx = state.events.subscribe();

    let resp = server
        .post("/api/v1/cancel")
        .json(&json!({ "filePath": "/videos/idle.mp4" }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "not_found");

    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::Error {
            source: PathBuf::from("/videos/idle.mp4"),
            message: "No active compression found.".into(),
        }
    );
}

#[tokio::test]
async fn capabilities_without_ffmpeg_are_empty() {
    let (server, _) = test_app(missing_ffmpeg());
    let resp = server.get("/api/v1/capabilities").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(
        body,
        json!({
            "nvidia": { "h264": null, "h265": null },
            "amd": { "h264": null, "h265": null }
        })
    );
}

#[tokio::test]
async fn jobs_start_empty() {
    let (server, _) = test_app(missing_ffmpeg());
    let resp = server.get("/api/v1/jobs").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body, json!([]));
}

#[cfg(unix)]
#[tokio::test]
async fn compress_then_cancel_round_trip() {
    let (server, state) = test_app(SLOW_FFMPEG.clone());
    let mut rx = state.events.subscribe();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("movie.mp4");
    std::fs::write(&src, b"source").unwrap();

    let resp = server
        .post("/api/v1/compress")
        .json(&json!({
            "filePath": src,
            "gpuType": "nvidia",
            "videoEncoder": "libx264",
            "method": "bitrate",
            "bitrate": "2500",
            "preset": "p7"
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    let body: Value = resp.json();
    let out = dir.path().join("compressed_movie.mp4");
    assert_eq!(body["output_path"], json!(out));

    // Same source again while running.
    let resp = server
        .post("/api/v1/compress")
        .json(&json!({ "filePath": src }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);

    let resp = server.get("/api/v1/jobs").await;
    let jobs: Value = resp.json();
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["state"], "running");
    assert_eq!(jobs[0]["source"], json!(src));

    let resp = server
        .post("/api/v1/cancel")
        .json(&json!({ "filePath": src }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    assert_eq!(
        next_event(&mut rx).await,
        ServerEvent::Canceled {
            source: src.clone()
        }
    );
    assert!(!out.exists());

    let resp = server.get("/api/v1/jobs").await;
    let jobs: Value = resp.json();
    assert_eq!(jobs, json!([]));
}

#[test]
fn server_event_wire_format() {
    let evt = ServerEvent::Progress {
        source: PathBuf::from("/v/a.mp4"),
        percent: 42,
        remaining_secs: Some(12.5),
        current_size_bytes: 2048,
    };
    assert_eq!(evt.event_type(), "progress");
    let json = serde_json::to_value(&evt).unwrap();
    assert_eq!(json["type"], "progress");
    assert_eq!(json["data"]["percent"], 42);
    assert_eq!(json["data"]["remaining_secs"], 12.5);
    assert_eq!(json["data"]["current_size_bytes"], 2048);

    let json = serde_json::to_value(ServerEvent::Completed {
        source: PathBuf::from("/v/a.mp4"),
        output_path: PathBuf::from("/v/compressed_a.mp4"),
        final_size_bytes: 10,
    })
    .unwrap();
    assert_eq!(json["type"], "completed");
    assert_eq!(json["data"]["output_path"], "/v/compressed_a.mp4");
}
