use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Transcoder config
    let defaults = vidpress_transcoder::TranscoderConfig::default();
    let tc_config = vidpress_transcoder::TranscoderConfig {
        ffmpeg_path: std::env::var_os("VIDPRESS_FFMPEG")
            .map(Into::into)
            .unwrap_or(defaults.ffmpeg_path),
        ffprobe_path: std::env::var_os("VIDPRESS_FFPROBE")
            .map(Into::into)
            .unwrap_or(defaults.ffprobe_path),
        output_prefix: std::env::var("VIDPRESS_OUTPUT_PREFIX").unwrap_or(defaults.output_prefix),
        event_capacity: defaults.event_capacity,
    };
    info!(
        ffmpeg = %tc_config.ffmpeg_path.display(),
        ffprobe = %tc_config.ffprobe_path.display(),
        output_prefix = %tc_config.output_prefix,
        "transcoder configured"
    );

    let supervisor = Arc::new(vidpress_transcoder::JobSupervisor::new(tc_config));
    let caps = supervisor.capabilities().await;
    info!(?caps, "startup capability probe");

    let app_state = vidpress_server::state::AppState::new(supervisor.clone(), 256);
    vidpress_server::state::spawn_heartbeat(app_state.events.clone(), Duration::from_secs(30));

    let app = vidpress_server::routes::build_router(app_state);

    let bind_addr =
        std::env::var("VIDPRESS_BIND").unwrap_or_else(|_| "127.0.0.1:8097".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let mut job_events = supervisor.subscribe();
    let canceled = supervisor.shutdown().await;
    info!(canceled, "shutting down");

    // Wait for monitors to kill their children and remove partial output.
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        let mut remaining = canceled;
        while remaining > 0 {
            match job_events.recv().await {
                Ok(evt) if evt.kind.is_terminal() => remaining -= 1,
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("timed out waiting for compressions to stop");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
