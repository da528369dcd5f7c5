use std::path::Path;

use tracing::{debug, warn};

use crate::TranscodeError;

/// Run ffprobe on a file and return its container duration in seconds.
pub async fn probe_duration(ffprobe_path: &Path, file: &Path) -> Result<f64, TranscodeError> {
    let output = tokio::process::Command::new(ffprobe_path)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(file)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| TranscodeError::ProbeFailed(format!("spawn failed: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration(&stdout).ok_or_else(|| {
        let stderr = String::from_utf8_lossy(&output.stderr);
        TranscodeError::ProbeFailed(format!(
            "unparsable duration {:?}: {}",
            stdout.trim(),
            stderr.trim()
        ))
    })
}

/// Best-effort duration: 0.0 when ffprobe is missing or prints garbage.
pub async fn duration_or_zero(ffprobe_path: &Path, file: &Path) -> f64 {
    match probe_duration(ffprobe_path, file).await {
        Ok(secs) => {
            debug!(file = %file.display(), duration_secs = secs, "probed duration");
            secs
        }
        Err(e) => {
            warn!(
                file = %file.display(),
                error = %e,
                "duration unknown, progress reporting disabled"
            );
            0.0
        }
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    let secs: f64 = stdout.lines().next()?.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs)
    } else {
        None
    }
}
