#![allow(clippy::collapsible_if)]
pub mod ffprobe;
pub mod gpu;
pub mod output_path;
pub mod plan;
pub mod progress;
pub mod request;
pub mod supervisor;

use std::path::PathBuf;
use thiserror::Error;

pub use request::CompressionRequest;
pub use supervisor::{JobEvent, JobEventKind, JobSupervisor};

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("a compression job is already running for {0}")]
    AlreadyRunning(PathBuf),
    #[error("ffmpeg failed to start: {0}")]
    SpawnFailed(String),
    #[error("ffmpeg exited with code {code}")]
    EncodeFailed { code: i32 },
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),
    #[error("No active compression found.")]
    NoActiveJob(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Global transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Prepended to the source file name to form the output file name.
    pub output_prefix: String,
    /// Capacity of the job event broadcast channel.
    pub event_capacity: usize,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            output_prefix: "compressed_".to_string(),
            event_capacity: 256,
        }
    }
}
