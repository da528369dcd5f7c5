use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vidpress_core::types::JobState;

use crate::gpu::{self, EncoderCapabilities};
use crate::plan::{self, ResolvedPlan};
use crate::progress::ProgressParser;
use crate::{CompressionRequest, TranscodeError, TranscoderConfig, ffprobe};

/// How long to keep reading stderr after ffmpeg has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Something that happened to the job for `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub source: PathBuf,
    pub kind: JobEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobEventKind {
    Progress {
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_secs: Option<f64>,
        current_size_bytes: u64,
    },
    Completed {
        output_path: PathBuf,
        final_size_bytes: u64,
    },
    Canceled,
    Error {
        message: String,
    },
}

impl JobEventKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Read-only view of an active job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub source: PathBuf,
    pub job_id: Uuid,
    pub state: JobState,
    pub pid: Option<u32>,
    pub output_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

struct JobEntry {
    id: Uuid,
    state: JobState,
    pid: Option<u32>,
    output_path: Option<PathBuf>,
    started_at: DateTime<Utc>,
    duration_secs: f64,
    cancel: CancellationToken,
}

type JobTable = Arc<Mutex<HashMap<PathBuf, JobEntry>>>;

/// Owns every running compression, keyed by source path.
///
/// Whoever removes a job's table entry owns its terminal event: the monitor
/// task on a natural exit, or `cancel`/`shutdown`, in which case the monitor
/// reports `canceled` once the child is gone.
pub struct JobSupervisor {
    config: TranscoderConfig,
    jobs: JobTable,
    events: broadcast::Sender<JobEvent>,
}

impl JobSupervisor {
    pub fn new(config: TranscoderConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Probe the configured ffmpeg for hardware encoders.
    pub async fn capabilities(&self) -> EncoderCapabilities {
        gpu::detect(&self.config.ffmpeg_path).await
    }

    /// Start compressing `request.file_path`. Returns the resolved output
    /// path; progress and the outcome arrive as [`JobEvent`]s.
    ///
    /// Failures are also broadcast as an `error` event, except
    /// `AlreadyRunning`, which would otherwise look like the running job
    /// failing.
    pub async fn launch(&self, request: CompressionRequest) -> Result<PathBuf, TranscodeError> {
        let source = request.file_path.clone();
        match self.try_launch(request).await {
            Ok(output) => Ok(output),
            Err(e @ TranscodeError::AlreadyRunning(_)) => {
                warn!(source = %source.display(), "compression already running, request rejected");
                Err(e)
            }
            Err(e) => {
                warn!(source = %source.display(), error = %e, "compression failed to start");
                emit(
                    &self.events,
                    &source,
                    JobEventKind::Error {
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn try_launch(&self, request: CompressionRequest) -> Result<PathBuf, TranscodeError> {
        let source = plan::validate_source(&request)?.to_path_buf();
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        {
            let mut jobs = self.jobs.lock().await;
            if jobs.contains_key(&source) {
                return Err(TranscodeError::AlreadyRunning(source));
            }
            jobs.insert(
                source.clone(),
                JobEntry {
                    id,
                    state: JobState::Planning,
                    pid: None,
                    output_path: None,
                    started_at: Utc::now(),
                    duration_secs: 0.0,
                    cancel: cancel.clone(),
                },
            );
        }

        let caps = gpu::detect(&self.config.ffmpeg_path).await;
        let plan = match plan::build_plan(&request, &caps, &self.config.output_prefix) {
            Ok(plan) => plan,
            Err(e) => {
                release(&self.jobs, &source, id).await;
                return Err(e);
            }
        };
        let duration_secs = ffprobe::duration_or_zero(&self.config.ffprobe_path, &source).await;

        if cancel.is_cancelled() {
            info!(job_id = %id, source = %source.display(), "compression canceled before start");
            emit(&self.events, &source, JobEventKind::Canceled);
            return Ok(plan.output_path);
        }

        info!(
            job_id = %id,
            encoder = %plan.encoder,
            hardware = plan.hardware,
            command = %plan.command_line(&self.config.ffmpeg_path),
            "starting compression"
        );

        let mut child = match spawn_ffmpeg(&self.config.ffmpeg_path, &plan) {
            Ok(child) => child,
            Err(e) => {
                if release(&self.jobs, &source, id).await {
                    return Err(e);
                }
                // Canceled while spawning; the cancel owns the outcome.
                emit(&self.events, &source, JobEventKind::Canceled);
                return Ok(plan.output_path);
            }
        };
        let started = Instant::now();
        let pid = child.id();

        {
            let mut jobs = self.jobs.lock().await;
            if let Some(entry) = jobs.get_mut(&source).filter(|e| e.id == id) {
                entry.state = JobState::Running;
                entry.pid = pid;
                entry.output_path = Some(plan.output_path.clone());
                entry.started_at = Utc::now();
                entry.duration_secs = duration_secs;
            }
        }

        let stderr = child.stderr.take();
        let job = MonitoredJob {
            id,
            source,
            output_path: plan.output_path.clone(),
            started,
            cancel,
            parser: ProgressParser::new(duration_secs),
        };
        tokio::spawn(monitor(
            self.jobs.clone(),
            self.events.clone(),
            job,
            child,
            stderr,
        ));

        Ok(plan.output_path)
    }

    /// Kill the job for `source` and delete its partial output.
    ///
    /// The `canceled` event is broadcast once the process is gone.
    pub async fn cancel(&self, source: &Path) -> Result<(), TranscodeError> {
        let entry = self.jobs.lock().await.remove(source);
        match entry {
            Some(entry) => {
                info!(job_id = %entry.id, source = %source.display(), state = %entry.state, "canceling compression");
                entry.cancel.cancel();
                Ok(())
            }
            None => {
                let err = TranscodeError::NoActiveJob(source.to_path_buf());
                emit(
                    &self.events,
                    source,
                    JobEventKind::Error {
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Cancel every active job. Returns how many were canceled; each still
    /// produces its `canceled` event.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(PathBuf, JobEntry)> = self.jobs.lock().await.drain().collect();
        for (source, entry) in &drained {
            info!(job_id = %entry.id, source = %source.display(), "canceling compression on shutdown");
            entry.cancel.cancel();
        }
        drained.len()
    }

    /// Get active job count.
    pub async fn active_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Snapshots of all active jobs, ordered by source path.
    pub async fn list_jobs(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.lock().await;
        let mut out: Vec<JobSnapshot> = jobs
            .iter()
            .map(|(source, e)| JobSnapshot {
                source: source.clone(),
                job_id: e.id,
                state: e.state,
                pid: e.pid,
                output_path: e.output_path.clone(),
                started_at: e.started_at,
                duration_secs: e.duration_secs,
            })
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }
}

struct MonitoredJob {
    id: Uuid,
    source: PathBuf,
    output_path: PathBuf,
    started: Instant,
    cancel: CancellationToken,
    parser: ProgressParser,
}

fn spawn_ffmpeg(ffmpeg_path: &Path, plan: &ResolvedPlan) -> Result<Child, TranscodeError> {
    tokio::process::Command::new(ffmpeg_path)
        .args(&plan.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| TranscodeError::SpawnFailed(e.to_string()))
}

/// Drive one ffmpeg process to its terminal event.
async fn monitor(
    jobs: JobTable,
    events: broadcast::Sender<JobEvent>,
    mut job: MonitoredJob,
    mut child: Child,
    mut stderr: Option<ChildStderr>,
) {
    let mut buf = vec![0u8; 8192];

    let status = loop {
        tokio::select! {
            biased;
            _ = job.cancel.cancelled() => {
                if let Err(e) = child.start_kill() {
                    warn!(job_id = %job.id, error = %e, "failed to kill ffmpeg");
                }
                let _ = child.wait().await;
                finish_canceled(&events, &job).await;
                return;
            }
            read = read_chunk(&mut stderr, &mut buf) => match read {
                Some(n) => report_progress(&events, &mut job, &buf[..n]).await,
                None => stderr = None,
            },
            status = child.wait() => break status,
        }
    };

    // Pick up status lines written just before exit.
    let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, async {
        while stderr.is_some() {
            match read_chunk(&mut stderr, &mut buf).await {
                Some(n) => report_progress(&events, &mut job, &buf[..n]).await,
                None => stderr = None,
            }
        }
    })
    .await;

    if !release(&jobs, &job.source, job.id).await {
        // cancel() claimed the entry while ffmpeg was exiting.
        finish_canceled(&events, &job).await;
        return;
    }

    finish_exited(&events, &job, status).await;
}

async fn read_chunk(stderr: &mut Option<ChildStderr>, buf: &mut [u8]) -> Option<usize> {
    match stderr {
        Some(s) => match s.read(buf).await {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(n),
        },
        None => std::future::pending().await,
    }
}

async fn report_progress(events: &broadcast::Sender<JobEvent>, job: &mut MonitoredJob, chunk: &[u8]) {
    let samples = job.parser.feed(chunk, job.started.elapsed());
    for sample in samples {
        let size = file_size(&job.output_path).await;
        emit(
            events,
            &job.source,
            JobEventKind::Progress {
                percent: sample.percent,
                remaining_secs: sample.remaining_secs,
                current_size_bytes: size,
            },
        );
    }
}

async fn finish_exited(
    events: &broadcast::Sender<JobEvent>,
    job: &MonitoredJob,
    status: std::io::Result<ExitStatus>,
) {
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "failed to wait for ffmpeg");
            emit(
                events,
                &job.source,
                JobEventKind::Error {
                    message: format!("failed to wait for ffmpeg: {e}"),
                },
            );
            return;
        }
    };

    if status.success() {
        let size = file_size(&job.output_path).await;
        info!(
            job_id = %job.id,
            output = %job.output_path.display(),
            size_bytes = size,
            elapsed_secs = job.started.elapsed().as_secs_f64(),
            "compression completed"
        );
        emit(
            events,
            &job.source,
            JobEventKind::Completed {
                output_path: job.output_path.clone(),
                final_size_bytes: size,
            },
        );
        return;
    }

    match status.code() {
        Some(code) => {
            let err = TranscodeError::EncodeFailed { code };
            warn!(job_id = %job.id, code, "compression failed");
            emit(
                events,
                &job.source,
                JobEventKind::Error {
                    message: err.to_string(),
                },
            );
        }
        // Killed by a signal from outside.
        None => finish_canceled(events, job).await,
    }
}

async fn finish_canceled(events: &broadcast::Sender<JobEvent>, job: &MonitoredJob) {
    remove_partial(&job.output_path).await;
    info!(job_id = %job.id, source = %job.source.display(), "compression canceled");
    emit(events, &job.source, JobEventKind::Canceled);
}

/// Remove `source` from the table if it still belongs to job `id`.
async fn release(jobs: &JobTable, source: &Path, id: Uuid) -> bool {
    let mut jobs = jobs.lock().await;
    match jobs.get(source) {
        Some(entry) if entry.id == id => {
            jobs.remove(source);
            true
        }
        _ => false,
    }
}

fn emit(events: &broadcast::Sender<JobEvent>, source: &Path, kind: JobEventKind) {
    // No subscribers is fine.
    let _ = events.send(JobEvent {
        source: source.to_path_buf(),
        kind,
    });
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial output"),
    }
}
