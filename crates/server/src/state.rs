use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use vidpress_transcoder::{JobEvent, JobEventKind, JobSupervisor};

/// Server-sent event types.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "progress")]
    Progress {
        source: PathBuf,
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_secs: Option<f64>,
        current_size_bytes: u64,
    },
    #[serde(rename = "completed")]
    Completed {
        source: PathBuf,
        output_path: PathBuf,
        final_size_bytes: u64,
    },
    #[serde(rename = "canceled")]
    Canceled { source: PathBuf },
    #[serde(rename = "error")]
    Error { source: PathBuf, message: String },
    #[serde(rename = "heartbeat")]
    Heartbeat { seq: u64 },
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Canceled { .. } => "canceled",
            Self::Error { .. } => "error",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

impl From<JobEvent> for ServerEvent {
    fn from(evt: JobEvent) -> Self {
        let source = evt.source;
        match evt.kind {
            JobEventKind::Progress {
                percent,
                remaining_secs,
                current_size_bytes,
            } => Self::Progress {
                source,
                percent,
                remaining_secs,
                current_size_bytes,
            },
            JobEventKind::Completed {
                output_path,
                final_size_bytes,
            } => Self::Completed {
                source,
                output_path,
                final_size_bytes,
            },
            JobEventKind::Canceled => Self::Canceled { source },
            JobEventKind::Error { message } => Self::Error { source, message },
        }
    }
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub transcoder: Arc<JobSupervisor>,
    pub events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    /// Wire up state and start relaying job events. Must be called inside a
    /// tokio runtime.
    pub fn new(transcoder: Arc<JobSupervisor>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        spawn_event_relay(transcoder.subscribe(), events.clone());
        Self { transcoder, events }
    }
}

fn spawn_event_relay(mut rx: broadcast::Receiver<JobEvent>, tx: broadcast::Sender<ServerEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(evt) => {
                    let _ = tx.send(ServerEvent::from(evt));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event relay lagged behind job events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Emit a heartbeat on `events` every `every`.
pub fn spawn_heartbeat(events: broadcast::Sender<ServerEvent>, every: Duration) {
    tokio::spawn(async move {
        let mut seq = 0u64;
        loop {
            tokio::time::sleep(every).await;
            let _ = events.send(ServerEvent::Heartbeat { seq });
            seq += 1;
        }
    });
}
