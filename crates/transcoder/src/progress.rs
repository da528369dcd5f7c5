//! Incremental parsing of ffmpeg's stderr status lines.
//!
//! ffmpeg rewrites its status line in place with `\r`, so both `\r` and `\n`
//! terminate a line. Chunks may split lines anywhere; the tail is buffered.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

static RE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+):(\d+):(\d+(?:\.\d+)?)").unwrap());

/// Upper bound on a buffered partial line.
const MAX_PENDING: usize = 64 * 1024;

/// One progress observation derived from a `time=` status line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSample {
    pub encoded_secs: f64,
    /// 0..=100
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<f64>,
    /// Filled in by the supervisor; 0 until then.
    pub current_size_bytes: u64,
}

pub struct ProgressParser {
    total_secs: f64,
    pending: Vec<u8>,
}

impl ProgressParser {
    pub fn new(total_secs: f64) -> Self {
        Self {
            total_secs,
            pending: Vec::new(),
        }
    }

    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    /// Feed a raw stderr chunk. `wall` is the wall-clock time since the
    /// encoder was started.
    pub fn feed(&mut self, chunk: &[u8], wall: Duration) -> Vec<ProgressSample> {
        self.pending.extend_from_slice(chunk);

        let mut samples = Vec::new();
        let mut start = 0;
        for (i, b) in self.pending.iter().enumerate() {
            if *b == b'\n' || *b == b'\r' {
                let line = String::from_utf8_lossy(&self.pending[start..i]);
                if let Some(encoded) = parse_time(&line) {
                    samples.extend(compute(encoded, self.total_secs, wall));
                }
                start = i + 1;
            }
        }
        self.pending.drain(..start);

        if self.pending.len() > MAX_PENDING {
            self.pending.clear();
        }
        samples
    }
}

/// Seconds encoded so far, from the last `time=HH:MM:SS.ff` in a line.
pub fn parse_time(line: &str) -> Option<f64> {
    let caps = RE_TIME.captures_iter(line).last()?;
    let h: f64 = caps[1].parse().ok()?;
    let m: f64 = caps[2].parse().ok()?;
    let s: f64 = caps[3].parse().ok()?;
    Some(h * 3600.0 + m * 60.0 + s)
}

/// Percent and ETA for `encoded` of `total` seconds after `wall` of encoding.
///
/// `None` when either duration is zero, since no ratio can be formed.
pub fn compute(encoded: f64, total: f64, wall: Duration) -> Option<ProgressSample> {
    if total.is_nan() || encoded.is_nan() || total <= 0.0 || encoded <= 0.0 {
        return None;
    }

    let percent = ((encoded / total) * 100.0).floor().min(100.0) as u8;

    let elapsed = wall.as_secs_f64();
    let estimated_total = elapsed * total / encoded;
    let remaining = (estimated_total - elapsed).max(0.0);

    Some(ProgressSample {
        encoded_secs: encoded,
        percent,
        remaining_secs: Some(remaining),
        current_size_bytes: 0,
    })
}
