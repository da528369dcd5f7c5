//! Maps a compression request onto a concrete ffmpeg invocation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::warn;
use vidpress_core::types::{GpuPlatform, RateControl, VideoCodec};

use crate::gpu::{EncoderCapabilities, is_hardware_encoder};
use crate::output_path;
use crate::request::{CompressionRequest, DEFAULT_AUDIO_BITRATE};
use crate::TranscodeError;

/// Presets accepted by the NVENC/AMF encoders. Anything else becomes `default`.
pub const HW_PRESETS: &[&str] = &[
    "default", "slow", "medium", "fast", "hp", "hq", "bd", "ll", "llhq", "llhp", "lossless",
];

/// A fully resolved encoder invocation for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    /// Arguments after the ffmpeg binary; the output path is last.
    pub args: Vec<OsString>,
    pub encoder: String,
    pub hardware: bool,
    pub output_path: PathBuf,
}

impl ResolvedPlan {
    /// Human-readable command line, for logs.
    pub fn command_line(&self, ffmpeg_path: &Path) -> String {
        let mut line = ffmpeg_path.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Reject empty or missing source paths.
pub fn validate_source(request: &CompressionRequest) -> Result<&Path, TranscodeError> {
    let source = request.file_path.as_path();
    if source.as_os_str().is_empty() {
        return Err(TranscodeError::InvalidInput("Invalid file path.".into()));
    }
    if !source.is_file() {
        return Err(TranscodeError::InvalidInput(format!(
            "Invalid file path: {}",
            source.display()
        )));
    }
    Ok(source)
}

/// Build the ffmpeg arguments and output path for a request.
pub fn build_plan(
    request: &CompressionRequest,
    caps: &EncoderCapabilities,
    output_prefix: &str,
) -> Result<ResolvedPlan, TranscodeError> {
    let source = validate_source(request)?;
    let output_path = output_path::resolve(&output_path::candidate_for(source, output_prefix));

    let encoder = select_encoder(request, caps);
    let hardware = is_hardware_encoder(&encoder);

    let mut args: Vec<OsString> = vec![
        "-i".into(),
        source.as_os_str().to_os_string(),
        "-c:v".into(),
        encoder.clone().into(),
    ];

    if hardware {
        args.extend(["-preset".into(), hardware_preset(request.preset()).into()]);
        args.extend(hardware_rate_args(request).into_iter().map(OsString::from));
    } else {
        args.extend(software_rate_args(request).into_iter().map(OsString::from));
        let preset = request.preset();
        if !preset.is_empty() {
            args.extend(["-preset".into(), preset.into()]);
        }
    }

    if let Some(scale) = scale_filter(request.resolution.as_deref()) {
        args.extend(["-vf".into(), scale.into()]);
    }
    if let Some(rate) = frame_rate(request.framerate.as_deref()) {
        args.extend(["-r".into(), rate.into()]);
    }

    args.extend([
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        audio_bitrate(request.audio_bitrate.as_deref()).into(),
    ]);
    args.extend(["-movflags".into(), "+faststart".into()]);
    args.push(output_path.as_os_str().to_os_string());

    Ok(ResolvedPlan {
        args,
        encoder,
        hardware,
        output_path,
    })
}

fn software_encoder(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::H265 => "libx265",
    }
}

/// Hardware counterpart if requested and present, else the software encoder.
pub fn select_encoder(request: &CompressionRequest, caps: &EncoderCapabilities) -> String {
    let software = software_encoder(request.video_encoder);
    let platform = request.gpu_type;
    if platform == GpuPlatform::None {
        return software.to_string();
    }

    match caps.hardware_encoder(platform, request.video_encoder) {
        Some(hw) => hw.to_string(),
        None => {
            warn!(
                platform = %platform,
                codec = %request.video_encoder,
                fallback = software,
                "hardware encoder unavailable, using software encoder"
            );
            software.to_string()
        }
    }
}

fn hardware_preset(requested: &str) -> &str {
    if HW_PRESETS.iter().any(|p| *p == requested) {
        requested
    } else {
        if !requested.is_empty() {
            warn!(preset = requested, "preset not supported by hardware encoder, using default");
        }
        "default"
    }
}

fn hardware_rate_args(request: &CompressionRequest) -> Vec<String> {
    match request.method {
        RateControl::Crf => vec!["-cq".into(), request.crf().to_string()],
        RateControl::Bitrate => {
            let (maxrate, bufsize) = vbv_limits(request.bitrate_kbps());
            vec![
                "-b:v".into(),
                format!("{}k", request.bitrate_kbps()),
                "-maxrate".into(),
                format!("{maxrate}k"),
                "-bufsize".into(),
                format!("{bufsize}k"),
            ]
        }
    }
}

fn software_rate_args(request: &CompressionRequest) -> Vec<String> {
    match request.method {
        RateControl::Crf => vec!["-crf".into(), request.crf().to_string()],
        RateControl::Bitrate => vec!["-b:v".into(), format!("{}k", request.bitrate_kbps())],
    }
}

/// `(floor(bitrate * 1.1), bitrate * 2)` in kbps.
pub fn vbv_limits(bitrate_kbps: u32) -> (u64, u64) {
    let b = u64::from(bitrate_kbps);
    (b * 11 / 10, b * 2)
}

fn scale_filter(resolution: Option<&str>) -> Option<String> {
    let res = resolution?;
    if res.eq_ignore_ascii_case("source") {
        return None;
    }
    let parsed = res
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)))
        .filter(|(w, h)| *w > 0 && *h > 0);
    match parsed {
        Some((w, h)) => Some(format!("scale={w}x{h}")),
        None => {
            warn!(resolution = res, "unrecognized resolution, keeping source size");
            None
        }
    }
}

fn frame_rate(framerate: Option<&str>) -> Option<String> {
    let fr = framerate?;
    if fr.eq_ignore_ascii_case("source") {
        return None;
    }
    match fr.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Some(fr.to_string()),
        _ => {
            warn!(framerate = fr, "unrecognized frame rate, keeping source rate");
            None
        }
    }
}

fn audio_bitrate(requested: Option<&str>) -> String {
    let Some(value) = requested else {
        return DEFAULT_AUDIO_BITRATE.to_string();
    };
    let digits = value.strip_suffix(['k', 'K']).unwrap_or(value);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        value.to_string()
    } else {
        warn!(audio_bitrate = value, "unrecognized audio bitrate, using {DEFAULT_AUDIO_BITRATE}");
        DEFAULT_AUDIO_BITRATE.to_string()
    }
}
