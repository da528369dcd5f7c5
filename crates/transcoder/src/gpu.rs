//! Hardware encoder detection.
//!
//! Probes for available encoders by running `ffmpeg -encoders` and scanning the
//! listing for known hardware encoder names.

use std::path::Path;

use serde::Serialize;
use tracing::info;
use vidpress_core::types::{GpuPlatform, VideoCodec};

const NVENC_H264: &str = "h264_nvenc";
const NVENC_HEVC: &str = "hevc_nvenc";
const AMF_H264: &str = "h264_amf";
const AMF_HEVC: &str = "hevc_amf";

/// Name suffixes of hardware-backed encoders.
const HARDWARE_SUFFIXES: &[&str] = &["_nvenc", "_amf"];

/// Hardware encoders available for one platform, per codec family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodecEncoders {
    pub h264: Option<String>,
    pub h265: Option<String>,
}

impl CodecEncoders {
    pub fn get(&self, codec: VideoCodec) -> Option<&str> {
        match codec {
            VideoCodec::H264 => self.h264.as_deref(),
            VideoCodec::H265 => self.h265.as_deref(),
        }
    }
}

/// Detected hardware encoders on this host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncoderCapabilities {
    pub nvidia: CodecEncoders,
    pub amd: CodecEncoders,
}

impl EncoderCapabilities {
    /// Build capabilities from the plain-text `-encoders` listing.
    pub fn from_listing(listing: &str) -> Self {
        let present = |name: &str| listing.contains(name).then(|| name.to_string());
        Self {
            nvidia: CodecEncoders {
                h264: present(NVENC_H264),
                h265: present(NVENC_HEVC),
            },
            amd: CodecEncoders {
                h264: present(AMF_H264),
                h265: present(AMF_HEVC),
            },
        }
    }

    /// Hardware encoder for the platform/codec pair, if this host has one.
    pub fn hardware_encoder(&self, platform: GpuPlatform, codec: VideoCodec) -> Option<&str> {
        match platform {
            GpuPlatform::None => None,
            GpuPlatform::Nvidia => self.nvidia.get(codec),
            GpuPlatform::Amd => self.amd.get(codec),
        }
    }
}

/// Whether an encoder name belongs to a hardware backend.
pub fn is_hardware_encoder(name: &str) -> bool {
    HARDWARE_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Detect available hardware encoders by querying ffmpeg.
///
/// Never fails: if ffmpeg cannot be run, every backend reports unavailable.
pub async fn detect(ffmpeg_path: &Path) -> EncoderCapabilities {
    let listing = match get_encoders(ffmpeg_path).await {
        Ok(s) => s,
        Err(e) => {
            info!(error = %e, "could not query ffmpeg encoders, assuming CPU-only");
            return EncoderCapabilities::default();
        }
    };

    let caps = EncoderCapabilities::from_listing(&listing);
    info!(?caps, "GPU encoder detection complete");
    caps
}

async fn get_encoders(ffmpeg_path: &Path) -> Result<String, String> {
    let output = tokio::process::Command::new(ffmpeg_path)
        .args(["-hide_banner", "-encoders"])
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| format!("spawn ffmpeg: {e}"))?;

    // Some builds print the listing on stderr.
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}
