use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use vidpress_core::types::{GpuPlatform, RateControl, VideoCodec};

pub const DEFAULT_CRF: u32 = 23;
pub const MAX_CRF: u32 = 51;
pub const DEFAULT_BITRATE_KBPS: u32 = 1000;
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Parameters for one compression job, as submitted by the UI shell.
///
/// Numeric fields accept JSON numbers or numeric strings; anything else
/// falls back to the documented default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionRequest {
    pub file_path: PathBuf,
    #[serde(default)]
    pub gpu_type: GpuPlatform,
    #[serde(default, alias = "codec")]
    pub video_encoder: VideoCodec,
    #[serde(default)]
    pub method: RateControl,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub crf: Option<u32>,
    /// Target video bitrate in kbps.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub bitrate: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub preset: Option<String>,
    /// `source` or `WxH`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub resolution: Option<String>,
    /// `source` or a positive number.
    #[serde(default, deserialize_with = "lenient_string")]
    pub framerate: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub audio_bitrate: Option<String>,
}

impl CompressionRequest {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    pub fn crf(&self) -> u32 {
        self.crf.filter(|c| *c <= MAX_CRF).unwrap_or(DEFAULT_CRF)
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate.filter(|b| *b > 0).unwrap_or(DEFAULT_BITRATE_KBPS)
    }

    pub fn preset(&self) -> &str {
        self.preset.as_deref().map(str::trim).unwrap_or("")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Num(f64),
    Str(String),
    #[allow(dead_code)]
    Other(serde::de::IgnoredAny),
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Num(n)) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => {
            Some(n as u32)
        }
        Some(Loose::Str(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Num(n)) if n.is_finite() => Some(n.to_string()),
        Some(Loose::Str(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}
