use serde::{Deserialize, Deserializer, Serialize};

/// Preferred hardware platform for video encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuPlatform {
    #[default]
    None,
    Nvidia,
    Amd,
}

impl GpuPlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Nvidia => "nvidia",
            Self::Amd => "amd",
        }
    }
}

impl std::fmt::Display for GpuPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical video codec, independent of the hardware backend that encodes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    #[default]
    #[serde(rename = "h264", alias = "libx264", alias = "x264", alias = "H264")]
    H264,
    #[serde(
        rename = "h265",
        alias = "hevc",
        alias = "libx265",
        alias = "x265",
        alias = "H265",
        alias = "HEVC"
    )]
    H265,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-control method. Exactly one of the CRF or bitrate settings applies.
///
/// Parsed case-insensitively; serialized as `CRF` / `bitrate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RateControl {
    #[default]
    #[serde(rename = "CRF")]
    Crf,
    #[serde(rename = "bitrate")]
    Bitrate,
}

impl RateControl {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crf => "CRF",
            Self::Bitrate => "bitrate",
        }
    }
}

impl std::fmt::Display for RateControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RateControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("crf") {
            Ok(Self::Crf)
        } else if s.eq_ignore_ascii_case("bitrate") {
            Ok(Self::Bitrate)
        } else {
            Err(format!("unknown rate control method: {s}"))
        }
    }
}

impl<'de> Deserialize<'de> for RateControl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// State of an active compression job. A job leaves the table when it
/// finishes; its outcome is reported as an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Reserved; probing and planning, no process yet.
    Planning,
    Running,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Running => "running",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_accepts_software_encoder_names() {
        let c: VideoCodec = serde_json::from_str("\"libx265\"").unwrap();
        assert_eq!(c, VideoCodec::H265);
        let c: VideoCodec = serde_json::from_str("\"libx264\"").unwrap();
        assert_eq!(c, VideoCodec::H264);
        let c: VideoCodec = serde_json::from_str("\"hevc\"").unwrap();
        assert_eq!(c, VideoCodec::H265);
        assert!(serde_json::from_str::<VideoCodec>("\"prores\"").is_err());
    }

    #[test]
    fn rate_control_round_trips_wire_names() {
        let m: RateControl = serde_json::from_str("\"CRF\"").unwrap();
        assert_eq!(m, RateControl::Crf);
        let m: RateControl = serde_json::from_str("\"bitrate\"").unwrap();
        assert_eq!(m, RateControl::Bitrate);
        assert_eq!(serde_json::to_string(&RateControl::Crf).unwrap(), "\"CRF\"");
    }

    #[test]
    fn rate_control_ignores_case() {
        for raw in ["\"cRf\"", "\"crf\"", "\" CRF \""] {
            let m: RateControl = serde_json::from_str(raw).unwrap();
            assert_eq!(m, RateControl::Crf, "{raw}");
        }
        let m: RateControl = serde_json::from_str("\"BitRate\"").unwrap();
        assert_eq!(m, RateControl::Bitrate);
        assert!(serde_json::from_str::<RateControl>("\"vbr\"").is_err());
        assert!(serde_json::from_str::<RateControl>("3").is_err());
    }

    #[test]
    fn gpu_platform_defaults_to_none() {
        assert_eq!(GpuPlatform::default(), GpuPlatform::None);
        let g: GpuPlatform = serde_json::from_str("\"nvidia\"").unwrap();
        assert_eq!(g.to_string(), "nvidia");
    }

    #[test]
    fn job_state_wire_names() {
        assert_eq!(serde_json::to_string(&JobState::Planning).unwrap(), "\"planning\"");
        assert_eq!(JobState::Running.to_string(), "running");
    }
}
