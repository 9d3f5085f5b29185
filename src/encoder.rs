use crate::config::EncoderConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Requested compression strength for an uploaded video
///
/// Stronger compression trades visual quality for size. The encoder
/// maps each tier to an x264 constant-rate factor and preset;
/// `original` skips transcoding entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionTier {
    Original,
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionTier {
    /// Parse a client-supplied tier name
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "original" => Some(Self::Original),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// CRF and preset handed to x264, None when no transcoding is wanted
    fn x264_settings(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Original => None,
            Self::Low => Some(("28", "faster")),
            Self::Medium => Some(("23", "medium")),
            Self::High => Some(("18", "slow")),
        }
    }
}

/// What the encoder actually did with the file
#[derive(Debug, Clone, Copy)]
pub struct EncodeOutcome {
    /// False when the file was passed through as a verbatim copy
    pub encoded: bool,
}

/// Transcoding backend for the advanced upload flow
///
/// An encode call must always leave a playable file at `dest`; when
/// real transcoding is impossible the implementation falls back to a
/// verbatim copy rather than failing the upload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Backend name for logs and health reporting
    fn name(&self) -> &'static str;

    /// Whether real transcoding is available
    fn available(&self) -> bool;

    /// Location of the underlying binary, when there is one
    fn binary_path<'a>(&'a self) -> Option<&'a Path> {
        None
    }

    async fn encode(&self, source: &Path, dest: &Path, tier: CompressionTier) -> Result<EncodeOutcome>;
}

/// H.264 transcoding through a discovered ffmpeg binary
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    /// Try each candidate path until one responds to `-version`
    pub async fn probe(candidates: &[String]) -> Option<Self> {
        for candidate in candidates {
            let responds = Command::new(candidate)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or(false);
            if responds {
                info!(binary = %candidate, "ffmpeg found");
                return Some(Self {
                    binary: PathBuf::from(candidate),
                });
            }
        }
        None
    }

    async fn run_ffmpeg(&self, source: &Path, dest: &Path, crf: &str, preset: &str) -> Result<()> {
        let status = Command::new(&self.binary)
            .arg("-i")
            .arg(source)
            .args(["-vcodec", "libx264", "-crf", crf])
            .args(["-preset", preset])
            .args(["-acodec", "aac"])
            .args(["-movflags", "+faststart", "-y"])
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to launch ffmpeg")?;
        anyhow::ensure!(status.success(), "ffmpeg exited with {status}");

        let written = tokio::fs::metadata(dest)
            .await
            .context("Encoded file missing after ffmpeg run")?;
        anyhow::ensure!(written.len() > 0, "ffmpeg produced an empty file");
        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn available(&self) -> bool {
        true
    }

    fn binary_path(&self) -> Option<&Path> {
        Some(&self.binary)
    }

    async fn encode(&self, source: &Path, dest: &Path, tier: CompressionTier) -> Result<EncodeOutcome> {
        let Some((crf, preset)) = tier.x264_settings() else {
            tokio::fs::copy(source, dest)
                .await
                .context("Failed to copy video into place")?;
            metrics::counter!("media.videos.encoded", "result" => "original").increment(1);
            return Ok(EncodeOutcome { encoded: false });
        };

        match self.run_ffmpeg(source, dest, crf, preset).await {
            Ok(()) => {
                debug!(
                    source = %source.display(),
                    dest = %dest.display(),
                    tier = tier.as_str(),
                    "video encoded"
                );
                metrics::counter!("media.videos.encoded", "result" => "encoded").increment(1);
                Ok(EncodeOutcome { encoded: true })
            }
            Err(err) => {
                // A failed encode must not lose the upload
                warn!(error = ?err, source = %source.display(), "encode failed, storing verbatim copy");
                metrics::counter!("media.videos.encoded", "result" => "fallback").increment(1);
                tokio::fs::copy(source, dest)
                    .await
                    .context("Failed to copy video after encode failure")?;
                Ok(EncodeOutcome { encoded: false })
            }
        }
    }
}

/// Pass-through backend used when no ffmpeg binary was found
pub struct IdentityEncoder;

#[async_trait]
impl VideoEncoder for IdentityEncoder {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn available(&self) -> bool {
        false
    }

    async fn encode(&self, source: &Path, dest: &Path, _tier: CompressionTier) -> Result<EncodeOutcome> {
        tokio::fs::copy(source, dest)
            .await
            .context("Failed to copy video into place")?;
        metrics::counter!("media.videos.encoded", "result" => "identity").increment(1);
        Ok(EncodeOutcome { encoded: false })
    }
}

/// Pick the transcoding backend once, at startup
pub async fn select_encoder(config: &EncoderConfig) -> Arc<dyn VideoEncoder> {
    match FfmpegEncoder::probe(&config.candidates).await {
        Some(encoder) => Arc::new(encoder),
        None => {
            warn!("no ffmpeg binary found, videos will be stored as uploaded");
            Arc::new(IdentityEncoder)
        }
    }
}

/// Container metadata extracted from a stored video
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoInfo {
    /// Playback length in whole seconds
    pub duration_secs: i64,
    /// Frame size as "WIDTHxHEIGHT"
    pub resolution: Option<String>,
    /// Container bitrate in bits per second
    pub bitrate: Option<i64>,
}

/// Best-effort metadata extraction through ffprobe
///
/// Probing is optional: without a binary, or on any probe failure,
/// the caller gets zeroed metadata and the upload proceeds.
pub struct VideoProbe {
    binary: Option<PathBuf>,
}

impl VideoProbe {
    /// Derive the ffprobe location from the discovered ffmpeg binary
    pub fn sibling_of(ffmpeg: Option<&Path>) -> Self {
        let binary = ffmpeg.map(|path| path.with_file_name("ffprobe"));
        Self { binary }
    }

    pub fn disabled() -> Self {
        Self { binary: None }
    }

    pub async fn probe(&self, path: &Path) -> VideoInfo {
        let Some(binary) = &self.binary else {
            return VideoInfo::default();
        };
        match run_ffprobe(binary, path).await {
            Ok(info) => info,
            Err(err) => {
                debug!(error = ?err, path = %path.display(), "ffprobe failed");
                VideoInfo::default()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

async fn run_ffprobe(binary: &Path, path: &Path) -> Result<VideoInfo> {
    let output = Command::new(binary)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .await
        .context("Failed to launch ffprobe")?;
    anyhow::ensure!(output.status.success(), "ffprobe exited with {}", output.status);

    let parsed: ProbeOutput =
        serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe output")?;

    let mut info = VideoInfo::default();
    if let Some(format) = parsed.format {
        if let Some(duration) = format.duration.and_then(|d| d.parse::<f64>().ok()) {
            info.duration_secs = duration.round() as i64;
        }
        info.bitrate = format.bit_rate.and_then(|b| b.parse::<i64>().ok());
    }
    if let Some(video) = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    {
        if let (Some(w), Some(h)) = (video.width, video.height) {
            info.resolution = Some(format!("{w}x{h}"));
        }
    }
    Ok(info)
}
