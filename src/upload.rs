use crate::catalog::Synchronizer;
use crate::encoder::{CompressionTier, VideoEncoder, VideoProbe};
use crate::error::{MediaError, ValidationError};
use crate::github::GithubUploader;
use crate::model::{AssetKind, MediaClass, NewVideoRow};
use crate::paths::{unique_video_name, MediaPaths};
use crate::validate::{UploadedFile, Validator};
use crate::video_index::VideoIndex;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Parsed multipart payload for the advanced upload endpoint
#[derive(Default)]
pub struct UploadRequest {
    pub csrf_token: String,
    pub title: Option<String>,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub tier: CompressionTier,
    pub github_integration: bool,
    pub video: Option<UploadedFile>,
    pub thumbnail: Option<UploadedFile>,
}

/// Container metadata block in the upload response
#[derive(Debug, Serialize)]
pub struct VideoInfoBody {
    pub duration: i64,
    pub resolution: String,
    pub file_size: i64,
    pub bitrate: i64,
}

/// Success payload for the advanced upload endpoint
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub video_id: i64,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub video_info: VideoInfoBody,
    pub preview_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
}

/// The richly-tracked video ingestion flow
///
/// Admits the files, encodes the video into place, stores the manual
/// thumbnail, pushes the optional remote copy, indexes the row,
/// appends the action log and re-projects the catalog. Token checks
/// happen at the HTTP boundary before this runs.
pub struct UploadPipeline {
    validator: Validator,
    encoder: Arc<dyn VideoEncoder>,
    probe: VideoProbe,
    index: Arc<VideoIndex>,
    synchronizer: Arc<Synchronizer>,
    github: Option<GithubUploader>,
    paths: MediaPaths,
}

impl UploadPipeline {
    pub fn new(
        validator: Validator,
        encoder: Arc<dyn VideoEncoder>,
        probe: VideoProbe,
        index: Arc<VideoIndex>,
        synchronizer: Arc<Synchronizer>,
        github: Option<GithubUploader>,
        paths: MediaPaths,
    ) -> Self {
        Self {
            validator,
            encoder,
            probe,
            index,
            synchronizer,
            github,
            paths,
        }
    }

    /// Run the full ingestion flow for one token-checked request
    #[instrument(skip(self, request), fields(ip = %upload_ip, tier = request.tier.as_str()))]
    pub async fn process(
        &self,
        upload_ip: &str,
        request: UploadRequest,
    ) -> Result<UploadResponse, MediaError> {
        let video = request
            .video
            .ok_or(ValidationError::MissingField("video"))?;
        let checked_video = self.validator.admit(&video, MediaClass::Video)?;

        // Admit every file up front so a rejection leaves nothing behind
        let checked_thumb = match &request.thumbnail {
            Some(thumb) => Some(self.validator.admit(thumb, MediaClass::Image)?),
            None => None,
        };

        let filename = unique_video_name(&checked_video.extension);
        let staging = self
            .paths
            .primary_dir(AssetKind::Video)
            .join(format!(".incoming-{filename}"));
        let dest = self.paths.primary_path(AssetKind::Video, &filename);

        tokio::fs::write(&staging, &video.bytes)
            .await
            .with_context(|| format!("Failed to stage {}", staging.display()))
            .map_err(MediaError::from)?;

        let encode_result = self.encoder.encode(&staging, &dest, request.tier).await;
        remove_quietly(&staging).await;
        let outcome = match encode_result {
            Ok(outcome) => outcome,
            Err(err) => {
                remove_quietly(&dest).await;
                return Err(err.into());
            }
        };

        let thumbnail_public = match (&request.thumbnail, checked_thumb) {
            (Some(thumb), Some(checked)) => {
                Some(self.place_thumbnail(&filename, thumb, &checked.extension).await?)
            }
            _ => None,
        };

        let stored = tokio::fs::metadata(&dest)
            .await
            .with_context(|| format!("Failed to stat {}", dest.display()))
            .map_err(MediaError::from)?;
        let info = self.probe.probe(&dest).await;

        // The remote push happens before indexing so the row carries the URL
        let github_url = match (&self.github, request.github_integration) {
            (Some(github), true) => {
                let repo_path = self.paths.public_primary(AssetKind::Video, &filename);
                let bytes = tokio::fs::read(&dest)
                    .await
                    .with_context(|| format!("Failed to read {}", dest.display()))
                    .map_err(MediaError::from)?;
                match github.push(&repo_path, &bytes).await {
                    Ok(url) => Some(url),
                    Err(err) => {
                        warn!(error = ?err, "github push failed, continuing without it");
                        None
                    }
                }
            }
            _ => None,
        };

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| title_from_name(&video.original_name));
        let category = if request.category.trim().is_empty() {
            "general".to_string()
        } else {
            request.category.clone()
        };

        let row = NewVideoRow {
            filename: filename.clone(),
            original_name: video.original_name.clone(),
            title,
            description: request.description.clone(),
            category,
            tags: request.tags.clone(),
            file_size: stored.len() as i64,
            duration: info.duration_secs,
            resolution: info.resolution.clone().unwrap_or_default(),
            upload_ip: upload_ip.to_string(),
            thumbnail_path: thumbnail_public.clone(),
            github_url: github_url.clone(),
        };
        let indexed = self.index.insert_video(&row).await?;

        let details = format!(
            "stored {} ({} bytes, tier {}, encoded: {})",
            filename,
            stored.len(),
            request.tier.as_str(),
            outcome.encoded
        );
        self.index.log_action(indexed.id, "upload", &details).await?;

        self.synchronizer.sync().await?;

        info!(video_id = indexed.id, filename = %filename, "video upload complete");
        metrics::counter!("media.videos.uploaded").increment(1);

        Ok(UploadResponse {
            success: true,
            message: "Video uploaded successfully".to_string(),
            video_id: indexed.id,
            filename,
            thumbnail: thumbnail_public,
            video_info: VideoInfoBody {
                duration: info.duration_secs,
                resolution: info.resolution.unwrap_or_else(|| "Unknown".to_string()),
                file_size: stored.len() as i64,
                bitrate: info.bitrate.unwrap_or(0),
            },
            preview_url: self.paths.public_primary(AssetKind::Video, &indexed.filename),
            github_url,
        })
    }

    /// Store a manually supplied thumbnail next to the video derivatives
    async fn place_thumbnail(
        &self,
        video_file: &str,
        thumb: &UploadedFile,
        ext: &str,
    ) -> Result<String, MediaError> {
        let stem = Path::new(video_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(video_file);
        let thumb_name = format!("{stem}.{ext}");

        match (
            self.paths.thumb_path(AssetKind::Video, &thumb_name),
            self.paths.public_thumb(AssetKind::Video, &thumb_name),
        ) {
            (Some(disk), Some(public)) => {
                tokio::fs::write(&disk, &thumb.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", disk.display()))
                    .map_err(MediaError::from)?;
                debug!(path = %disk.display(), "thumbnail stored");
                Ok(public)
            }
            _ => Err(anyhow::anyhow!("video thumbnails are not configured").into()),
        }
    }
}

/// Fallback title derived from the uploaded file name
fn title_from_name(original_name: &str) -> String {
    Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}

/// Best-effort removal of a work file
async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, path = %path.display(), "could not remove work file");
        }
    }
}
