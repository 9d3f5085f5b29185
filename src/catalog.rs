use crate::collections::CollectionStore;
use crate::model::{normalize_tags, AssetKind, CatalogEntry, VideoRow};
use crate::paths::MediaPaths;
use crate::video_index::VideoIndex;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One-directional projection of the relational rows into the videos
/// collection document
///
/// The relational index stays the source of truth; the document is a
/// derived view in the shape the front end reads. Re-running the
/// projection on unchanged rows produces byte-identical output and
/// skips the write.
pub struct Synchronizer {
    index: Arc<VideoIndex>,
    collections: Arc<CollectionStore>,
    paths: MediaPaths,
}

impl Synchronizer {
    pub fn new(index: Arc<VideoIndex>, collections: Arc<CollectionStore>, paths: MediaPaths) -> Self {
        Self {
            index,
            collections,
            paths,
        }
    }

    /// Rebuild the projected videos document from the relational rows
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<usize> {
        let rows = self.index.list_videos().await?;
        let entries: Vec<CatalogEntry> =
            rows.iter().map(|row| project_row(row, &self.paths)).collect();

        let next = serde_json::to_string_pretty(&entries)
            .context("Failed to serialize the video catalog")?;
        let current = self.collections.read_raw(AssetKind::Video).await?;
        if current.as_deref() == Some(next.as_bytes()) {
            debug!(rows = entries.len(), "catalog already in sync");
            return Ok(entries.len());
        }

        self.collections.write_document(AssetKind::Video, &entries).await?;
        info!(rows = entries.len(), "catalog projection rewritten");
        metrics::counter!("media.catalog.synced").increment(1);
        Ok(entries.len())
    }

    /// Project all rows without touching disk
    pub async fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let rows = self.index.list_videos().await?;
        Ok(rows.iter().map(|row| project_row(row, &self.paths)).collect())
    }
}

/// Shape one relational row the way the front end reads it
fn project_row(row: &VideoRow, paths: &MediaPaths) -> CatalogEntry {
    CatalogEntry {
        id: row.id,
        title: row.title.clone(),
        description: row.description.clone(),
        category: row.category.clone(),
        src: paths.public_primary(AssetKind::Video, &row.filename),
        thumbnail: row.thumbnail_path.clone(),
        duration: format_duration(row.duration),
        size: format_bytes(row.file_size),
        tags: normalize_tags(&row.tags),
        date: row.upload_date.format("%Y-%m-%d").to_string(),
        views: row.views,
        featured: row.is_featured,
    }
}

/// Byte count as a short human-readable string
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", value as i64, UNITS[0])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Seconds as a zero-padded clock string
pub fn format_duration(total_secs: i64) -> String {
    let total = total_secs.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::model::NewVideoRow;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(65), "00:01:05");
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_duration(-5), "00:00:00");
    }

    #[test]
    fn test_row_projection() {
        let row = VideoRow {
            id: 7,
            filename: "video_1700000000_0a1b2c3d.mp4".to_string(),
            original_name: "holiday.mp4".to_string(),
            title: "Holiday".to_string(),
            description: "clips".to_string(),
            category: "travel".to_string(),
            tags: "sea, sun".to_string(),
            file_size: 1536,
            duration: 65,
            resolution: "1920x1080".to_string(),
            upload_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            upload_ip: "127.0.0.1".to_string(),
            thumbnail_path: "assets/videos/thumbnails/video_1700000000_0a1b2c3d.jpg".to_string(),
            github_url: None,
            is_featured: true,
            views: 3,
        };

        let entry = project_row(&row, &MediaPaths::new("assets"));
        assert_eq!(entry.id, 7);
        assert_eq!(entry.src, "assets/videos/video_1700000000_0a1b2c3d.mp4");
        assert_eq!(entry.duration, "00:01:05");
        assert_eq!(entry.size, "1.50 KB");
        assert_eq!(entry.tags, vec!["sea", "sun"]);
        assert_eq!(entry.date, "2024-05-01");
        assert!(entry.featured);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("sync.db").to_string_lossy().into_owned(),
            max_connections: 1,
            ..Default::default()
        };
        let index = Arc::new(VideoIndex::open(&config).await.unwrap());
        let collections = Arc::new(CollectionStore::new(dir.path().join("data")));
        collections.ensure_data_dir().await.unwrap();

        index
            .insert_video(&NewVideoRow {
                filename: "video_1.mp4".to_string(),
                original_name: "a.mp4".to_string(),
                title: "A".to_string(),
                description: String::new(),
                category: "general".to_string(),
                tags: vec!["x".to_string()],
                file_size: 2048,
                duration: 10,
                resolution: String::new(),
                upload_ip: "127.0.0.1".to_string(),
                thumbnail_path: None,
                github_url: None,
            })
            .await
            .unwrap();

        let sync = Synchronizer::new(index, collections.clone(), MediaPaths::new("assets"));

        let count = sync.sync().await.unwrap();
        assert_eq!(count, 1);
        let first = collections.read_raw(AssetKind::Video).await.unwrap().unwrap();

        sync.sync().await.unwrap();
        let second = collections.read_raw(AssetKind::Video).await.unwrap().unwrap();

        assert_eq!(first, second);
        let entries: Vec<CatalogEntry> = serde_json::from_slice(&second).unwrap();
        assert_eq!(entries[0].size, "2.00 KB");
        assert_eq!(entries[0].src, "assets/videos/video_1.mp4");
    }
}
