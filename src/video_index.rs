use crate::config::StorageConfig;
use crate::model::{NewVideoRow, VideoRow};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, instrument};

/// One append-only action-log entry
#[derive(Debug, Clone, FromRow)]
pub struct ActionLogEntry {
    pub id: i64,
    /// Row the action applied to
    pub video_id: i64,
    /// Action name, e.g. "upload"
    pub action: String,
    /// Free-form context string
    pub details: String,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
}

/// Relational index of richly-tracked video uploads in SQLite
pub struct VideoIndex {
    pool: SqlitePool,
}

impl VideoIndex {
    /// Open the database, creating file and schema when missing
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to open the video index database")?;

        info!(path = %config.database_path, "Connected to SQLite database");

        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                original_name TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT 'general',
                tags TEXT NOT NULL DEFAULT '',
                file_size INTEGER NOT NULL DEFAULT 0,
                duration INTEGER NOT NULL DEFAULT 0,
                resolution TEXT NOT NULL DEFAULT '',
                upload_date TEXT NOT NULL,
                upload_ip TEXT NOT NULL DEFAULT '',
                thumbnail_path TEXT NOT NULL DEFAULT '',
                github_url TEXT,
                is_featured INTEGER NOT NULL DEFAULT 0,
                views INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create the videos table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                video_id INTEGER NOT NULL REFERENCES videos(id),
                action TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create the upload_logs table")?;

        Ok(())
    }

    /// Insert a new upload row and return it with its assigned id
    #[instrument(skip(self, row), fields(filename = %row.filename, title = %row.title))]
    pub async fn insert_video(&self, row: &NewVideoRow) -> Result<VideoRow> {
        let result = sqlx::query(
            r#"
            INSERT INTO videos (
                filename, original_name, title, description, category,
                tags, file_size, duration, resolution, upload_date,
                upload_ip, thumbnail_path, github_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.filename)
        .bind(&row.original_name)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.category)
        .bind(row.tags.join(", "))
        .bind(row.file_size)
        .bind(row.duration)
        .bind(&row.resolution)
        .bind(Utc::now())
        .bind(&row.upload_ip)
        .bind(row.thumbnail_path.clone().unwrap_or_default())
        .bind(&row.github_url)
        .execute(&self.pool)
        .await
        .context("Failed to insert video row")?;

        let id = result.last_insert_rowid();

        debug!(video_id = id, "Video indexed");
        metrics::counter!("media.videos.indexed").increment(1);

        self.get_video(id)
            .await?
            .context("Inserted video row is missing")
    }

    /// Fetch one row by id
    pub async fn get_video(&self, id: i64) -> Result<Option<VideoRow>> {
        let row = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, filename, original_name, title, description, category,
                   tags, file_size, duration, resolution, upload_date,
                   upload_ip, thumbnail_path, github_url, is_featured, views
            FROM videos
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query video row")?;

        Ok(row)
    }

    /// All rows, newest first, for the catalog projection
    pub async fn list_videos(&self) -> Result<Vec<VideoRow>> {
        let rows = sqlx::query_as::<_, VideoRow>(
            r#"
            SELECT id, filename, original_name, title, description, category,
                   tags, file_size, duration, resolution, upload_date,
                   upload_ip, thumbnail_path, github_url, is_featured, views
            FROM videos
            ORDER BY upload_date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list video rows")?;

        Ok(rows)
    }

    /// Append one action-log entry for a video
    pub async fn log_action(&self, video_id: i64, action: &str, details: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO upload_logs (video_id, action, details, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(video_id)
        .bind(action)
        .bind(details)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to append the action log")?;

        Ok(())
    }

    /// Action-log entries for one video, oldest first
    pub async fn video_log(&self, video_id: i64) -> Result<Vec<ActionLogEntry>> {
        let entries = sqlx::query_as::<_, ActionLogEntry>(
            r#"
            SELECT id, video_id, action, details, timestamp
            FROM upload_logs
            WHERE video_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query the action log")?;

        Ok(entries)
    }

    /// Connection pool handle for readiness checks
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    async fn test_index() -> (VideoIndex, TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("test.db").to_string_lossy().into_owned(),
            max_connections: 1,
            ..Default::default()
        };
        (VideoIndex::open(&config).await.unwrap(), dir)
    }

    fn sample_row(title: &str, filename: &str) -> NewVideoRow {
        NewVideoRow {
            filename: filename.to_string(),
            original_name: "clip.mp4".to_string(),
            title: title.to_string(),
            description: "a test clip".to_string(),
            category: "general".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            file_size: 1234,
            duration: 65,
            resolution: "1920x1080".to_string(),
            upload_ip: "127.0.0.1".to_string(),
            thumbnail_path: None,
            github_url: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_roundtrip() {
        let (index, _dir) = test_index().await;

        let row = index
            .insert_video(&sample_row("First", "video_1.mp4"))
            .await
            .unwrap();

        assert_eq!(row.id, 1);
        assert_eq!(row.filename, "video_1.mp4");
        assert_eq!(row.tags, "a, b");
        assert_eq!(row.views, 0);
        assert!(!row.is_featured);
        assert_eq!(row.thumbnail_path, "");

        let fetched = index.get_video(row.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "First");
        assert!(index.get_video(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let (index, _dir) = test_index().await;
        index.insert_video(&sample_row("First", "video_1.mp4")).await.unwrap();
        index.insert_video(&sample_row("Second", "video_2.mp4")).await.unwrap();

        let rows = index.list_videos().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Second");
        assert_eq!(rows[1].title, "First");
    }

    #[tokio::test]
    async fn test_action_log_appends_in_order() {
        let (index, _dir) = test_index().await;
        let row = index.insert_video(&sample_row("First", "video_1.mp4")).await.unwrap();

        index.log_action(row.id, "upload", "stored as video_1.mp4").await.unwrap();
        index.log_action(row.id, "sync", "projection rewritten").await.unwrap();

        let log = index.video_log(row.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, "upload");
        assert_eq!(log[1].action, "sync");
        assert_eq!(log[0].video_id, row.id);
    }
}
