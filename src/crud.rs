use crate::collections::CollectionStore;
use crate::error::{MediaError, ValidationError};
use crate::model::{AssetKind, AssetPatch, AssetRecord};
use crate::paths::{asset_file_name, is_safe_id, new_record_id, MediaPaths};
use crate::thumbnail::{self, Thumbnailer};
use crate::validate::{UploadedFile, Validator};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Create, merge-update and delete against the flat collections
///
/// Saving with a known id is a shallow merge: supplied fields
/// overwrite, omitted fields survive, and a newly uploaded file
/// replaces the previous one only after the new file is durably on
/// disk. Deleting releases the record's files first and treats an
/// unknown id as an idempotent no-op.
pub struct MediaCrud {
    validator: Validator,
    thumbnailer: Thumbnailer,
    collections: Arc<CollectionStore>,
    paths: MediaPaths,
}

impl MediaCrud {
    pub fn new(
        validator: Validator,
        thumbnailer: Thumbnailer,
        collections: Arc<CollectionStore>,
        paths: MediaPaths,
    ) -> Self {
        Self {
            validator,
            thumbnailer,
            collections,
            paths,
        }
    }

    /// Full collection for one kind
    pub async fn list(&self, kind: AssetKind) -> Result<Vec<AssetRecord>, MediaError> {
        Ok(self.collections.load(kind).await?)
    }

    /// Create or merge-update one record, returning its id
    #[instrument(skip(self, patch, file), fields(kind = kind.as_str()))]
    pub async fn save(
        &self,
        kind: AssetKind,
        patch: AssetPatch,
        file: Option<UploadedFile>,
    ) -> Result<String, MediaError> {
        let existing = match &patch.id {
            Some(id) => {
                if !is_safe_id(id) {
                    return Err(ValidationError::InvalidValue {
                        field: "id",
                        reason: "only letters, digits, '-' and '_' are allowed".to_string(),
                    }
                    .into());
                }
                self.collections.get(kind, id).await?
            }
            None => None,
        };

        let mut record = match existing {
            Some(record) => record,
            None => {
                let title = patch
                    .title
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(ValidationError::MissingField("title"))?;
                if file.is_none() && kind.file_required_on_create() {
                    return Err(ValidationError::FileRequired(kind.as_str()).into());
                }
                let id = match &patch.id {
                    Some(id) => id.clone(),
                    None => new_record_id(&title),
                };
                AssetRecord::new(&id, title)
            }
        };

        patch.apply(&mut record);
        record.updated_at = Some(Utc::now());

        if let Some(upload) = file {
            self.place_file(kind, &mut record, upload).await?;
        }

        self.collections.upsert(kind, record.clone()).await?;
        debug!(id = %record.id, "record saved");
        metrics::counter!("media.records.saved", "kind" => kind.as_str()).increment(1);
        Ok(record.id)
    }

    /// Delete one record and its owned files; unknown id is a no-op
    #[instrument(skip(self), fields(kind = kind.as_str(), id = %id))]
    pub async fn delete(&self, kind: AssetKind, id: &str) -> Result<bool, MediaError> {
        let Some(record) = self.collections.get(kind, id).await? else {
            debug!("delete of unknown id, nothing to do");
            return Ok(false);
        };

        // Owned files go first, the record second
        if let Some(src) = &record.src {
            self.remove_public(src).await;
        }
        if let Some(thumb) = &record.thumbnail {
            self.remove_public(thumb).await;
        }
        self.collections.remove(kind, id).await?;

        metrics::counter!("media.records.deleted", "kind" => kind.as_str()).increment(1);
        Ok(true)
    }

    /// Admit the upload, write it, derive per-kind artifacts, then drop
    /// whatever files it displaced
    async fn place_file(
        &self,
        kind: AssetKind,
        record: &mut AssetRecord,
        upload: UploadedFile,
    ) -> Result<(), MediaError> {
        let checked = self.validator.admit(&upload, kind.media_class())?;

        let file_name = asset_file_name(&record.id, &checked.extension);
        let primary = self.paths.primary_path(kind, &file_name);
        tokio::fs::write(&primary, &upload.bytes)
            .await
            .with_context(|| format!("Failed to write {}", primary.display()))
            .map_err(MediaError::from)?;

        let old_src = record
            .src
            .replace(self.paths.public_primary(kind, &file_name));

        let mut old_thumb = None;
        match kind {
            AssetKind::Photo => {
                let (w, h) = thumbnail::image_dimensions(&primary).await?;
                record.dimensions = Some(format!("{w}x{h}"));
                if let (Some(thumb_disk), Some(thumb_public)) = (
                    self.paths.thumb_path(kind, &file_name),
                    self.paths.public_thumb(kind, &file_name),
                ) {
                    self.thumbnailer.derive_photo_thumb(&primary, &thumb_disk).await?;
                    old_thumb = record.thumbnail.replace(thumb_public);
                }
            }
            AssetKind::Blog => {
                self.thumbnailer.bound_blog_image(&primary).await?;
            }
            AssetKind::Video => {}
        }

        // New files are durably placed; displaced ones can go
        if let Some(old) = old_src {
            if record.src.as_deref() != Some(old.as_str()) {
                self.remove_public(&old).await;
            }
        }
        if let Some(old) = old_thumb {
            if record.thumbnail.as_deref() != Some(old.as_str()) {
                self.remove_public(&old).await;
            }
        }
        Ok(())
    }

    /// Best-effort removal of a stored file by its public path
    async fn remove_public(&self, public: &str) {
        let Some(path) = self.paths.resolve_public(public) else {
            warn!(path = %public, "refusing to remove a path outside the asset tree");
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "removed file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %path.display(), "could not remove file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsConfig, MediaConfig};
    use std::io::Cursor;
    use tempfile::{tempdir, TempDir};

    async fn test_crud() -> (MediaCrud, MediaPaths, TempDir) {
        let dir = tempdir().unwrap();
        let paths = MediaPaths::new(dir.path().join("assets"));
        paths.ensure_directories().await.unwrap();
        let collections = Arc::new(CollectionStore::new(dir.path().join("data")));
        collections.ensure_data_dir().await.unwrap();
        let crud = MediaCrud::new(
            Validator::new(LimitsConfig::default()),
            Thumbnailer::new(MediaConfig::default()),
            collections,
            paths.clone(),
        );
        (crud, paths, dir)
    }

    fn png_upload(name: &str, w: u32, h: u32) -> UploadedFile {
        let mut buf = Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(w, h, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        UploadedFile::complete(name, buf.into_inner())
    }

    #[tokio::test]
    async fn test_photo_create_requires_file() {
        let (crud, _paths, _dir) = test_crud().await;
        let patch = AssetPatch {
            title: Some("Sunset".to_string()),
            ..Default::default()
        };
        let err = crud.save(AssetKind::Photo, patch, None).await.unwrap_err();
        assert!(matches!(
            err,
            MediaError::Validation(ValidationError::FileRequired("photo"))
        ));
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let (crud, _paths, _dir) = test_crud().await;
        let err = crud
            .save(AssetKind::Blog, AssetPatch::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::Validation(ValidationError::MissingField("title"))
        ));
    }

    #[tokio::test]
    async fn test_traversal_id_rejected() {
        let (crud, _paths, _dir) = test_crud().await;
        let patch = AssetPatch {
            id: Some("../../etc/passwd".to_string()),
            title: Some("X".to_string()),
            ..Default::default()
        };
        let err = crud.save(AssetKind::Blog, patch, None).await.unwrap_err();
        assert!(matches!(
            err,
            MediaError::Validation(ValidationError::InvalidValue { field: "id", .. })
        ));
    }

    #[tokio::test]
    async fn test_blog_create_without_file() {
        let (crud, _paths, _dir) = test_crud().await;
        let patch = AssetPatch {
            title: Some("Field notes".to_string()),
            excerpt: Some("a few words".to_string()),
            ..Default::default()
        };
        let id = crud.save(AssetKind::Blog, patch, None).await.unwrap();
        assert!(id.starts_with("field-notes-"));

        let records = crud.list(AssetKind::Blog).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].excerpt.as_deref(), Some("a few words"));
        assert!(records[0].src.is_none());
    }

    #[tokio::test]
    async fn test_photo_create_places_file_and_thumb() {
        let (crud, paths, _dir) = test_crud().await;
        let patch = AssetPatch {
            title: Some("Sunset".to_string()),
            ..Default::default()
        };
        let id = crud
            .save(AssetKind::Photo, patch, Some(png_upload("sunset.png", 600, 400)))
            .await
            .unwrap();

        let record = crud
            .list(AssetKind::Photo)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.id == id)
            .unwrap();

        assert_eq!(record.dimensions.as_deref(), Some("600x400"));
        let src = record.src.unwrap();
        let thumb = record.thumbnail.unwrap();
        assert!(paths.resolve_public(&src).unwrap().exists());
        assert!(paths.resolve_public(&thumb).unwrap().exists());
    }
}
