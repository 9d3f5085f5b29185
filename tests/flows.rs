use folio_media::catalog::Synchronizer;
use folio_media::collections::CollectionStore;
use folio_media::config::{LimitsConfig, MediaConfig, StorageConfig};
use folio_media::crud::MediaCrud;
use folio_media::csrf::CsrfTokens;
use folio_media::encoder::{IdentityEncoder, VideoProbe};
use folio_media::model::{AssetKind, AssetPatch, CatalogEntry};
use folio_media::paths::MediaPaths;
use folio_media::thumbnail::Thumbnailer;
use folio_media::upload::{UploadPipeline, UploadRequest};
use folio_media::validate::{UploadedFile, Validator};
use folio_media::video_index::VideoIndex;
use folio_media::MediaError;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

struct Backend {
    crud: MediaCrud,
    pipeline: UploadPipeline,
    synchronizer: Arc<Synchronizer>,
    collections: Arc<CollectionStore>,
    index: Arc<VideoIndex>,
    paths: MediaPaths,
    _dir: TempDir,
}

async fn backend() -> Backend {
    let dir = tempdir().unwrap();
    let paths = MediaPaths::new(dir.path().join("assets"));
    paths.ensure_directories().await.unwrap();

    let collections = Arc::new(CollectionStore::new(dir.path().join("data")));
    collections.ensure_data_dir().await.unwrap();

    let storage = StorageConfig {
        database_path: dir.path().join("index.db").to_string_lossy().into_owned(),
        max_connections: 1,
        ..Default::default()
    };
    let index = Arc::new(VideoIndex::open(&storage).await.unwrap());
    let synchronizer = Arc::new(Synchronizer::new(
        index.clone(),
        collections.clone(),
        paths.clone(),
    ));

    let crud = MediaCrud::new(
        Validator::new(LimitsConfig::default()),
        Thumbnailer::new(MediaConfig::default()),
        collections.clone(),
        paths.clone(),
    );
    let pipeline = UploadPipeline::new(
        Validator::new(LimitsConfig::default()),
        Arc::new(IdentityEncoder),
        VideoProbe::disabled(),
        index.clone(),
        synchronizer.clone(),
        None,
        paths.clone(),
    );

    Backend {
        crud,
        pipeline,
        synchronizer,
        collections,
        index,
        paths,
        _dir: dir,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([90, 120, 50, 255]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([180, 90, 40]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, image::ImageFormat::Jpeg)
        .unwrap();
    cursor.into_inner()
}

fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x18];
    bytes.extend_from_slice(b"ftypisom");
    bytes.extend_from_slice(&[0x2a; 512]);
    bytes
}

#[tokio::test]
async fn photo_save_creates_record_and_thumbnail() {
    let backend = backend().await;

    let patch = AssetPatch {
        title: Some("Sunset".to_string()),
        ..Default::default()
    };
    let upload = UploadedFile::complete("sunset.png", png_bytes(800, 600));
    let id = backend
        .crud
        .save(AssetKind::Photo, patch, Some(upload))
        .await
        .unwrap();
    assert!(id.starts_with("sunset-"), "slug-timestamp id, got {id}");

    let records = backend.crud.list(AssetKind::Photo).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.title, "Sunset");
    assert!(record.tags.is_empty());
    assert_eq!(
        record.src.as_deref(),
        Some(format!("assets/photos/{id}.png").as_str())
    );
    assert_eq!(record.dimensions.as_deref(), Some("800x600"));

    let primary = backend
        .paths
        .primary_path(AssetKind::Photo, &format!("{id}.png"));
    assert!(primary.exists());

    // Thumbnail scaled into the 400x300 box
    let thumb = backend
        .paths
        .thumb_path(AssetKind::Photo, &format!("{id}.png"))
        .unwrap();
    let (w, h) = image::image_dimensions(&thumb).unwrap();
    assert_eq!((w, h), (400, 300));
}

#[tokio::test]
async fn save_with_known_id_merges_instead_of_replacing() {
    let backend = backend().await;

    let first = AssetPatch {
        title: Some("Field Notes".to_string()),
        description: Some("first draft".to_string()),
        ..Default::default()
    };
    let id = backend
        .crud
        .save(AssetKind::Blog, first, None)
        .await
        .unwrap();

    let second = AssetPatch {
        id: Some(id.clone()),
        category: Some("essays".to_string()),
        ..Default::default()
    };
    let same_id = backend
        .crud
        .save(AssetKind::Blog, second, None)
        .await
        .unwrap();
    assert_eq!(same_id, id);

    let records = backend.crud.list(AssetKind::Blog).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Field Notes");
    assert_eq!(records[0].description.as_deref(), Some("first draft"));
    assert_eq!(records[0].category.as_deref(), Some("essays"));
}

#[tokio::test]
async fn replacing_the_file_drops_the_displaced_one() {
    let backend = backend().await;

    let id = backend
        .crud
        .save(
            AssetKind::Photo,
            AssetPatch {
                title: Some("Harbor".to_string()),
                ..Default::default()
            },
            Some(UploadedFile::complete("harbor.png", png_bytes(640, 480))),
        )
        .await
        .unwrap();

    let old_primary = backend
        .paths
        .primary_path(AssetKind::Photo, &format!("{id}.png"));
    let old_thumb = backend
        .paths
        .thumb_path(AssetKind::Photo, &format!("{id}.png"))
        .unwrap();
    assert!(old_primary.exists() && old_thumb.exists());

    backend
        .crud
        .save(
            AssetKind::Photo,
            AssetPatch {
                id: Some(id.clone()),
                ..Default::default()
            },
            Some(UploadedFile::complete("harbor.jpg", jpeg_bytes(640, 480))),
        )
        .await
        .unwrap();

    assert!(!old_primary.exists(), "displaced primary should be gone");
    assert!(!old_thumb.exists(), "displaced thumbnail should be gone");
    assert!(backend
        .paths
        .primary_path(AssetKind::Photo, &format!("{id}.jpg"))
        .exists());

    let records = backend.crud.list(AssetKind::Photo).await.unwrap();
    assert_eq!(
        records[0].src.as_deref(),
        Some(format!("assets/photos/{id}.jpg").as_str())
    );
}

#[tokio::test]
async fn delete_removes_files_and_tolerates_repeats() {
    let backend = backend().await;

    let id = backend
        .crud
        .save(
            AssetKind::Photo,
            AssetPatch {
                title: Some("Dunes".to_string()),
                ..Default::default()
            },
            Some(UploadedFile::complete("dunes.png", png_bytes(320, 240))),
        )
        .await
        .unwrap();

    let primary = backend
        .paths
        .primary_path(AssetKind::Photo, &format!("{id}.png"));
    let thumb = backend
        .paths
        .thumb_path(AssetKind::Photo, &format!("{id}.png"))
        .unwrap();

    assert!(backend.crud.delete(AssetKind::Photo, &id).await.unwrap());
    assert!(!primary.exists());
    assert!(!thumb.exists());
    assert!(backend.crud.list(AssetKind::Photo).await.unwrap().is_empty());

    // Deleting the same id again is a quiet no-op
    assert!(!backend.crud.delete(AssetKind::Photo, &id).await.unwrap());
}

#[tokio::test]
async fn upload_without_an_encoder_stores_the_exact_bytes() {
    let backend = backend().await;

    let payload = mp4_bytes();
    let request = UploadRequest {
        title: Some("Harbor Timelapse".to_string()),
        tags: vec!["harbor".to_string(), "timelapse".to_string()],
        video: Some(UploadedFile::complete("timelapse.mp4", payload.clone())),
        ..Default::default()
    };

    let response = backend
        .pipeline
        .process("203.0.113.7", request)
        .await
        .unwrap();
    assert!(response.success);
    assert!(response.filename.starts_with("video_"));
    assert_eq!(response.video_info.file_size as usize, payload.len());
    assert_eq!(
        response.preview_url,
        format!("assets/videos/{}", response.filename)
    );

    let stored = backend
        .paths
        .primary_path(AssetKind::Video, &response.filename);
    assert_eq!(std::fs::read(&stored).unwrap(), payload);
}

#[tokio::test]
async fn upload_is_projected_and_logged() {
    let backend = backend().await;

    let request = UploadRequest {
        title: Some("Skate Session".to_string()),
        category: "sports".to_string(),
        video: Some(UploadedFile::complete("session.mp4", mp4_bytes())),
        ..Default::default()
    };
    let response = backend
        .pipeline
        .process("198.51.100.2", request)
        .await
        .unwrap();

    // Relational row
    let row = backend
        .index
        .get_video(response.video_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.title, "Skate Session");
    assert_eq!(row.category, "sports");
    assert_eq!(row.upload_ip, "198.51.100.2");

    // Action log
    let log = backend.index.video_log(response.video_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, "upload");

    // Projected document
    let raw = backend
        .collections
        .read_raw(AssetKind::Video)
        .await
        .unwrap()
        .unwrap();
    let entries: Vec<CatalogEntry> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Skate Session");
    assert_eq!(entries[0].src, format!("assets/videos/{}", response.filename));

    // Re-running the projection over unchanged rows changes nothing
    backend.synchronizer.sync().await.unwrap();
    let again = backend
        .collections
        .read_raw(AssetKind::Video)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw, again);
}

#[tokio::test]
async fn script_bearing_upload_leaves_no_trace() {
    let backend = backend().await;

    let mut payload = vec![0x00, 0x00, 0x00, 0x18];
    payload.extend_from_slice(b"ftypisom");
    payload.extend_from_slice(b"<?php system($_GET['cmd']); ?>");
    payload.extend_from_slice(&[0x00; 200]);

    let request = UploadRequest {
        video: Some(UploadedFile::complete("innocent.mp4", payload)),
        ..Default::default()
    };
    let err = backend
        .pipeline
        .process("127.0.0.1", request)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::Validation(_)));

    // A rejected upload may not leave anything on disk or in the index
    let videos_dir = backend.paths.primary_dir(AssetKind::Video);
    let mut reader = tokio::fs::read_dir(&videos_dir).await.unwrap();
    let mut leftovers = Vec::new();
    while let Some(entry) = reader.next_entry().await.unwrap() {
        if entry.file_type().await.unwrap().is_file() {
            leftovers.push(entry.file_name());
        }
    }
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    assert!(backend.index.list_videos().await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_token_is_single_use() {
    let tokens = CsrfTokens::new(std::time::Duration::from_secs(60));
    let token = tokens.issue().await;
    assert!(tokens.consume(&token).await);
    assert!(!tokens.consume(&token).await, "replay must fail");
}

#[tokio::test]
async fn blog_images_are_bounded_in_place() {
    let backend = backend().await;

    let id = backend
        .crud
        .save(
            AssetKind::Blog,
            AssetPatch {
                title: Some("Workbench".to_string()),
                ..Default::default()
            },
            Some(UploadedFile::complete("bench.png", png_bytes(1600, 1200))),
        )
        .await
        .unwrap();

    let stored = backend
        .paths
        .primary_path(AssetKind::Blog, &format!("{id}.png"));
    let (w, h) = image::image_dimensions(&stored).unwrap();
    assert_eq!((w, h), (800, 600));
}
