use crate::model::AssetKind;
use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use std::path::{Path, PathBuf};

/// File extensions the asset routes will serve; everything else is denied
const PUBLIC_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "mp4", "mov", "m4v"];

/// Prefix the front end uses to reference stored files
const PUBLIC_PREFIX: &str = "assets";

/// Resolves on-disk and front-end-relative locations for stored assets
#[derive(Debug, Clone)]
pub struct MediaPaths {
    root: PathBuf,
}

impl MediaPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the served asset tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk directory holding primary files for a kind
    pub fn primary_dir(&self, kind: AssetKind) -> PathBuf {
        self.root.join(kind_dir(kind))
    }

    /// On-disk directory holding derivatives, when the kind has one
    pub fn thumb_dir(&self, kind: AssetKind) -> Option<PathBuf> {
        thumb_subdir(kind).map(|dir| self.root.join(dir))
    }

    /// On-disk location for a primary file
    pub fn primary_path(&self, kind: AssetKind, file_name: &str) -> PathBuf {
        self.primary_dir(kind).join(file_name)
    }

    /// On-disk location for a derivative file
    pub fn thumb_path(&self, kind: AssetKind, file_name: &str) -> Option<PathBuf> {
        self.thumb_dir(kind).map(|dir| dir.join(file_name))
    }

    /// Front-end-relative path for a stored primary file
    pub fn public_primary(&self, kind: AssetKind, file_name: &str) -> String {
        format!("{}/{}/{}", PUBLIC_PREFIX, kind_dir(kind), file_name)
    }

    /// Front-end-relative path for a stored derivative
    pub fn public_thumb(&self, kind: AssetKind, file_name: &str) -> Option<String> {
        thumb_subdir(kind).map(|dir| format!("{PUBLIC_PREFIX}/{dir}/{file_name}"))
    }

    /// Map a stored front-end-relative path back to its on-disk location
    pub fn resolve_public(&self, public: &str) -> Option<PathBuf> {
        let rest = public.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        if rest
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return None;
        }
        Some(self.root.join(rest))
    }

    /// Create every asset directory that might be written to
    pub async fn ensure_directories(&self) -> Result<()> {
        for kind in [AssetKind::Photo, AssetKind::Video, AssetKind::Blog] {
            let dir = self.primary_dir(kind);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            if let Some(thumbs) = self.thumb_dir(kind) {
                tokio::fs::create_dir_all(&thumbs)
                    .await
                    .with_context(|| format!("Failed to create {}", thumbs.display()))?;
            }
        }
        Ok(())
    }
}

fn kind_dir(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Photo => "photos",
        AssetKind::Video => "videos",
        AssetKind::Blog => "blog",
    }
}

fn thumb_subdir(kind: AssetKind) -> Option<&'static str> {
    match kind {
        AssetKind::Photo => Some("photos/thumbnails"),
        AssetKind::Video => Some("videos/thumbnails"),
        AssetKind::Blog => None,
    }
}

/// Reduce a title to a URL-safe slug
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

/// Identifier for a record created without an explicit id
pub fn new_record_id(title: &str) -> String {
    format!("{}-{}", slugify(title), Utc::now().timestamp())
}

/// Ids are used in file names, so their alphabet is fixed
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Storage name for a simple CRUD upload
pub fn asset_file_name(id: &str, ext: &str) -> String {
    format!("{id}.{ext}")
}

/// Collision-resistant name for the advanced upload flow
pub fn unique_video_name(ext: &str) -> String {
    let entropy: u32 = rand::thread_rng().gen();
    format!("video_{}_{:08x}.{}", Utc::now().timestamp(), entropy, ext)
}

/// Serving policy: deny everything except known media extensions
pub fn is_public_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| PUBLIC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
