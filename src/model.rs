use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Asset kinds managed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Photo,
    Video,
    Blog,
}

impl AssetKind {
    /// Singular name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Photo => "photo",
            AssetKind::Video => "video",
            AssetKind::Blog => "blog",
        }
    }

    /// Collection document name under the data directory
    pub fn collection_file(&self) -> &'static str {
        match self {
            AssetKind::Photo => "photos.json",
            AssetKind::Video => "videos.json",
            AssetKind::Blog => "blogs.json",
        }
    }

    /// What the primary file of this kind must be
    pub fn media_class(&self) -> MediaClass {
        match self {
            AssetKind::Photo | AssetKind::Blog => MediaClass::Image,
            AssetKind::Video => MediaClass::Video,
        }
    }

    /// Whether a create without an uploaded file is acceptable
    pub fn file_required_on_create(&self) -> bool {
        matches!(self, AssetKind::Photo | AssetKind::Video)
    }
}

/// Broad media class an upload is validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Image,
    Video,
}

impl MediaClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Image => "image",
            MediaClass::Video => "video",
        }
    }
}

/// One logical portfolio entry persisted in a flat collection document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetRecord {
    /// URL-safe identifier, unique within its collection
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Always an array of trimmed strings, whatever shape the input had
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    /// Front-end-relative primary file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Front-end-relative derivative path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Pixel dimensions of the primary image, "WxH" (photos)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    /// Clock-formatted playing time (videos)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Frame size, "WxH" (videos)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Short teaser text (blog posts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Last save time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AssetRecord {
    /// Blank record for a first save
    pub fn new(id: &str, title: String) -> Self {
        Self {
            id: id.to_string(),
            title,
            description: None,
            category: None,
            tags: Vec::new(),
            src: None,
            thumbnail: None,
            dimensions: None,
            duration: None,
            resolution: None,
            excerpt: None,
            author: None,
            updated_at: None,
        }
    }
}

/// Field-by-field update payload; only `Some` fields are applied
#[derive(Debug, Clone, Default)]
pub struct AssetPatch {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub duration: Option<String>,
    pub resolution: Option<String>,
}

impl AssetPatch {
    /// Overwrite-if-present merge onto an existing record
    pub fn apply(&self, record: &mut AssetRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            record.category = Some(category.clone());
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(excerpt) = &self.excerpt {
            record.excerpt = Some(excerpt.clone());
        }
        if let Some(author) = &self.author {
            record.author = Some(author.clone());
        }
        if let Some(duration) = &self.duration {
            record.duration = Some(duration.clone());
        }
        if let Some(resolution) = &self.resolution {
            record.resolution = Some(resolution.clone());
        }
    }
}

/// One row of the relational video index
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VideoRow {
    pub id: i64,
    /// Stored file name under the videos directory
    pub filename: String,
    /// Name the file arrived under
    pub original_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Comma-joined tag string, exploded at projection time
    pub tags: String,
    pub file_size: i64,
    /// Playing time in seconds
    pub duration: i64,
    pub resolution: String,
    pub upload_date: DateTime<Utc>,
    pub upload_ip: String,
    /// Front-end-relative thumbnail path, empty when none was supplied
    pub thumbnail_path: String,
    pub github_url: Option<String>,
    pub is_featured: bool,
    pub views: i64,
}

/// Insert payload for the video index
#[derive(Debug, Clone)]
pub struct NewVideoRow {
    pub filename: String,
    pub original_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub file_size: i64,
    pub duration: i64,
    pub resolution: String,
    pub upload_ip: String,
    pub thumbnail_path: Option<String>,
    pub github_url: Option<String>,
}

/// Entry shape the front end reads from the projected videos document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub src: String,
    pub thumbnail: String,
    pub duration: String,
    pub size: String,
    pub tags: Vec<String>,
    pub date: String,
    pub views: i64,
    pub featured: bool,
}

/// Trim and drop empties from a comma-joined tag string
pub fn normalize_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TagShape {
        Many(Vec<String>),
        Joined(String),
    }

    Ok(match TagShape::deserialize(deserializer)? {
        TagShape::Many(tags) => tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        TagShape::Joined(joined) => normalize_tags(&joined),
    })
}

// Ids written by the relational projection are numeric; everything else is a string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdShape {
        Text(String),
        Number(i64),
    }

    Ok(match IdShape::deserialize(deserializer)? {
        IdShape::Text(s) => s,
        IdShape::Number(n) => n.to_string(),
    })
}
