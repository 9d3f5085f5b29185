use crate::model::MediaClass;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the media backend
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload size ceilings
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Image post-processing settings
    #[serde(default)]
    pub media: MediaConfig,
    /// Video encoder discovery
    #[serde(default)]
    pub encoder: EncoderConfig,
    /// Remote hosting push
    #[serde(default)]
    pub github: GithubConfig,
    /// Upload token settings
    #[serde(default)]
    pub csrf: CsrfConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Storage locations for files, documents, and the index
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the served asset tree
    #[serde(default = "default_asset_root")]
    pub asset_root: String,
    /// Directory holding the flat collection documents
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// SQLite file backing the video index
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Upload size ceilings per media class
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Ceiling for photo and blog images in bytes
    #[serde(default = "default_photo_max_bytes")]
    pub photo_max_bytes: u64,
    /// Ceiling for video files in bytes
    #[serde(default = "default_video_max_bytes")]
    pub video_max_bytes: u64,
}

impl LimitsConfig {
    /// Size ceiling for one media class
    pub fn ceiling(&self, class: MediaClass) -> u64 {
        match class {
            MediaClass::Image => self.photo_max_bytes,
            MediaClass::Video => self.video_max_bytes,
        }
    }

    /// Whole-request cap handed to the HTTP layer, with room for form fields
    pub fn request_body_ceiling(&self) -> usize {
        (self.video_max_bytes + 16 * 1024 * 1024) as usize
    }
}

/// Image post-processing settings
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Photo thumbnail bounding box width
    #[serde(default = "default_photo_thumb_width")]
    pub photo_thumb_width: u32,
    /// Photo thumbnail bounding box height
    #[serde(default = "default_photo_thumb_height")]
    pub photo_thumb_height: u32,
    /// Blog image in-place bound width
    #[serde(default = "default_blog_max_width")]
    pub blog_max_width: u32,
    /// Blog image in-place bound height
    #[serde(default = "default_blog_max_height")]
    pub blog_max_height: u32,
    /// JPEG encode quality
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Video encoder discovery
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// Candidate executable locations probed once at startup
    #[serde(default = "default_encoder_candidates")]
    pub candidates: Vec<String>,
}

/// Remote hosting push settings
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Whether pushing stored videos to the hosting API is enabled
    #[serde(default)]
    pub enabled: bool,
    /// API token; pushing stays disabled without one
    pub token: Option<String>,
    /// Repository owner
    #[serde(default)]
    pub owner: String,
    /// Repository name
    #[serde(default)]
    pub repo: String,
    /// Target branch
    #[serde(default = "default_github_branch")]
    pub branch: String,
}

/// Upload token settings
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfConfig {
    /// Seconds an unused token stays valid
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "folio-media".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_asset_root() -> String {
    "assets".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_database_path() -> String {
    "data/portfolio.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_photo_max_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_video_max_bytes() -> u64 {
    200 * 1024 * 1024 // 200MB
}

fn default_photo_thumb_width() -> u32 {
    400
}

fn default_photo_thumb_height() -> u32 {
    300
}

fn default_blog_max_width() -> u32 {
    800
}

fn default_blog_max_height() -> u32 {
    600
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_encoder_candidates() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "/usr/bin/ffmpeg".to_string(),
        "/usr/local/bin/ffmpeg".to_string(),
        "/opt/homebrew/bin/ffmpeg".to_string(),
    ]
}

fn default_github_branch() -> String {
    "main".to_string()
}

fn default_token_ttl_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "folio-media")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/folio").required(false))
            .add_source(config::File::with_name("/etc/folio/media").required(false))
            // Override with environment variables
            // FOLIO__STORAGE__ASSET_ROOT -> storage.asset_root
            .add_source(
                config::Environment::with_prefix("FOLIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get the upload token lifetime as Duration
    pub fn csrf_ttl(&self) -> Duration {
        Duration::from_secs(self.csrf.token_ttl_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            photo_max_bytes: default_photo_max_bytes(),
            video_max_bytes: default_video_max_bytes(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            photo_thumb_width: default_photo_thumb_width(),
            photo_thumb_height: default_photo_thumb_height(),
            blog_max_width: default_blog_max_width(),
            blog_max_height: default_blog_max_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            candidates: default_encoder_candidates(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            owner: String::new(),
            repo: String::new(),
            branch: default_github_branch(),
        }
    }
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_photo_max_bytes(), 5 * 1024 * 1024);
        assert_eq!(default_video_max_bytes(), 200 * 1024 * 1024);
        assert_eq!(default_photo_thumb_width(), 400);
        assert_eq!(default_blog_max_height(), 600);
    }

    #[test]
    fn test_limit_ceilings() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.ceiling(MediaClass::Image), 5 * 1024 * 1024);
        assert_eq!(limits.ceiling(MediaClass::Video), 200 * 1024 * 1024);
        assert!(limits.request_body_ceiling() > limits.video_max_bytes as usize);
    }
}
