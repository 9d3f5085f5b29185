//! Folio Media Backend
//!
//! Media ingestion and dual-store synchronization backend for a static
//! portfolio site. The service validates uploaded photos, videos and blog
//! images by content, derives thumbnails, re-encodes videos through a
//! discovered ffmpeg binary, and keeps two views of the video library in
//! step: a relational SQLite index and the flat JSON documents the front
//! end reads.
//!
//! ## Features
//!
//! - **Content-Sniffed Validation**: magic bytes decide the media type,
//!   the claimed extension must agree, and files carrying embedded script
//!   signatures are rejected outright
//! - **Derived Thumbnails**: aspect-preserving photo thumbnails and
//!   in-place bounded blog images, never upscaled
//! - **Tiered Video Encoding**: H.264 re-encodes through ffmpeg with a
//!   byte-preserving pass-through whenever the binary is missing or fails
//! - **Dual-Store Catalog**: every accepted video lands in the SQLite
//!   index and is projected into the front-end document on each change
//! - **Optional Remote Push**: stored videos mirrored to a GitHub Pages
//!   repository through the contents API
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum)                 Asset Tree                Flat Documents
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ CRUD routes  │           │ photos/      │          │ photos.json  │
//! │ /api/upload  │──────────▶│ videos/      │          │ videos.json  │
//! │ /assets/*    │           │ blog/        │          │ blogs.json   │
//! └──────────────┘           └──────────────┘          └──────────────┘
//!        │                          │                         ▲
//!        ▼                          │                         │
//! ┌──────────────┐                  │                         │
//! │ Validator    │                  │                         │
//! └──────────────┘                  ▼                         │
//!        │                   ┌──────────────┐          ┌──────────────┐
//!        ▼                   │ Video Index  │─────────▶│ Synchronizer │
//! ┌──────────────┐           │ (SQLite)     │          └──────────────┘
//! │ Encoder /    │──────────▶└──────────────┘
//! │ Thumbnailer  │
//! └──────────────┘
//! ```

pub mod api;
pub mod catalog;
pub mod collections;
pub mod config;
pub mod crud;
pub mod csrf;
pub mod encoder;
pub mod error;
pub mod github;
pub mod model;
pub mod paths;
pub mod thumbnail;
pub mod upload;
pub mod validate;
pub mod video_index;

pub use api::{create_router, start_api_server, AppState};
pub use catalog::{format_bytes, format_duration, Synchronizer};
pub use collections::CollectionStore;
pub use config::Config;
pub use crud::MediaCrud;
pub use csrf::CsrfTokens;
pub use encoder::{
    select_encoder, CompressionTier, FfmpegEncoder, IdentityEncoder, VideoEncoder, VideoProbe,
};
pub use error::{MediaError, TransportError, ValidationError};
pub use github::GithubUploader;
pub use model::{AssetKind, AssetPatch, AssetRecord, CatalogEntry, MediaClass};
pub use paths::MediaPaths;
pub use thumbnail::Thumbnailer;
pub use upload::{UploadPipeline, UploadRequest, UploadResponse};
pub use validate::{UploadedFile, Validator};
pub use video_index::VideoIndex;
