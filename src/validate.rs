use crate::config::LimitsConfig;
use crate::error::{MediaError, TransportError, ValidationError};
use crate::model::MediaClass;
use axum::body::Bytes;
use std::path::Path;
use tracing::{debug, warn};

/// How far into the file the script-signature scan looks
const SCRIPT_SNIFF_LEN: usize = 256;

/// Byte sequences that mark a file as executable content in disguise
const SCRIPT_SIGNATURES: &[&str] = &["<?php", "<script"];

/// Outcome of receiving a file over the wire, before any inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Complete,
    SizeExceeded,
    Partial,
    NoTempDir,
    WriteFailed,
    ExtensionBlocked,
}

/// A received file as handed over by the transport layer
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name claimed by the client
    pub original_name: String,
    /// Raw file content
    pub bytes: Bytes,
    /// Transfer outcome reported by the HTTP layer
    pub status: TransferStatus,
}

impl UploadedFile {
    pub fn complete(original_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
            status: TransferStatus::Complete,
        }
    }
}

/// A file that passed every admission check
#[derive(Debug, Clone)]
pub struct CheckedFile {
    /// Lowercased extension taken from the claimed name
    pub extension: String,
    /// Content type detected from magic bytes
    pub mime: &'static str,
}

/// Admission control for uploaded files
///
/// Checks run in a fixed order and the first failure wins: transfer
/// status, size ceiling, magic-byte type detection, extension
/// agreement, script-signature scan. The claimed extension is only
/// trusted after it agrees with the detected content type.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decide whether an uploaded file may enter the store
    pub fn admit(&self, upload: &UploadedFile, class: MediaClass) -> Result<CheckedFile, MediaError> {
        if let Some(err) = transfer_error(upload.status) {
            warn!(
                name = %upload.original_name,
                status = ?upload.status,
                "upload did not transfer cleanly"
            );
            metrics::counter!("media.uploads.rejected", "stage" => "transfer").increment(1);
            return Err(err.into());
        }

        match self.inspect(upload, class) {
            Ok(checked) => {
                debug!(
                    name = %upload.original_name,
                    mime = checked.mime,
                    size = upload.bytes.len(),
                    "upload admitted"
                );
                Ok(checked)
            }
            Err(err) => {
                warn!(name = %upload.original_name, error = %err, "upload rejected");
                metrics::counter!("media.uploads.rejected", "stage" => "content").increment(1);
                Err(err.into())
            }
        }
    }

    fn inspect(&self, upload: &UploadedFile, class: MediaClass) -> Result<CheckedFile, ValidationError> {
        let limit = self.limits.ceiling(class);
        let size = upload.bytes.len() as u64;
        if size > limit {
            return Err(ValidationError::TooLarge {
                size,
                limit_mb: limit / (1024 * 1024),
            });
        }

        let detected = infer::get(&upload.bytes).ok_or(ValidationError::UnknownType)?;
        let mime = detected.mime_type();
        let (_, extensions) = allowed_types(class)
            .iter()
            .find(|(accepted, _)| *accepted == mime)
            .ok_or_else(|| ValidationError::UnsupportedType {
                class: class.as_str(),
                detected: mime.to_string(),
            })?;

        let extension = Path::new(&upload.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !extensions.contains(&extension.as_str()) {
            return Err(ValidationError::ExtensionMismatch {
                extension,
                detected: mime.to_string(),
            });
        }

        let head = &upload.bytes[..upload.bytes.len().min(SCRIPT_SNIFF_LEN)];
        let head = String::from_utf8_lossy(head).to_ascii_lowercase();
        if SCRIPT_SIGNATURES.iter().any(|sig| head.contains(sig)) {
            return Err(ValidationError::ScriptSignature);
        }

        Ok(CheckedFile {
            extension,
            mime,
        })
    }
}

/// Detected content types accepted per media class, with the claimed
/// extensions each one agrees with
fn allowed_types(class: MediaClass) -> &'static [(&'static str, &'static [&'static str])] {
    match class {
        MediaClass::Image => &[
            ("image/jpeg", &["jpg", "jpeg"]),
            ("image/png", &["png"]),
            ("image/webp", &["webp"]),
        ],
        MediaClass::Video => &[
            ("video/mp4", &["mp4"]),
            ("video/quicktime", &["mov"]),
            ("video/x-m4v", &["m4v"]),
        ],
    }
}

fn transfer_error(status: TransferStatus) -> Option<TransportError> {
    match status {
        TransferStatus::Complete => None,
        TransferStatus::SizeExceeded => Some(TransportError::SizeExceeded),
        TransferStatus::Partial => Some(TransportError::Partial),
        TransferStatus::NoTempDir => Some(TransportError::NoTempDir),
        TransferStatus::WriteFailed => Some(TransportError::WriteFailed),
        TransferStatus::ExtensionBlocked => Some(TransportError::ExtensionBlocked),
    }
}
