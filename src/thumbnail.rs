use crate::config::MediaConfig;
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Bounding-box image scaling for gallery thumbnails and oversized
/// inline images
///
/// Images already inside the box are never upscaled: deriving a
/// thumbnail from one produces a plain copy, and bounding one in
/// place leaves the file untouched. Scaled output lands via a
/// temporary file so readers never observe a half-written image.
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    media: MediaConfig,
}

impl Thumbnailer {
    pub fn new(media: MediaConfig) -> Self {
        Self { media }
    }

    /// Produce the gallery thumbnail for a stored photo
    pub async fn derive_photo_thumb(&self, source: &Path, dest: &Path) -> Result<()> {
        self.scale_into(
            source,
            dest,
            self.media.photo_thumb_width,
            self.media.photo_thumb_height,
        )
        .await
    }

    /// Bound a blog illustration in place
    pub async fn bound_blog_image(&self, path: &Path) -> Result<()> {
        self.scale_into(path, path, self.media.blog_max_width, self.media.blog_max_height)
            .await
    }

    async fn scale_into(&self, source: &Path, dest: &Path, max_w: u32, max_h: u32) -> Result<()> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        let quality = self.media.jpeg_quality;
        tokio::task::spawn_blocking(move || scale_file(&source, &dest, max_w, max_h, quality))
            .await
            .context("Image scaling task panicked")?
    }
}

fn scale_file(source: &Path, dest: &Path, max_w: u32, max_h: u32, quality: u8) -> Result<()> {
    let img = image::open(source)
        .with_context(|| format!("Failed to open image {}", source.display()))?;
    let (width, height) = img.dimensions();

    let Some((new_w, new_h)) = target_size(width, height, max_w, max_h) else {
        if source != dest {
            fs::copy(source, dest).with_context(|| {
                format!("Failed to copy {} to {}", source.display(), dest.display())
            })?;
        }
        return Ok(());
    };

    let scaled = img.resize_exact(new_w, new_h, FilterType::Lanczos3);
    let format = ImageFormat::from_path(dest)
        .with_context(|| format!("Unrecognized image extension on {}", dest.display()))?;

    let tmp = dest.with_extension("tmp");
    write_image(&scaled, &tmp, format, quality)?;
    fs::rename(&tmp, dest)
        .with_context(|| format!("Failed to move scaled image into {}", dest.display()))?;

    debug!(
        from = %source.display(),
        to = %dest.display(),
        width = new_w,
        height = new_h,
        "scaled image"
    );
    Ok(())
}

/// Pixel dimensions read from the image header
pub async fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::image_dimensions(&path)
            .with_context(|| format!("Failed to read dimensions of {}", path.display()))
    })
    .await
    .context("Image inspection task panicked")?
}

/// Dimensions after fitting inside the box, or None when the image
/// already fits
fn target_size(width: u32, height: u32, max_w: u32, max_h: u32) -> Option<(u32, u32)> {
    let ratio = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    if ratio >= 1.0 {
        return None;
    }
    let w = ((width as f64 * ratio).round() as u32).max(1);
    let h = ((height as f64 * ratio).round() as u32).max(1);
    Some((w, h))
}

fn write_image(img: &DynamicImage, path: &Path, format: ImageFormat, quality: u8) -> Result<()> {
    match format {
        ImageFormat::Jpeg => {
            // JPEG carries no alpha channel
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder
                .encode_image(&img.to_rgb8())
                .context("Failed to encode JPEG")?;
        }
        other => {
            img.save_with_format(path, other)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }
    Ok(())
}
