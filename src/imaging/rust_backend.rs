//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, BMP, GIF, TIFF, WebP) | `image::ImageReader` |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (writes 4:4:4, no chroma subsampling) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{centered_crop, fit_within};
use super::params::{CropParams, CropRect, CropSpec, ThumbnailParams};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(path: &Path, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
}

/// Whether an EXIF orientation swaps width and height.
fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

/// Load an image and apply its stored EXIF orientation.
pub(crate) fn load_oriented(path: &Path) -> Result<DynamicImage, BackendError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| decode_error(path, e))?;
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Turn a crop spec into a rectangle that lies inside `dims`.
fn resolve_crop(spec: CropSpec, dims: (u32, u32)) -> Result<CropRect, BackendError> {
    if dims.0 == 0 || dims.1 == 0 {
        return Err(BackendError::ProcessingFailed(format!(
            "cannot crop an empty {}x{} image",
            dims.0, dims.1
        )));
    }
    Ok(match spec {
        CropSpec::Centered(ratio) => centered_crop(dims, ratio),
        CropSpec::Region(rect) => {
            let x = rect.x.min(dims.0 - 1);
            let y = rect.y.min(dims.1 - 1);
            CropRect::new(
                x,
                y,
                rect.width.clamp(1, dims.0 - x),
                rect.height.clamp(1, dims.1 - y),
            )
        }
    })
}

fn apply_crop(img: &DynamicImage, spec: CropSpec) -> Result<DynamicImage, BackendError> {
    let rect = resolve_crop(spec, (img.width(), img.height()))?;
    Ok(img.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// Encode as baseline JPEG at the given quality.
fn save_jpeg(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100) as u8);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "JPEG encode failed for {}: {}",
                path.display(),
                e
            ))
        })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let mut decoder = ImageReader::open(path)?
            .with_guessed_format()?
            .into_decoder()
            .map_err(|e| decode_error(path, e))?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);
        Ok(if swaps_axes(orientation) {
            Dimensions {
                width: height,
                height: width,
            }
        } else {
            Dimensions { width, height }
        })
    }

    fn crop(&self, params: &CropParams) -> Result<Dimensions, BackendError> {
        let img = load_oriented(&params.source)?;
        let cropped = apply_crop(&img, params.crop)?;
        save_jpeg(&cropped, &params.output, params.quality.value())?;
        Ok(Dimensions {
            width: cropped.width(),
            height: cropped.height(),
        })
    }

    fn thumbnail(&self, params: &ThumbnailParams) -> Result<Dimensions, BackendError> {
        let img = load_oriented(&params.source)?;
        let img = match params.crop {
            Some(spec) => apply_crop(&img, spec)?,
            None => img,
        };

        let (w, h) = fit_within((img.width(), img.height()), params.max_edge);
        let img = if (w, h) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(w, h, FilterType::Lanczos3)
        };

        save_jpeg(&img, &params.output, params.quality.value())?;
        Ok(Dimensions {
            width: img.width(),
            height: img.height(),
        })
    }
}
