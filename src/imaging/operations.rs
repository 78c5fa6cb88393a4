//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take settings, compute parameters, and call the backend.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{AspectRatio, CropParams, CropSpec, Quality, ThumbnailParams};
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// Settings for the full-resolution archival copy.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveConfig {
    pub ratio: AspectRatio,
    pub quality: Quality,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            ratio: AspectRatio::PORTRAIT_4_5,
            quality: Quality::new(95),
        }
    }
}

/// Settings for the minimized working copy.
#[derive(Debug, Clone, Copy)]
pub struct WorkingConfig {
    pub max_edge: u32,
    pub quality: Quality,
}

impl Default for WorkingConfig {
    fn default() -> Self {
        Self {
            max_edge: 1200,
            quality: Quality::new(85),
        }
    }
}

/// Plan an archival crop without executing it.
pub fn plan_archive(source: &Path, output: &Path, config: &ArchiveConfig) -> CropParams {
    CropParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        crop: CropSpec::Centered(config.ratio),
        quality: config.quality,
    }
}

/// Plan a working copy without executing it.
pub fn plan_working_copy(
    source: &Path,
    output: &Path,
    crop: Option<CropSpec>,
    config: &WorkingConfig,
) -> ThumbnailParams {
    ThumbnailParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        crop,
        max_edge: config.max_edge,
        quality: config.quality,
    }
}

/// Write the centered, full-resolution archival JPEG.
pub fn create_archive(
    backend: &impl ImageBackend,
    source: &Path,
    output: &Path,
    config: &ArchiveConfig,
) -> Result<Dimensions> {
    backend.crop(&plan_archive(source, output, config))
}

/// Write a bounded working copy, cropping first when `crop` is given.
pub fn create_working_copy(
    backend: &impl ImageBackend,
    source: &Path,
    output: &Path,
    crop: Option<CropSpec>,
    config: &WorkingConfig,
) -> Result<Dimensions> {
    backend.thumbnail(&plan_working_copy(source, output, crop, config))
}
