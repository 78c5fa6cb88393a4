//! Manual crop overrides for working photos.
//!
//! The automatic centre crop sometimes cuts off a face. An override re-crops
//! the *original* capture (found through the [`ArchiveIndex`]) with a
//! user-drawn rectangle and replaces the working copy. Compositing then
//! prints the re-cropped working copy instead of the archival file.
//!
//! Resetting drops the override and regenerates the working copy from the
//! archival file with the automatic rule.
//!
//! [`ArchiveIndex`]: crate::state::ArchiveIndex

use crate::imaging::{
    AspectRatio, BackendError, CropRect, CropSpec, ImageBackend, Orientation,
    constrain_override, create_working_copy, get_dimensions,
};
use crate::state::{AppContext, CropOverride};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CropError {
    #[error("Working photo not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Crop {rect:?} lies outside the {width}x{height} image")]
    OutsideImage {
        rect: CropRect,
        width: u32,
        height: u32,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Archival file and original capture behind a working photo.
///
/// Falls back to the working photo itself when the archive index has no
/// entry or the capture is gone.
fn originals(ctx: &AppContext, working: &Path) -> (Option<PathBuf>, PathBuf) {
    let name = working
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match ctx.archive.find_by_name(&name) {
        Some((archival, source)) if source.exists() => (Some(archival), source),
        Some((archival, _)) if archival.exists() => (Some(archival.clone()), archival),
        _ => (None, working.to_path_buf()),
    }
}

/// Ratio to hold a re-crop to.
///
/// Photos from a custom run were made at their own ratio, so an explicit
/// `ratio` replaces the configured one. `orientation`, when given, flips
/// whichever ratio applies.
pub fn override_ratio(
    configured: AspectRatio,
    ratio: Option<AspectRatio>,
    orientation: Option<Orientation>,
) -> AspectRatio {
    let ratio = ratio.unwrap_or(configured);
    orientation.map_or(ratio, |o| ratio.oriented(o))
}

/// Re-crop `working` from its original capture.
///
/// `rect` is in pixels of the oriented capture. It is clamped to the image
/// and shrunk to `ratio`. Returns the override that was recorded.
pub fn apply_crop_override(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    working: &Path,
    rect: CropRect,
    ratio: AspectRatio,
) -> Result<CropOverride, CropError> {
    if !working.is_file() {
        return Err(CropError::NotFound(working.to_path_buf()));
    }
    let (archival, source) = originals(ctx, working);
    let dims = get_dimensions(backend, &source)?;
    let region = constrain_override(rect, dims, ratio).ok_or(CropError::OutsideImage {
        rect,
        width: dims.0,
        height: dims.1,
    })?;
    debug!(?rect, ?region, source = %source.display(), "constrained crop");

    create_working_copy(
        backend,
        &source,
        working,
        Some(CropSpec::Region(region)),
        &ctx.config.photos.working(),
    )?;

    let ov = CropOverride {
        rect: region,
        source_dims: dims,
    };
    ctx.crops.record(working.to_path_buf(), archival, ov);
    info!(photo = %working.display(), "applied crop override");
    Ok(ov)
}

/// Drop the override for `working` and regenerate it automatically.
///
/// Returns whether an override existed.
pub fn reset_crop_override(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    working: &Path,
    ratio: AspectRatio,
) -> Result<bool, CropError> {
    if !working.is_file() {
        return Err(CropError::NotFound(working.to_path_buf()));
    }
    let existed = ctx.crops.clear(working);
    let (archival, _) = originals(ctx, working);
    let base = archival.unwrap_or_else(|| working.to_path_buf());

    create_working_copy(
        backend,
        &base,
        working,
        Some(CropSpec::Centered(ratio)),
        &ctx.config.photos.working(),
    )?;
    info!(photo = %working.display(), existed, "reset crop");
    Ok(existed)
}
