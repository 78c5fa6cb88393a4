//! Dual-photo print sheets.
//!
//! A print sheet is a [`TemplateDefinition`]-sized canvas split into two
//! halves. Each half receives one copy of the template artwork and one photo,
//! scaled to cover the area inside the margins and centre-cropped. Sheets come
//! out of the printer cut in half, so one sheet is two physical prints.
//!
//! ```text
//! ┌──────────────┬──────────────┐
//! │ ┌──────────┐ │ ┌──────────┐ │  top margin
//! │ │ photo 1  │ │ │ photo 2  │ │
//! │ │          │ │ │          │ │
//! │ └──────────┘ │ └──────────┘ │
//! │   artwork    │   artwork    │  bottom margin
//! └──────────────┴──────────────┘
//! ```
//!
//! Margins are given in millimetres and truncated to whole pixels at the
//! definition's DPI. A [`PositionOffset`] widens the canvas and shifts the
//! whole layout sideways to compensate for printer feed misalignment.

use crate::imaging::{cover_plan, load_oriented, mm_to_px};
use crate::naming::copy_sort_key;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the template definition every event starts with.
pub const DEFAULT_TEMPLATE: &str = "DNP 6x4";

/// Resolution all print geometry is computed at.
pub const PRINT_DPI: u32 = 300;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to load template artwork {}: {message}", .path.display())]
    Artwork { path: PathBuf, message: String },
    #[error("Failed to prepare {}: {message}", .path.display())]
    Photo { path: PathBuf, message: String },
    #[error("Template leaves no room for photos ({width}x{height} slot)")]
    EmptySlot { width: u32, height: u32 },
    #[error("PNG encode error: {0}")]
    Encode(#[from] png::EncodingError),
}

/// Canvas geometry for one print layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDefinition {
    /// Canvas width in pixels (both halves).
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Margins in millimetres, applied inside each half.
    pub margin_top: f64,
    pub margin_left: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_dpi() -> u32 {
    PRINT_DPI
}

/// Pixel insets resolved from a definition's millimetre margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insets {
    pub top: u32,
    pub left: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TemplateDefinition {
    /// 6x4" dye-sublimation sheet, cut into two 3x4" prints.
    pub const DNP_6X4: TemplateDefinition = TemplateDefinition {
        width: 1800,
        height: 1200,
        margin_top: 4.0,
        margin_left: 4.0,
        margin_right: 4.0,
        margin_bottom: 12.4,
        dpi: PRINT_DPI,
    };

    pub fn insets(&self) -> Insets {
        Insets {
            top: mm_to_px(self.margin_top, self.dpi),
            left: mm_to_px(self.margin_left, self.dpi),
            right: mm_to_px(self.margin_right, self.dpi),
            bottom: mm_to_px(self.margin_bottom, self.dpi),
        }
    }

    /// Size each photo is fitted to: half the canvas minus side margins by
    /// the canvas height minus top and bottom margins.
    pub fn slot_size(&self) -> (u32, u32) {
        let m = self.insets();
        (
            (self.width / 2).saturating_sub(m.left + m.right),
            self.height.saturating_sub(m.top + m.bottom),
        )
    }
}

/// The definitions shipped with the application, keyed by name.
pub fn builtin_templates() -> BTreeMap<String, TemplateDefinition> {
    BTreeMap::from([(DEFAULT_TEMPLATE.to_string(), TemplateDefinition::DNP_6X4)])
}

/// Horizontal layout shift in half-millimetre steps, within ±2.5 mm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionOffset {
    half_mm: i8,
}

impl PositionOffset {
    /// Largest shift either way, in half-millimetre steps.
    pub const MAX_STEPS: i8 = 5;

    /// Accepts only multiples of 0.5 mm inside the allowed range.
    pub fn from_mm(mm: f64) -> Option<Self> {
        let steps = mm * 2.0;
        if !steps.is_finite() || (steps - steps.round()).abs() > 1e-9 {
            return None;
        }
        let steps = steps.round();
        if steps.abs() > Self::MAX_STEPS as f64 {
            return None;
        }
        Some(Self {
            half_mm: steps as i8,
        })
    }

    pub fn mm(self) -> f64 {
        self.half_mm as f64 / 2.0
    }

    /// Nudge by `steps` half-millimetres, saturating at the range ends.
    pub fn nudged(self, steps: i8) -> Self {
        Self {
            half_mm: self
                .half_mm
                .saturating_add(steps)
                .clamp(-Self::MAX_STEPS, Self::MAX_STEPS),
        }
    }

    /// Offset in whole pixels at `dpi`, truncated toward zero.
    pub fn to_px(self, dpi: u32) -> i64 {
        // mm * dpi / 25.4 with mm = half_mm / 2
        self.half_mm as i64 * dpi as i64 * 10 / 508
    }
}

/// Sort photos so copies of the same shot sit next to each other, then pad
/// an odd list by repeating the last photo.
pub fn layout_order(photos: &[PathBuf]) -> Vec<PathBuf> {
    let mut ordered = photos.to_vec();
    ordered.sort_by_cached_key(|p| copy_sort_key(p));
    if ordered.len() % 2 == 1
        && let Some(last) = ordered.last().cloned()
    {
        ordered.push(last);
    }
    ordered
}

/// Everything one compositing pass needs.
#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    /// Photos to place, crop overrides already substituted.
    pub photos: &'a [PathBuf],
    pub artwork: &'a Path,
    pub output_dir: &'a Path,
    pub definition: &'a TemplateDefinition,
    pub offset: PositionOffset,
}

/// Compose `print_{k}.png` sheets for every adjacent pair of photos.
///
/// `progress` receives a percentage after each sheet. The first failure
/// aborts the pass; sheets already written stay on disk.
pub fn compose_prints(
    request: &CompositeRequest<'_>,
    mut progress: impl FnMut(u8),
) -> Result<Vec<PathBuf>, CompositionError> {
    let def = request.definition;
    let (slot_w, slot_h) = def.slot_size();
    if slot_w == 0 || slot_h == 0 {
        return Err(CompositionError::EmptySlot {
            width: slot_w,
            height: slot_h,
        });
    }

    let artwork = load_oriented(request.artwork)
        .map_err(|e| CompositionError::Artwork {
            path: request.artwork.to_path_buf(),
            message: e.to_string(),
        })?
        .to_rgba8();

    let ordered = layout_order(request.photos);
    let total = ordered.len();
    let mut written = Vec::with_capacity(total / 2);

    for (k, pair) in ordered.chunks_exact(2).enumerate() {
        let left = fit_slot(&pair[0], slot_w, slot_h)?;
        let right = fit_slot(&pair[1], slot_w, slot_h)?;
        let sheet = compose_sheet(def, &artwork, &left, &right, request.offset);

        let out = request.output_dir.join(format!("print_{k}.png"));
        write_png(&out, &sheet, def.dpi)?;
        debug!(sheet = %out.display(), "composed print sheet");
        written.push(out);

        progress((((k + 1) * 2 * 100) / total) as u8);
    }

    Ok(written)
}

/// Scale a photo to cover the slot, then take the centred slot-sized window.
fn fit_slot(path: &Path, width: u32, height: u32) -> Result<RgbaImage, CompositionError> {
    let img = load_oriented(path).map_err(|e| CompositionError::Photo {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let plan = cover_plan((img.width(), img.height()), (width, height));
    let resized = img.resize_exact(plan.resized.0, plan.resized.1, FilterType::Lanczos3);
    Ok(resized
        .crop_imm(plan.crop.x, plan.crop.y, plan.crop.width, plan.crop.height)
        .to_rgba8())
}

/// Lay out one sheet: artwork over white in both halves, photos inside the
/// margins, then the whole layout shifted by the position offset.
pub fn compose_sheet(
    def: &TemplateDefinition,
    artwork: &RgbaImage,
    left: &RgbaImage,
    right: &RgbaImage,
    offset: PositionOffset,
) -> RgbaImage {
    let m = def.insets();
    let half = (def.width / 2) as i64;

    let mut base = RgbaImage::from_pixel(def.width, def.height, WHITE);
    imageops::overlay(&mut base, artwork, 0, 0);
    imageops::replace(&mut base, left, m.left as i64, m.top as i64);
    imageops::overlay(&mut base, artwork, half, 0);
    imageops::replace(&mut base, right, half + m.left as i64, m.top as i64);

    let shift = offset.to_px(def.dpi);
    if shift == 0 {
        return base;
    }
    let mut sheet = RgbaImage::from_pixel(def.width + shift.unsigned_abs() as u32, def.height, WHITE);
    imageops::replace(&mut sheet, &base, shift.max(0), 0);
    sheet
}

/// Pixels per metre for the PNG pHYs chunk.
fn pixels_per_metre(dpi: u32) -> u32 {
    (dpi as f64 / 0.0254).round() as u32
}

/// Write an opaque RGB PNG tagged with the print resolution.
fn write_png(path: &Path, sheet: &RgbaImage, dpi: u32) -> Result<(), CompositionError> {
    let rgb = DynamicImage::ImageRgba8(sheet.clone()).to_rgb8();
    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(writer, rgb.width(), rgb.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let ppm = pixels_per_metre(dpi);
    encoder.set_pixel_dims(Some(png::PixelDimensions {
        xppu: ppm,
        yppu: ppm,
        unit: png::Unit::Meter,
    }));
    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(rgb.as_raw())?;
    png_writer.finish()?;
    Ok(())
}
