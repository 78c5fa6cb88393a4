//! Pure crop and resize geometry.
//!
//! All functions here are pure and testable without any I/O or images.
//! Ratios are exact rationals ([`AspectRatio`]), so comparisons and rounding
//! happen in integer arithmetic and the same input always yields the same
//! rectangle.

use super::params::{AspectRatio, CropRect};

/// Millimetres per inch, as the divisor used for all print conversions.
const MM_PER_INCH: f64 = 25.4;

/// `round(n / d)` for non-negative integers, halves rounded up.
fn div_round(n: u64, d: u64) -> u64 {
    (2 * n + d) / (2 * d)
}

/// Centered crop covering as much of the image as possible at `ratio`.
///
/// - wider than `ratio`: width becomes `round(h * r)`, full height, centered horizontally
/// - otherwise: height becomes `round(w / r)`, full width, centered vertically
///
/// # Examples
/// ```
/// # use vide_maker::imaging::{AspectRatio, CropRect, centered_crop};
/// // 3000x2000 landscape at 4:5 → 1600x2000 strip in the middle
/// assert_eq!(
///     centered_crop((3000, 2000), AspectRatio::new(4, 5)),
///     CropRect::new(700, 0, 1600, 2000)
/// );
/// ```
pub fn centered_crop(dims: (u32, u32), ratio: AspectRatio) -> CropRect {
    let (w, h) = (dims.0 as u64, dims.1 as u64);
    let (rw, rh) = (ratio.width as u64, ratio.height as u64);

    if w * rh > h * rw {
        let new_w = div_round(h * rw, rh).clamp(1, w);
        CropRect::new(((w - new_w) / 2) as u32, 0, new_w as u32, h as u32)
    } else {
        let new_h = div_round(w * rh, rw).clamp(1, h.max(1));
        CropRect::new(0, ((h - new_h) / 2) as u32, w as u32, new_h as u32)
    }
}

/// Fit a user-drawn rectangle inside the image and restore the target ratio.
///
/// The origin is kept, the extent is clipped to the image bounds, and then the
/// dimension that overshoots the ratio is shrunk. Returns `None` when nothing
/// of the rectangle remains inside the image.
pub fn constrain_override(
    rect: CropRect,
    dims: (u32, u32),
    ratio: AspectRatio,
) -> Option<CropRect> {
    let (img_w, img_h) = dims;
    if rect.x >= img_w || rect.y >= img_h {
        return None;
    }

    let w = rect.width.min(img_w - rect.x) as u64;
    let h = rect.height.min(img_h - rect.y) as u64;
    if w == 0 || h == 0 {
        return None;
    }

    let (rw, rh) = (ratio.width as u64, ratio.height as u64);
    let (w, h) = if w * rh > h * rw {
        (div_round(h * rw, rh), h)
    } else {
        (w, div_round(w * rh, rw))
    };
    if w == 0 || h == 0 {
        return None;
    }

    Some(CropRect::new(rect.x, rect.y, w as u32, h as u32))
}

/// Dimensions after shrinking to fit inside a `max_edge` square.
///
/// Aspect ratio is preserved and images already inside the bound are
/// returned unchanged (no upscaling).
pub fn fit_within(dims: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (w, h) = dims;
    if w <= max_edge && h <= max_edge {
        return (w, h);
    }
    let (w64, h64, max) = (w as u64, h as u64, max_edge as u64);
    if w >= h {
        (max_edge, div_round(h64 * max, w64).max(1) as u32)
    } else {
        (div_round(w64 * max, h64).max(1) as u32, max_edge)
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    let (w, h) = if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        (((tgt_h as f64) * src_aspect).round() as u32, tgt_h)
    } else {
        // Source is taller: width will match, height will exceed
        (tgt_w, ((tgt_w as f64) / src_aspect).round() as u32)
    };

    // Rounding must never leave a sliver uncovered.
    (w.max(tgt_w), h.max(tgt_h))
}

/// Resize-to-cover plan: intermediate size plus the centered crop inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverPlan {
    pub resized: (u32, u32),
    pub crop: CropRect,
}

/// Scale `source` to cover `target`, then take the centered `target`-sized window.
pub fn cover_plan(source: (u32, u32), target: (u32, u32)) -> CoverPlan {
    let resized = calculate_fill_dimensions(source, target);
    let x = (resized.0 - target.0) / 2;
    let y = (resized.1 - target.1) / 2;
    CoverPlan {
        resized,
        crop: CropRect::new(x, y, target.0, target.1),
    }
}

/// Convert a length in millimetres to whole pixels at `dpi`, truncating.
pub fn mm_to_px(mm: f64, dpi: u32) -> u32 {
    (mm.max(0.0) * dpi as f64 / MM_PER_INCH) as u32
}
