//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides which derivatives to write) and the [`backend`](super::backend)
//! (which does the pixel work). Keeping them apart lets the pipeline run
//! against a mock backend in tests.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG quality (1–100, default 85). Clamped on construction.
//! - [`AspectRatio`]: exact `width:height` rational used by every crop rule.
//! - [`Orientation`]: portrait/landscape choice applied to a ratio preset.
//! - [`CropRect`]: a pixel rectangle in oriented source coordinates.
//! - [`CropSpec`]: automatic centered crop or an explicit region.
//! - [`CropParams`]: full-resolution crop written as an archival JPEG.
//! - [`ThumbnailParams`]: optional crop, then bounded downscale for working copies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// An exact aspect ratio `width:height`.
///
/// Stored as a rational so that the crop rule compares and rounds in integer
/// arithmetic; `4:5` and `8:10` describe the same crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// The default working ratio for booth captures.
    pub const PORTRAIT_4_5: AspectRatio = AspectRatio {
        width: 4,
        height: 5,
    };

    /// Ratio presets offered for custom-mode runs.
    pub const PRESETS: [(&'static str, AspectRatio); 7] = [
        ("1:1", AspectRatio::new(1, 1)),
        ("16:9", AspectRatio::new(16, 9)),
        ("4:5", AspectRatio::new(4, 5)),
        ("5:7", AspectRatio::new(5, 7)),
        ("4:3", AspectRatio::new(4, 3)),
        ("2:5", AspectRatio::new(2, 5)),
        ("3:2", AspectRatio::new(3, 2)),
    ];

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_f64(self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn is_square(self) -> bool {
        self.width == self.height
    }

    pub fn reciprocal(self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Flip the ratio so it matches the requested orientation.
    ///
    /// Square ratios have no orientation and are returned unchanged.
    pub fn oriented(self, orientation: Orientation) -> Self {
        let is_landscape = self.width > self.height;
        match orientation {
            Orientation::Portrait if is_landscape => self.reciprocal(),
            Orientation::Landscape if self.width < self.height => self.reciprocal(),
            _ => self,
        }
    }

    /// Same ratio, compared by cross-multiplication.
    pub fn same_as(self, other: AspectRatio) -> bool {
        self.width as u64 * other.height as u64 == other.width as u64 * self.height as u64
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT_4_5
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    /// Parse `"W:H"` with both parts non-zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| format!("expected W:H, got '{s}'"))?;
        let width: u32 = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
        let height: u32 = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
        if width == 0 || height == 0 {
            return Err(format!("ratio parts must be non-zero: '{s}'"));
        }
        Ok(Self::new(width, height))
    }
}

/// Orientation chosen for a ratio preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Self::Portrait),
            "landscape" => Ok(Self::Landscape),
            other => Err(format!("unknown orientation '{other}'")),
        }
    }
}

/// A crop rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl FromStr for CropRect {
    type Err = String;

    /// Parse `"x,y,w,h"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("expected x,y,w,h with non-negative integers, got '{s}'"))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(format!("expected 4 values, got {}", parts.len())),
        }
    }
}

/// Which region of the (oriented) source image to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropSpec {
    /// Largest centered rectangle at this ratio.
    Centered(AspectRatio),
    /// Explicit region, already validated against the source bounds.
    Region(CropRect),
}

/// Parameters for an archival crop: full resolution, high quality.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub crop: CropSpec,
    pub quality: Quality,
}

/// Parameters for a working copy (optional crop, then fit inside a square bound).
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub crop: Option<CropSpec>,
    /// Longest allowed edge; images already inside the bound are not upscaled.
    pub max_edge: u32,
    pub quality: Quality,
}
