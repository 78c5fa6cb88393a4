//! Shared test utilities: synthetic images and pixel-region fingerprints.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let photo = tmp.path().join("IMG_0001.jpg");
//! create_solid_jpeg(&photo, 400, 500, [200, 30, 30]);
//!
//! let sheet = image::open(&sheet_path).unwrap().to_rgb8();
//! assert_eq!(region_digest(&sheet, 0, 0, 10, 10), region_digest(&sheet, 900, 0, 10, 10));
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use std::path::Path;

// =========================================================================
// Synthetic images
// =========================================================================

/// Gradient JPEG, so crops and resizes are visible in the output.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    img.save(path).unwrap();
}

/// Gradient JPEG carrying an EXIF Orientation tag.
///
/// `width` and `height` are the stored pixel size. The APP1 segment holds a
/// big-endian TIFF header with one IFD entry (0x0112, SHORT) and is placed
/// directly after SOI.
pub fn create_oriented_jpeg(path: &Path, width: u32, height: u32, orientation: u16) {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 90))
        .unwrap();

    let [hi, lo] = orientation.to_be_bytes();
    let mut tiff = vec![b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
    tiff.extend_from_slice(&[0x00, 0x01]);
    tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, hi, lo, 0x00, 0x00]);
    tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(&tiff);
    let len = (app1.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, out).unwrap();
}

/// Single-colour JPEG.
pub fn create_solid_jpeg(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(rgb))
        .save(path)
        .unwrap();
}

/// Single-colour PNG, used as template artwork.
pub fn create_solid_png(path: &Path, width: u32, height: u32, rgb: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(rgb))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

// =========================================================================
// Pixel fingerprints
// =========================================================================

/// SHA-256 hex digest of a rectangular region's raw RGB bytes.
///
/// Panics if the region leaves the image.
pub fn region_digest(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> String {
    assert!(
        x + width <= img.width() && y + height <= img.height(),
        "region {x},{y} {width}x{height} outside {}x{}",
        img.width(),
        img.height()
    );
    let mut hasher = Sha256::new();
    for row in y..y + height {
        for col in x..x + width {
            hasher.update(img.get_pixel(col, row).0);
        }
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[test]
fn region_digest_distinguishes_colours() {
    let mut img = RgbImage::from_pixel(20, 10, Rgb([0, 0, 0]));
    for y in 0..10 {
        for x in 10..20 {
            img.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    assert_eq!(region_digest(&img, 0, 0, 5, 5), region_digest(&img, 4, 4, 5, 5));
    assert_ne!(region_digest(&img, 0, 0, 5, 5), region_digest(&img, 12, 0, 5, 5));
}
