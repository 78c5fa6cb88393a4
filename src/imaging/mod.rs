//! Image processing: pure Rust via the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | decoder dimensions + EXIF orientation |
//! | **Archive** | orient, centered crop, JPEG q95 |
//! | **Working copy** | orient, optional crop, Lanczos3 shrink, JPEG q85 |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for crop and resize geometry (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{centered_crop, constrain_override, cover_plan, fit_within, mm_to_px};
pub use operations::{
    ArchiveConfig, WorkingConfig, create_archive, create_working_copy, get_dimensions,
};
pub use params::{
    AspectRatio, CropParams, CropRect, CropSpec, Orientation, Quality, ThumbnailParams,
};
pub use rust_backend::RustBackend;
pub(crate) use rust_backend::load_oriented;
