//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the derivation
//! pipeline and the crop tools need: identify, crop (archival), and
//! thumbnail (working copy).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` below.

use super::params::{CropParams, ThumbnailParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions, after EXIF orientation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image processing backends.
///
/// `Sync` because derivation units share one backend across the rayon pool.
pub trait ImageBackend: Sync {
    /// Oriented dimensions of an image on disk.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Orient, crop and write a full-resolution JPEG. Returns the written size.
    fn crop(&self, params: &CropParams) -> Result<Dimensions, BackendError>;

    /// Orient, optionally crop, shrink into the bound and write a JPEG.
    /// Returns the written size.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<Dimensions, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{AspectRatio, CropSpec, Quality};
    use std::sync::Mutex;

    /// Mock backend that records operations without decoding anything.
    ///
    /// Crop and thumbnail write an empty file at the output path so the
    /// pipeline's filesystem bookkeeping behaves as in production. Any source
    /// path containing one of `fail_on` makes the operation fail.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Mutex<Option<Dimensions>>,
        pub fail_on: Vec<String>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Crop {
            source: String,
            output: String,
            crop: CropSpec,
            quality: u32,
        },
        Thumbnail {
            source: String,
            output: String,
            crop: Option<CropSpec>,
            max_edge: u32,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Mutex::new(Some(Dimensions { width, height })),
                ..Self::default()
            }
        }

        pub fn failing_on(pattern: &str) -> Self {
            Self {
                fail_on: vec![pattern.to_string()],
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn check(&self, source: &Path) -> Result<(), BackendError> {
            let s = source.to_string_lossy();
            if self.fail_on.iter().any(|p| s.contains(p.as_str())) {
                return Err(BackendError::ProcessingFailed(format!(
                    "mock failure for {s}"
                )));
            }
            Ok(())
        }

        fn dims(&self) -> Dimensions {
            self.dimensions.lock().unwrap().unwrap_or(Dimensions {
                width: 1600,
                height: 2000,
            })
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));
            self.check(path)?;
            Ok(self.dims())
        }

        fn crop(&self, params: &CropParams) -> Result<Dimensions, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Crop {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                crop: params.crop,
                quality: params.quality.value(),
            });
            self.check(&params.source)?;
            std::fs::write(&params.output, b"")?;
            Ok(self.dims())
        }

        fn thumbnail(&self, params: &ThumbnailParams) -> Result<Dimensions, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Thumbnail {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                crop: params.crop,
                max_edge: params.max_edge,
                quality: params.quality.value(),
            });
            self.check(&params.source)?;
            std::fs::write(&params.output, b"")?;
            Ok(self.dims())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(result.as_tuple(), (800, 600));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_records_crop_and_writes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = tmp.path().join("out.jpg");
        let backend = MockBackend::new();

        backend
            .crop(&CropParams {
                source: "/source.jpg".into(),
                output: output.clone(),
                crop: CropSpec::Centered(AspectRatio::PORTRAIT_4_5),
                quality: Quality::new(95),
            })
            .unwrap();

        assert!(output.exists());
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Crop { quality: 95, .. }
        ));
    }

    #[test]
    fn mock_fails_on_matching_source() {
        let backend = MockBackend::failing_on("broken");
        let err = backend.identify(Path::new("/in/broken.jpg")).unwrap_err();
        assert!(err.to_string().contains("broken.jpg"));
        assert!(backend.identify(Path::new("/in/fine.jpg")).is_ok());
    }
}
