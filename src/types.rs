//! Shared types used across all pipeline stages.
//!
//! An [`Asset`] is classified once, when the input folder is listed. Every
//! later stage dispatches on [`MediaKind`] instead of looking at extensions
//! again.

use crate::naming::{SequenceKey, copy_index, is_copy_variant, parse_sequence};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extensions accepted as photos (lowercase).
pub const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Extensions accepted as videos (lowercase).
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "avi", "mkv"];

/// What a capture file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify a path by extension, case-insensitively.
    pub fn of(path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Whether `path` has a photo extension.
pub fn is_photo(path: &Path) -> bool {
    MediaKind::of(path) == Some(MediaKind::Photo)
}

/// One input capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Sequence number read from the file name.
    pub number: Option<u64>,
    /// Name carries `_copy`, so the photo is also emitted on its own.
    pub is_copy: bool,
    /// `k` from `_copy{k}`.
    pub copy_index: Option<u32>,
}

impl Asset {
    /// Build an asset from a path, or `None` for unsupported extensions.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Asset> {
        let path = path.into();
        let kind = MediaKind::of(&path)?;
        let name = path.file_name()?.to_string_lossy().into_owned();
        let SequenceKey { number, .. } = parse_sequence(&name);
        Some(Asset {
            kind,
            number,
            is_copy: is_copy_variant(&name),
            copy_index: copy_index(&name),
            path,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
