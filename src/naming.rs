//! Filename conventions: sequence numbers, custom markers and copy suffixes.
//!
//! Booth cameras name captures with a running counter (`IMG_0042.JPG`,
//! `clip 42.mov`). The number is how a photo finds its video, so extraction
//! follows two rules:
//!
//! - `42 (custom)` anywhere in the name: `42` wins, whatever other digits exist
//! - otherwise the **last** run of digits: `2024-05-01 IMG_0042.jpg` → `42`
//!
//! Names without digits have no number. That is not an error; such files only
//! ever match each other.
//!
//! ## Derived names
//!
//! | Item | Pattern |
//! |---|---|
//! | photo | `{uid}_p.jpg`, `{uid}_p_copy{k}.jpg` |
//! | video | `{uid}_v.mov`, `{uid}_v_copy{k}.mov` |
//! | duplicate | `{stem}_copy{k}{.ext}` |
//! | run folder | `output {n}`, `output {n} (custom)` |
//! | reprint folder | `template_output({i})` |

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static RE_CUSTOM_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^.*?\b(\d+)\s*\(custom\)").unwrap());
static RE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static RE_COPY_INDEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)_copy(\d+)").unwrap());
static RE_DUPLICATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+\)$").unwrap());
static RE_TRAILING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)$").unwrap());

/// Marker for output folders and files produced in custom mode.
pub const CUSTOM_MARKER: &str = "(custom)";

/// Sequence information carried by a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceKey {
    /// Sequence number, if any digits are present.
    pub number: Option<u64>,
    /// Whether the name carries the `(custom)` marker.
    pub custom: bool,
}

/// Extract the sequence key from a file or folder name.
///
/// A digit run too long for `u64` counts as no number.
pub fn parse_sequence(name: &str) -> SequenceKey {
    SequenceKey {
        number: extract_number(name),
        custom: is_custom(name),
    }
}

/// The sequence number of a name, see the [module docs](self).
pub fn extract_number(name: &str) -> Option<u64> {
    if let Some(caps) = RE_CUSTOM_NUMBER.captures(name) {
        return caps[1].parse().ok();
    }
    RE_DIGITS
        .find_iter(name)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether a name contains the `(custom)` marker, case-insensitively.
pub fn is_custom(name: &str) -> bool {
    name.to_lowercase().contains(CUSTOM_MARKER)
}

/// Whether a name is a `_copy` variant of another capture.
pub fn is_copy_variant(name: &str) -> bool {
    name.to_lowercase().contains("_copy")
}

/// The `k` in `_copy{k}`, if present.
pub fn copy_index(name: &str) -> Option<u32> {
    RE_COPY_INDEX
        .captures(name)
        .and_then(|c| c[1].parse().ok())
}

/// Remove a trailing ` (N)` that file managers append to duplicates.
///
/// `"shot (2)"` → `"shot"`, `"shot"` → `"shot"`.
pub fn strip_duplicate_suffix(stem: &str) -> &str {
    match RE_DUPLICATE_SUFFIX.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

/// Sort key that groups a shot with its copies, copies by index ascending.
///
/// Returns `(base stem, copy index)` with index 0 for the original.
pub fn copy_sort_key(path: &Path) -> (String, u32) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match copy_index(&stem) {
        Some(k) => (RE_COPY_INDEX.replace_all(&stem, "").into_owned(), k),
        None => (strip_duplicate_suffix(&stem).to_string(), 0),
    }
}

fn copy_suffix(copy: Option<u32>) -> String {
    copy.map(|k| format!("_copy{k}")).unwrap_or_default()
}

/// `{uid}_p[_copy{k}].jpg`
pub fn photo_file_name(uid: &str, copy: Option<u32>) -> String {
    format!("{uid}_p{}.jpg", copy_suffix(copy))
}

/// `{uid}_v[_copy{k}].mov`
pub fn video_file_name(uid: &str, copy: Option<u32>) -> String {
    format!("{uid}_v{}.mov", copy_suffix(copy))
}

/// Sibling path `{stem}_copy{k}{.ext}`.
pub fn copy_path(path: &Path, k: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_copy{k}.{}", ext.to_string_lossy()),
        None => format!("{stem}_copy{k}"),
    };
    path.with_file_name(name)
}

/// Path with any ` (N)` suffix removed from the stem.
pub fn normalized_path(path: &Path) -> PathBuf {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    let clean = strip_duplicate_suffix(&stem);
    if clean.len() == stem.len() {
        return path.to_path_buf();
    }
    let name = match path.extension() {
        Some(ext) => format!("{clean}.{}", ext.to_string_lossy()),
        None => clean.to_string(),
    };
    path.with_file_name(name)
}

/// Prefix shared by every run folder name.
pub const OUTPUT_PREFIX: &str = "output";

/// `output {n}` or `output {n} (custom)`.
pub fn output_folder_name(n: usize, custom: bool) -> String {
    if custom {
        format!("{OUTPUT_PREFIX} {n} {CUSTOM_MARKER}")
    } else {
        format!("{OUTPUT_PREFIX} {n}")
    }
}

/// `template_output({i})`, the folder for an additional print batch.
pub fn reprint_folder_name(i: usize) -> String {
    format!("template_output({i})")
}

/// Number at the very end of a name, e.g. `output 12` → 12.
pub fn trailing_number(name: &str) -> Option<u64> {
    RE_TRAILING_NUMBER
        .captures(name)
        .and_then(|c| c[1].parse().ok())
}
