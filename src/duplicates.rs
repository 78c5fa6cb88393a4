//! Extra print copies and the file shuffling around them.
//!
//! After derivation the operator chooses how many prints each shot gets. A
//! count of `n` puts `n - 1` byte copies next to the working photo
//! (`x_p_copy1.jpg`, `x_p_copy2.jpg`, ...) so the compositor lays them out
//! like any other photo. The copies only exist for the compositing pass and
//! are removed afterwards.

use crate::naming::{copy_path, normalized_path};
use crate::state::AppContext;
use crate::types::is_photo;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decides how many prints each working photo gets.
///
/// Stands in for the interactive picker: implementations may ask a person,
/// read CLI flags, or return a fixed answer.
pub trait DuplicateResolver {
    /// Copy counts by working photo path. Photos not in the map get one.
    fn resolve(&self, output_dir: &Path, photos: &[PathBuf]) -> BTreeMap<PathBuf, u32>;
}

/// Every photo printed once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDuplicates;

impl DuplicateResolver for NoDuplicates {
    fn resolve(&self, _: &Path, _: &[PathBuf]) -> BTreeMap<PathBuf, u32> {
        BTreeMap::new()
    }
}

/// Counts from configuration: one default plus overrides by file name.
#[derive(Debug, Clone, Default)]
pub struct CopyCounts {
    pub default: Option<u32>,
    pub by_name: BTreeMap<String, u32>,
}

impl CopyCounts {
    /// Parse `name=count` pairs.
    pub fn parse_overrides(pairs: &[String]) -> Result<BTreeMap<String, u32>, String> {
        pairs
            .iter()
            .map(|pair| {
                let (name, count) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected NAME=COUNT, got '{pair}'"))?;
                let count: u32 = count
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid count in '{pair}'"))?;
                Ok((name.trim().to_string(), count))
            })
            .collect()
    }
}

impl DuplicateResolver for CopyCounts {
    fn resolve(&self, _: &Path, photos: &[PathBuf]) -> BTreeMap<PathBuf, u32> {
        photos
            .iter()
            .filter_map(|p| {
                let name = p.file_name()?.to_string_lossy();
                let count = self.by_name.get(name.as_ref()).copied().or(self.default)?;
                Some((p.clone(), count))
            })
            .collect()
    }
}

/// Write `n - 1` copies of `path` as `stem_copy1..stem_copy{n-1}`.
pub fn make_copies(path: &Path, n: u32) -> io::Result<Vec<PathBuf>> {
    (1..n.max(1))
        .map(|k| {
            let dest = copy_path(path, k);
            fs::copy(path, &dest)?;
            Ok(dest)
        })
        .collect()
}

/// Apply every count, returning all copies written.
pub fn apply_counts(counts: &BTreeMap<PathBuf, u32>) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (path, &n) in counts {
        written.extend(make_copies(path, n)?);
    }
    debug!(copies = written.len(), "made print copies");
    Ok(written)
}

/// Photos directly inside `dir`, sorted by name.
pub fn list_photos(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut photos: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_photo(p))
        .collect();
    photos.sort();
    Ok(photos)
}

/// Rename photos in `dir` to drop a ` (N)` suffix and return the new list.
///
/// A rename that would overwrite an existing file is skipped.
pub fn normalize_names(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for path in list_photos(dir)? {
        let clean = normalized_path(&path);
        if clean == path {
            result.push(path);
        } else if clean.exists() {
            warn!(file = %path.display(), "normalized name already taken");
            result.push(path);
        } else {
            fs::rename(&path, &clean)?;
            debug!(from = %path.display(), to = %clean.display(), "normalized");
            result.push(clean);
        }
    }
    result.sort();
    Ok(result)
}

/// Full-resolution image to print for each working photo.
///
/// The archival copy with the same name when it exists, otherwise the working
/// file itself. Crop overrides then swap archival files for the re-cropped
/// working copy. `archive_dir` lets custom mode point at its `print/` folder.
pub fn print_sources(ctx: &AppContext, working: &[PathBuf], archive_dir: &Path) -> Vec<PathBuf> {
    working
        .iter()
        .map(|w| {
            let archival = w
                .file_name()
                .map(|n| archive_dir.join(n))
                .filter(|p| p.exists());
            match archival {
                Some(a) => ctx.crops.substitute(&a),
                None => w.clone(),
            }
        })
        .collect()
}

/// Delete the given copies, ignoring ones already gone.
pub fn remove_copies(copies: &[PathBuf]) -> usize {
    copies
        .iter()
        .filter(|p| match fs::remove_file(p) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(file = %p.display(), error = %e, "failed to remove copy");
                false
            }
        })
        .count()
}
