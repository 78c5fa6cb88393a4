//! Photo/video pairing.
//!
//! Every booth capture produces a photo and a short video whose file names
//! share a running counter. Cameras skip numbers and retakes shift them, so
//! pairing is nearest-neighbour rather than strict equality.
//!
//! Photos are visited in ascending number order (photos without a number
//! last). Each claims one unused video:
//!
//! 1. **exact**: same number, first in listing order
//! 2. **backward**: largest number not above the photo's
//! 3. **forward**: smallest number above the photo's
//!
//! Equal candidates resolve to the one listed first. Photos without a number
//! may only take a video without a number; they never fall back. A photo that
//! finds nothing fails the whole run.
//!
//! `_copy` photos pair like any other photo and are additionally listed as
//! standalone entries, which do not consume a video.

use crate::types::{Asset, MediaKind};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum PairingError {
    #[error("No video found for {}", .image.display())]
    NoVideo { image: PathBuf },
}

/// One photo with the video it claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub photo: Asset,
    pub video: Asset,
}

/// Result of pairing one input folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingPlan {
    /// Canonical pairs in the order photos were visited.
    pub pairs: Vec<Pair>,
    /// `_copy` photos processed again on their own.
    pub standalone: Vec<Asset>,
}

impl PairingPlan {
    /// Number of derivation units: two per pair, one per standalone photo.
    pub fn unit_count(&self) -> usize {
        self.pairs.len() * 2 + self.standalone.len()
    }
}

/// Supported files directly inside `dir`, split by kind, sorted by file name.
pub fn list_assets(dir: &Path) -> io::Result<(Vec<Asset>, Vec<Asset>)> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let (photos, videos): (Vec<Asset>, Vec<Asset>) = entries
        .into_iter()
        .filter_map(Asset::from_path)
        .partition(|a| a.kind == MediaKind::Photo);
    Ok((photos, videos))
}

/// Pair photos with videos. See the [module docs](self) for the rules.
pub fn pair_assets(photos: &[Asset], videos: &[Asset]) -> Result<PairingPlan, PairingError> {
    let mut order: Vec<&Asset> = photos.iter().collect();
    // Stable: equal numbers keep listing order.
    order.sort_by_key(|a| (a.number.is_none(), a.number));

    let mut used = vec![false; videos.len()];
    let mut pairs = Vec::with_capacity(order.len());

    for photo in order {
        let Some(idx) = claim_video(photo.number, videos, &used) else {
            error!(image = %photo.path.display(), "no video found");
            return Err(PairingError::NoVideo {
                image: photo.path.clone(),
            });
        };
        used[idx] = true;
        debug!(
            photo = %photo.file_name(),
            video = %videos[idx].file_name(),
            "paired"
        );
        pairs.push(Pair {
            photo: photo.clone(),
            video: videos[idx].clone(),
        });
    }

    let standalone = photos.iter().filter(|a| a.is_copy).cloned().collect();
    Ok(PairingPlan { pairs, standalone })
}

fn unused<'a>(videos: &'a [Asset], used: &'a [bool]) -> impl Iterator<Item = (usize, &'a Asset)> {
    videos.iter().enumerate().filter(move |(i, _)| !used[*i])
}

/// Index of the video a photo with `number` claims, if any.
fn claim_video(number: Option<u64>, videos: &[Asset], used: &[bool]) -> Option<usize> {
    if let Some(exact) = unused(videos, used).find(|(_, v)| v.number == number) {
        return Some(exact.0);
    }

    let n = number?;
    let mut backward: Option<(usize, u64)> = None;
    let mut forward: Option<(usize, u64)> = None;
    for (i, v) in unused(videos, used) {
        let Some(vn) = v.number else { continue };
        if vn <= n {
            if backward.is_none_or(|(_, best)| vn > best) {
                backward = Some((i, vn));
            }
        } else if forward.is_none_or(|(_, best)| vn < best) {
            forward = Some((i, vn));
        }
    }
    backward.or(forward).map(|(i, _)| i)
}
