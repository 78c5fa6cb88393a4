//! Derivation: archival and working copies for every paired capture.
//!
//! Each [`Pair`] yields two independent units sharing one identifier, and
//! every standalone `_copy` photo yields one more with an identifier of its
//! own:
//!
//! ```text
//! IMG_0042.jpg ──► digital/photos/20240501_12345_p.jpg   (4:5, q95, full size)
//!                  └─► output 3/20240501_12345_p.jpg     (≤1200px, q85)
//! MOV_0042.mov ──► digital/videos/20240501_12345_v.mov   (byte copy)
//!                  └─► output 3/20240501_12345_v.mov     (cropped, 480p)
//! ```
//!
//! Units run on a dedicated rayon pool capped by `[processing] max_processes`.
//! The first failure is returned once in-flight units have drained, and the
//! output directory is removed before the error reaches the caller. Archival
//! files already written stay in `digital/`, since they are named by fresh
//! identifiers and never collide.

use crate::config::effective_threads;
use crate::imaging::{ImageBackend, create_archive, create_working_copy};
use crate::naming::{photo_file_name, video_file_name};
use crate::pairing::{PairingError, PairingPlan, list_assets, pair_assets};
use crate::state::{AppContext, StateError};
use crate::video::{EncodeJob, VideoEncoder};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum DeriveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Pairing(#[from] PairingError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to process {}: {message}", .path.display())]
    Asset { path: PathBuf, message: String },
}

impl DeriveError {
    pub(crate) fn asset(path: &Path, err: impl std::fmt::Display) -> Self {
        DeriveError::Asset {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Removes a run directory on drop unless [`commit`](Self::commit) was called.
#[derive(Debug)]
pub struct RunDirGuard {
    path: PathBuf,
    committed: bool,
}

impl RunDirGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for RunDirGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => info!(dir = %self.path.display(), "removed incomplete output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.path.display(), error = %e, "failed to remove output"),
        }
    }
}

/// Monotonic percentage reporter shared by the workers.
///
/// Reports only when the integer percentage grows, so 100 is reported
/// exactly once.
struct ProgressTracker<'a> {
    total: usize,
    state: Mutex<(usize, u8)>,
    report: &'a (dyn Fn(u8) + Sync),
}

impl<'a> ProgressTracker<'a> {
    fn new(total: usize, report: &'a (dyn Fn(u8) + Sync)) -> Self {
        Self {
            total,
            state: Mutex::new((0, 0)),
            report,
        }
    }

    fn unit_done(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.0 += 1;
        let pct = ((state.0 * 100) / self.total.max(1)).min(100) as u8;
        if pct > state.1 {
            state.1 = pct;
            (self.report)(pct);
        }
    }

    fn finish_empty(&self) {
        if self.total == 0 {
            (self.report)(100);
        }
    }
}

/// One file to derive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Photo { source: PathBuf, name: String },
    Video { source: PathBuf, name: String },
}

impl Unit {
    pub fn source(&self) -> &Path {
        match self {
            Unit::Photo { source, .. } | Unit::Video { source, .. } => source,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Unit::Photo { name, .. } | Unit::Video { name, .. } => name,
        }
    }
}

/// Assign identifiers and output names.
///
/// Returns the units and the working photo names in pairing order.
pub fn plan_units(
    ctx: &AppContext,
    plan: &PairingPlan,
) -> Result<(Vec<Unit>, Vec<String>), DeriveError> {
    let mut units = Vec::with_capacity(plan.unit_count());
    let mut photos = Vec::with_capacity(plan.pairs.len() + plan.standalone.len());

    for pair in &plan.pairs {
        let uid = ctx.ids.next_id()?;
        let name = photo_file_name(&uid, pair.photo.copy_index);
        photos.push(name.clone());
        units.push(Unit::Photo {
            source: pair.photo.path.clone(),
            name,
        });
        units.push(Unit::Video {
            source: pair.video.path.clone(),
            name: video_file_name(&uid, pair.video.copy_index),
        });
    }

    for copy in &plan.standalone {
        let uid = ctx.ids.next_id()?;
        let name = photo_file_name(&uid, Some(copy.copy_index.unwrap_or(1)));
        photos.push(name.clone());
        units.push(Unit::Photo {
            source: copy.path.clone(),
            name,
        });
    }

    Ok((units, photos))
}

/// Pair and derive everything in `input_dir` into the existing `output_dir`.
///
/// `progress` receives increasing percentages ending in exactly one 100.
/// Returns the working photo names. On error `output_dir` has been removed.
pub fn derive_directory(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    input_dir: &Path,
    output_dir: &Path,
    progress: &(dyn Fn(u8) + Sync),
) -> Result<Vec<String>, DeriveError> {
    let guard = RunDirGuard::new(output_dir);

    let (photos, videos) = list_assets(input_dir)?;
    info!(
        photos = photos.len(),
        videos = videos.len(),
        input = %input_dir.display(),
        "pairing"
    );
    let plan = pair_assets(&photos, &videos)?;
    let (units, names) = plan_units(ctx, &plan)?;
    run_units(ctx, backend, encoder, &units, output_dir, progress)?;

    guard.commit();
    Ok(names)
}

/// Run units on a pool sized by the processing config.
pub fn run_units(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    units: &[Unit],
    output_dir: &Path,
    progress: &(dyn Fn(u8) + Sync),
) -> Result<(), DeriveError> {
    ctx.ensure_digital_dirs()?;
    let tracker = ProgressTracker::new(units.len(), progress);
    let threads = effective_threads(&ctx.config.processing);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    debug!(threads, units = units.len(), "deriving");

    pool.install(|| {
        units.par_iter().try_for_each(|unit| {
            derive_unit(ctx, backend, encoder, unit, output_dir).inspect_err(|e| {
                error!(error = %e, "derivation failed");
            })?;
            tracker.unit_done();
            Ok::<(), DeriveError>(())
        })
    })?;

    tracker.finish_empty();
    Ok(())
}

fn derive_unit(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    unit: &Unit,
    output_dir: &Path,
) -> Result<(), DeriveError> {
    match unit {
        Unit::Photo { source, name } => {
            let archival = ctx.digital_photos().join(name);
            let photos = &ctx.config.photos;
            create_archive(backend, source, &archival, &photos.archive())
                .map_err(|e| DeriveError::asset(source, e))?;
            ctx.archive.insert(archival.clone(), source.clone());
            create_working_copy(
                backend,
                &archival,
                &output_dir.join(name),
                None,
                &photos.working(),
            )
            .map_err(|e| DeriveError::asset(source, e))?;
        }
        Unit::Video { source, name } => {
            let archival = ctx.digital_videos().join(name);
            fs::copy(source, &archival).map_err(|e| DeriveError::asset(source, e))?;
            encoder
                .encode(&EncodeJob {
                    input: archival,
                    output: output_dir.join(name),
                    ratio: ctx.config.photos.ratio(),
                })
                .map_err(|e| DeriveError::asset(source, e))?;
        }
    }
    debug!(source = %unit.source().display(), name = unit.name(), "derived");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::video::encoder::tests::MockEncoder;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        ctx: AppContext,
        input: PathBuf,
        output: PathBuf,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let event = tmp.path().join("Party_2024-05-01");
        let input = tmp.path().join("card");
        let output = event.join("output 1");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        for f in files {
            fs::write(input.join(f), b"data").unwrap();
        }
        Fixture {
            ctx: AppContext::with_config(&event, EventConfig::default()),
            _tmp: tmp,
            input,
            output,
        }
    }

    fn collect_progress() -> (Mutex<Vec<u8>>, impl Fn(&Mutex<Vec<u8>>, u8)) {
        (Mutex::new(Vec::new()), |seen: &Mutex<Vec<u8>>, p| {
            seen.lock().unwrap().push(p)
        })
    }

    #[test]
    fn derives_archival_and_working_copies() {
        let f = fixture(&["IMG_1.jpg", "IMG_2.jpg", "MOV_1.mov", "MOV_2.mov"]);
        let backend = MockBackend::new();
        let encoder = MockEncoder::new();
        let (seen, push) = collect_progress();

        let names = derive_directory(
            &f.ctx,
            &backend,
            &encoder,
            &f.input,
            &f.output,
            &|p| push(&seen, p),
        )
        .unwrap();

        assert_eq!(names.len(), 2);
        for name in &names {
            assert!(name.ends_with("_p.jpg"));
            assert!(f.ctx.digital_photos().join(name).exists());
            assert!(f.output.join(name).exists());
            let video = name.replace("_p.jpg", "_v.mov");
            assert!(f.ctx.digital_videos().join(&video).exists());
            assert!(f.output.join(&video).exists());
        }
        assert_eq!(f.ctx.archive.len(), 2);

        let jobs = encoder.get_jobs();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.input.starts_with(f.ctx.digital_videos())));

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn working_copy_is_made_from_archival() {
        let f = fixture(&["IMG_1.jpg", "MOV_1.mov"]);
        let backend = MockBackend::new();
        derive_directory(&f.ctx, &backend, &MockEncoder::new(), &f.input, &f.output, &|_| {})
            .unwrap();

        let ops = backend.get_operations();
        let thumb_source = ops
            .iter()
            .find_map(|op| match op {
                RecordedOp::Thumbnail { source, crop, .. } => {
                    assert!(crop.is_none());
                    Some(source.clone())
                }
                _ => None,
            })
            .unwrap();
        assert!(thumb_source.contains("digital/photos"));
    }

    #[test]
    fn pair_shares_identifier() {
        let f = fixture(&["IMG_7.jpg", "MOV_7.mov"]);
        derive_directory(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &f.input,
            &f.output,
            &|_| {},
        )
        .unwrap();

        let mut names: Vec<String> = fs::read_dir(&f.output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0][..14], names[1][..14]);
    }

    #[test]
    fn copy_variant_is_derived_twice() {
        let f = fixture(&["IMG_1.jpg", "IMG_1_copy1.jpg", "MOV_1.mov", "MOV_2.mov"]);
        let names = derive_directory(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &f.input,
            &f.output,
            &|_| {},
        )
        .unwrap();

        // Two pairs plus one standalone copy.
        assert_eq!(names.len(), 3);
        assert_eq!(names.iter().filter(|n| n.contains("_copy1")).count(), 2);
        let photos = fs::read_dir(f.ctx.digital_photos()).unwrap().count();
        assert_eq!(photos, 3);
    }

    #[test]
    fn backend_failure_removes_output_dir() {
        let f = fixture(&["IMG_1.jpg", "IMG_2.jpg", "MOV_1.mov", "MOV_2.mov"]);
        let backend = MockBackend::failing_on("IMG_2");

        let err = derive_directory(
            &f.ctx,
            &backend,
            &MockEncoder::new(),
            &f.input,
            &f.output,
            &|_| {},
        )
        .unwrap_err();

        assert!(
            matches!(&err, DeriveError::Asset { path, .. } if path.ends_with("IMG_2.jpg")),
            "{err}"
        );
        assert!(!f.output.exists());
    }

    #[test]
    fn encoder_failure_removes_output_dir() {
        let f = fixture(&["IMG_1.jpg", "MOV_1.mov"]);
        let err = derive_directory(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::failing_on("_v"),
            &f.input,
            &f.output,
            &|_| {},
        )
        .unwrap_err();
        assert!(matches!(&err, DeriveError::Asset { path, .. } if path.ends_with("MOV_1.mov")));
        assert!(!f.output.exists());
    }

    #[test]
    fn unpaired_photo_removes_output_dir() {
        let f = fixture(&["IMG_1.jpg", "IMG_2.jpg", "IMG_3.jpg", "MOV_2.mov"]);
        let err = derive_directory(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &f.input,
            &f.output,
            &|_| {},
        )
        .unwrap_err();
        assert!(matches!(err, DeriveError::Pairing(_)));
        assert!(!f.output.exists());
    }

    #[test]
    fn empty_input_reports_100_once() {
        let f = fixture(&[]);
        let (seen, push) = collect_progress();
        let names = derive_directory(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &f.input,
            &f.output,
            &|p| push(&seen, p),
        )
        .unwrap();
        assert!(names.is_empty());
        assert_eq!(seen.into_inner().unwrap(), vec![100]);
        assert!(f.output.exists());
    }

    #[test]
    fn guard_commit_keeps_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("output 1");
        fs::create_dir(&dir).unwrap();
        RunDirGuard::new(&dir).commit();
        assert!(dir.exists());
        drop(RunDirGuard::new(&dir));
        assert!(!dir.exists());
    }
}
