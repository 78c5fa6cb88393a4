//! Custom-mode runs: hand-picked files at a chosen aspect ratio.
//!
//! Unlike a normal session there is no pairing. Every selected file becomes
//! its own target in `custom mode/output N (custom)`:
//!
//! - photos get a full-resolution copy in the session's `print/` folder
//!   (centre-cropped to the ratio when cropping is on) and a working copy
//!   next to it, minimized or byte-for-byte
//! - videos are copied into `print/` and encoded at the ratio
//!
//! Files are processed one at a time so a stop request takes effect between
//! files. Print sheets are only composed for portrait 4:5 runs, which is the
//! shape of the template slots.

use crate::derive::{DeriveError, RunDirGuard};
use crate::duplicates::DuplicateResolver;
use crate::imaging::{
    ArchiveConfig, AspectRatio, ImageBackend, WorkingConfig, create_archive, create_working_copy,
};
use crate::naming::{photo_file_name, video_file_name};
use crate::run::{
    CancelFlag, Phase, RunError, RunEvent, RunOutcome, create_output_directory, emit, finish_run,
    stopped,
};
use crate::state::AppContext;
use crate::types::{Asset, MediaKind};
use crate::video::{EncodeJob, VideoEncoder};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{info, warn};

/// Folder inside a custom session holding the full-resolution files.
pub const PRINT_DIR: &str = "print";

/// What to do with a set of hand-picked files.
#[derive(Debug, Clone)]
pub struct CustomRequest {
    pub files: Vec<PathBuf>,
    /// Target ratio, already flipped to the wanted orientation.
    pub ratio: AspectRatio,
    /// Centre-crop photos to `ratio`.
    pub crop: bool,
    /// Shrink working copies to the configured bound.
    pub minimize: bool,
    /// Compose print sheets when the ratio allows it.
    pub apply_template: bool,
}

impl CustomRequest {
    /// Whether this request can be laid out on the print template.
    pub fn composable(&self) -> bool {
        self.apply_template && self.ratio.same_as(AspectRatio::PORTRAIT_4_5)
    }
}

fn process_file(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    request: &CustomRequest,
    asset: &Asset,
    output: &Path,
    print_dir: &Path,
) -> Result<(), DeriveError> {
    let uid = ctx.ids.next_id()?;

    match asset.kind {
        MediaKind::Photo => {
            let name = photo_file_name(&uid, None);
            let full = print_dir.join(&name);
            let archive = ArchiveConfig {
                ratio: request.ratio,
                quality: ctx.config.photos.archive().quality,
            };
            if request.crop {
                create_archive(backend, &asset.path, &full, &archive)
            } else {
                // Unbounded working copy: orientation applied, never resized.
                let unbounded = WorkingConfig {
                    max_edge: u32::MAX,
                    quality: archive.quality,
                };
                create_working_copy(backend, &asset.path, &full, None, &unbounded)
            }
            .map_err(|e| DeriveError::asset(&asset.path, e))?;
            ctx.archive.insert(full.clone(), asset.path.clone());

            let working = output.join(&name);
            if request.minimize {
                create_working_copy(backend, &full, &working, None, &ctx.config.photos.working())
                    .map_err(|e| DeriveError::asset(&asset.path, e))?;
            } else {
                fs::copy(&full, &working).map_err(|e| DeriveError::asset(&asset.path, e))?;
            }
        }
        MediaKind::Video => {
            let name = video_file_name(&uid, None);
            let full = print_dir.join(&name);
            fs::copy(&asset.path, &full).map_err(|e| DeriveError::asset(&asset.path, e))?;
            encoder
                .encode(&EncodeJob {
                    input: full,
                    output: output.join(&name),
                    ratio: request.ratio,
                })
                .map_err(|e| DeriveError::asset(&asset.path, e))?;
        }
    }
    Ok(())
}

/// Process hand-picked files into a new custom-mode session.
pub fn run_custom(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    resolver: &dyn DuplicateResolver,
    request: &CustomRequest,
    cancel: &CancelFlag,
    events: Option<&Sender<RunEvent>>,
) -> Result<RunOutcome, RunError> {
    let output = create_output_directory(&ctx.custom_dir(), true)?;
    let guard = RunDirGuard::new(&output);
    let print_dir = output.join(PRINT_DIR);
    fs::create_dir_all(&print_dir)?;
    info!(
        files = request.files.len(),
        ratio = %request.ratio,
        output = %output.display(),
        "starting custom session"
    );
    emit(events, RunEvent::Started { output: output.clone() });

    let assets: Vec<Asset> = request
        .files
        .iter()
        .filter_map(|f| {
            let asset = Asset::from_path(f);
            if asset.is_none() {
                warn!(file = %f.display(), "skipping unsupported file");
            }
            asset
        })
        .collect();

    emit(events, RunEvent::Phase(Phase::Deriving));
    let total = assets.len();
    for (done, asset) in assets.iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(stopped(events));
        }
        process_file(ctx, backend, encoder, request, asset, &output, &print_dir)?;
        emit(
            events,
            RunEvent::Progress {
                phase: Phase::Deriving,
                percent: ((done + 1) * 100 / total) as u8,
            },
        );
    }
    if total == 0 {
        emit(
            events,
            RunEvent::Progress {
                phase: Phase::Deriving,
                percent: 100,
            },
        );
    }
    if cancel.is_cancelled() {
        return Ok(stopped(events));
    }

    let compose = request.composable() && ctx.template_artwork().is_some();
    if request.apply_template && !compose {
        info!(ratio = %request.ratio, "template needs portrait 4:5 and artwork, skipping");
    }
    let Some(session) = finish_run(ctx, resolver, &output, &print_dir, compose, cancel, events)?
    else {
        return Ok(stopped(events));
    };

    guard.commit();
    info!(output = %session.output.display(), targets = session.targets, "custom session complete");
    emit(events, RunEvent::Finished(session.clone()));
    Ok(RunOutcome::Completed(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::duplicates::NoDuplicates;
    use crate::imaging::CropSpec;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::state::LEDGER_FILENAME;
    use crate::video::encoder::tests::MockEncoder;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, AppContext, Vec<PathBuf>) {
        let tmp = TempDir::new().unwrap();
        let event = tmp.path().join("event");
        let picks = tmp.path().join("picks");
        fs::create_dir_all(&event).unwrap();
        fs::create_dir_all(&picks).unwrap();
        let paths = files
            .iter()
            .map(|f| {
                let p = picks.join(f);
                fs::write(&p, b"data").unwrap();
                p
            })
            .collect();
        let ctx = AppContext::with_config(&event, EventConfig::default());
        (tmp, ctx, paths)
    }

    fn request(files: Vec<PathBuf>, ratio: AspectRatio) -> CustomRequest {
        CustomRequest {
            files,
            ratio,
            crop: true,
            minimize: true,
            apply_template: true,
        }
    }

    #[test]
    fn composable_only_for_portrait_four_five() {
        let mut req = request(Vec::new(), AspectRatio::new(4, 5));
        assert!(req.composable());
        req.ratio = AspectRatio::new(5, 4);
        assert!(!req.composable());
        req.ratio = AspectRatio::new(8, 10);
        assert!(req.composable());
        req.apply_template = false;
        assert!(!req.composable());
    }

    #[test]
    fn photos_and_videos_land_in_custom_folder() {
        let (_tmp, ctx, files) = setup(&["a.jpg", "b.mov", "notes.txt"]);
        let backend = MockBackend::new();
        let encoder = MockEncoder::new();
        let ratio = AspectRatio::new(1, 1);

        let outcome = run_custom(
            &ctx,
            &backend,
            &encoder,
            &NoDuplicates,
            &request(files, ratio),
            &CancelFlag::new(),
            None,
        )
        .unwrap();
        let RunOutcome::Completed(session) = outcome else {
            panic!("run did not complete");
        };
        assert!(session.custom);
        assert_eq!(session.output, ctx.custom_dir().join("output 1 (custom)"));
        assert_eq!(session.targets, 1);

        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Crop { crop: CropSpec::Centered(r), .. } if *r == ratio
        ));
        assert!(matches!(&ops[1], RecordedOp::Thumbnail { max_edge: 1200, .. }));

        let jobs = encoder.get_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].ratio, ratio);
        assert!(jobs[0].input.starts_with(session.output.join(PRINT_DIR)));

        let ledger = fs::read_to_string(ctx.event_dir().join(LEDGER_FILENAME)).unwrap();
        assert!(ledger.contains("Total Sessions: 1"));
    }

    #[test]
    fn uncropped_full_copy_is_unbounded() {
        let (_tmp, ctx, files) = setup(&["a.jpg"]);
        let backend = MockBackend::new();
        let mut req = request(files, AspectRatio::PORTRAIT_4_5);
        req.crop = false;
        req.minimize = false;

        run_custom(
            &ctx,
            &backend,
            &MockEncoder::new(),
            &NoDuplicates,
            &req,
            &CancelFlag::new(),
            None,
        )
        .unwrap();
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Thumbnail { crop: None, max_edge: u32::MAX, quality: 95, .. }
        ));
    }

    #[test]
    fn stopped_custom_run_removes_folder() {
        let (_tmp, ctx, files) = setup(&["a.jpg"]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = run_custom(
            &ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &NoDuplicates,
            &request(files, AspectRatio::PORTRAIT_4_5),
            &cancel,
            None,
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert!(!ctx.custom_dir().join("output 1 (custom)").exists());
    }

    #[test]
    fn encoder_failure_removes_folder() {
        let (_tmp, ctx, files) = setup(&["clip.mov"]);
        let err = run_custom(
            &ctx,
            &MockBackend::new(),
            &MockEncoder::failing_on("_v"),
            &NoDuplicates,
            &request(files, AspectRatio::PORTRAIT_4_5),
            &CancelFlag::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Derive(DeriveError::Asset { .. })));
        assert!(!ctx.custom_dir().join("output 1 (custom)").exists());
    }
}
