//! End-to-end session runs.
//!
//! A run turns one input folder into a numbered `output N` folder:
//!
//! 1. **derive**: pair captures, write archival and working copies
//! 2. **copies**: ask the [`DuplicateResolver`] for extra prints per photo
//! 3. **compose**: lay the photos out on print sheets, when the event has
//!    template artwork
//! 4. **ledger**: renumber folders, recount, rewrite `event_data.txt`
//!
//! Cancellation is checked between phases. A stopped or failed run leaves no
//! `output N` folder behind.

use crate::derive::{DeriveError, RunDirGuard, derive_directory};
use crate::duplicates::{
    DuplicateResolver, apply_counts, list_photos, normalize_names, print_sources, remove_copies,
};
use crate::imaging::ImageBackend;
use crate::ledger::{LedgerError, Session, SessionLedger, TEMPLATE_OUTPUT_DIR, session_from_folder, update_event_data};
use crate::naming::output_folder_name;
use crate::print::{PrintError, compose_session};
use crate::state::{AppContext, StateError};
use crate::video::VideoEncoder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Derive(#[from] DeriveError),
    #[error(transparent)]
    Print(#[from] PrintError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Shared stop request, checked at phase boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stage of a run, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Deriving,
    Copies,
    Composing,
    Ledger,
}

/// Progress events sent while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { output: PathBuf },
    Phase(Phase),
    Progress { phase: Phase, percent: u8 },
    Composed { sheets: usize },
    Finished(Session),
    Stopped,
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(Session),
    Stopped,
}

pub(crate) fn emit(events: Option<&Sender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is listening.
        tx.send(event).ok();
    }
}

/// Create the first free `output N` (or `output N (custom)`) in `base`.
pub fn create_output_directory(base: &Path, custom: bool) -> io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let mut n = 1;
    loop {
        let dir = base.join(output_folder_name(n, custom));
        if !dir.exists() {
            fs::create_dir(&dir)?;
            return Ok(dir);
        }
        n += 1;
    }
}

/// The session for `output` in a freshly written ledger.
pub(crate) fn session_for(ctx: &AppContext, ledger: &SessionLedger, output: &Path) -> Session {
    ledger
        .sessions
        .iter()
        .find(|s| s.output == output)
        .cloned()
        .unwrap_or_else(|| session_from_folder(ctx.event_dir(), output))
}

/// Copies, composing and ledger, shared by normal and custom runs.
///
/// `archive_dir` holds the full-resolution images to print from.
pub(crate) fn finish_run(
    ctx: &AppContext,
    resolver: &dyn DuplicateResolver,
    output: &Path,
    archive_dir: &Path,
    compose: bool,
    cancel: &CancelFlag,
    events: Option<&Sender<RunEvent>>,
) -> Result<Option<Session>, RunError> {
    emit(events, RunEvent::Phase(Phase::Copies));
    let photos = list_photos(output)?;
    let counts = resolver.resolve(output, &photos);
    let copies = apply_counts(&counts)?;
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let normalized = normalize_names(output)?;
    if compose {
        emit(events, RunEvent::Phase(Phase::Composing));
        let template_out = output.join(TEMPLATE_OUTPUT_DIR);
        fs::create_dir_all(&template_out)?;
        let sources = print_sources(ctx, &normalized, archive_dir);
        let sheets = compose_session(ctx, &sources, &template_out, |percent| {
            emit(
                events,
                RunEvent::Progress {
                    phase: Phase::Composing,
                    percent,
                },
            )
        })?;
        emit(events, RunEvent::Composed { sheets: sheets.len() });
        if cancel.is_cancelled() {
            return Ok(None);
        }
    }
    remove_copies(&copies);

    emit(events, RunEvent::Phase(Phase::Ledger));
    ctx.save()?;
    let ledger = update_event_data(ctx.event_dir(), Some(&ctx.config.template.name))?;
    Ok(Some(session_for(ctx, &ledger, output)))
}

/// Process `input_dir` into a new session of this event.
pub fn run_session(
    ctx: &AppContext,
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    resolver: &dyn DuplicateResolver,
    input_dir: &Path,
    cancel: &CancelFlag,
    events: Option<&Sender<RunEvent>>,
) -> Result<RunOutcome, RunError> {
    let output = create_output_directory(ctx.event_dir(), false)?;
    let guard = RunDirGuard::new(&output);
    info!(input = %input_dir.display(), output = %output.display(), "starting session");
    emit(events, RunEvent::Started { output: output.clone() });

    emit(events, RunEvent::Phase(Phase::Deriving));
    let names = derive_directory(ctx, backend, encoder, input_dir, &output, &|percent: u8| {
        emit(
            events,
            RunEvent::Progress {
                phase: Phase::Deriving,
                percent,
            },
        )
    })?;
    info!(targets = names.len(), "derived session");
    if cancel.is_cancelled() {
        return Ok(stopped(events));
    }

    let compose = ctx.template_artwork().is_some();
    let archive_dir = ctx.digital_photos();
    let Some(session) = finish_run(ctx, resolver, &output, &archive_dir, compose, cancel, events)?
    else {
        return Ok(stopped(events));
    };

    guard.commit();
    info!(
        output = %session.output.display(),
        targets = session.targets,
        prints = session.prints(),
        "session complete"
    );
    emit(events, RunEvent::Finished(session.clone()));
    Ok(RunOutcome::Completed(session))
}

pub(crate) fn stopped(events: Option<&Sender<RunEvent>>) -> RunOutcome {
    info!("run stopped");
    emit(events, RunEvent::Stopped);
    RunOutcome::Stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::duplicates::{CopyCounts, NoDuplicates};
    use crate::imaging::backend::tests::MockBackend;
    use crate::state::LEDGER_FILENAME;
    use crate::video::encoder::tests::MockEncoder;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        ctx: AppContext,
        input: PathBuf,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let event = tmp.path().join("Party_2024-05-01");
        let input = tmp.path().join("card");
        fs::create_dir_all(&event).unwrap();
        fs::create_dir_all(&input).unwrap();
        for f in files {
            fs::write(input.join(f), b"data").unwrap();
        }
        Fixture {
            ctx: AppContext::with_config(&event, EventConfig::default()),
            _tmp: tmp,
            input,
        }
    }

    #[test]
    fn output_directory_takes_first_free_number() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("output 1")).unwrap();
        fs::create_dir(tmp.path().join("output 3")).unwrap();
        assert_eq!(
            create_output_directory(tmp.path(), false).unwrap(),
            tmp.path().join("output 2")
        );
        assert_eq!(
            create_output_directory(&tmp.path().join("custom mode"), true).unwrap(),
            tmp.path().join("custom mode/output 1 (custom)")
        );
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn completed_run_writes_ledger() {
        let f = fixture(&["IMG_1.jpg", "IMG_2.jpg", "MOV_1.mov", "MOV_2.mov"]);
        let (tx, rx) = std::sync::mpsc::channel();

        let outcome = run_session(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &NoDuplicates,
            &f.input,
            &CancelFlag::new(),
            Some(&tx),
        )
        .unwrap();
        drop(tx);

        let RunOutcome::Completed(session) = outcome else {
            panic!("run did not complete");
        };
        assert_eq!(session.targets, 2);
        assert_eq!(session.print_files, 0);
        assert!(session.output.ends_with("output 1"));

        let ledger = fs::read_to_string(f.ctx.event_dir().join(LEDGER_FILENAME)).unwrap();
        assert!(ledger.contains("Total Sessions: 1"));
        assert!(ledger.contains("Total Targets: 2"));

        let events: Vec<RunEvent> = rx.iter().collect();
        assert!(matches!(events.first(), Some(RunEvent::Started { .. })));
        assert!(matches!(events.last(), Some(RunEvent::Finished(_))));
        assert!(events.contains(&RunEvent::Progress {
            phase: Phase::Deriving,
            percent: 100
        }));
        // No artwork in the event folder, so nothing is composed.
        assert!(!events.contains(&RunEvent::Phase(Phase::Composing)));
    }

    #[test]
    fn copies_are_removed_after_run() {
        let f = fixture(&["IMG_1.jpg", "MOV_1.mov"]);
        let counts = CopyCounts {
            default: Some(3),
            by_name: BTreeMap::new(),
        };
        let outcome = run_session(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &counts,
            &f.input,
            &CancelFlag::new(),
            None,
        )
        .unwrap();
        let RunOutcome::Completed(session) = outcome else {
            panic!("run did not complete");
        };
        let leftover = fs::read_dir(&session.output)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains("_copy"))
            .count();
        assert_eq!(leftover, 0);
        assert_eq!(session.targets, 1);
    }

    #[test]
    fn cancelled_run_leaves_no_output() {
        let f = fixture(&["IMG_1.jpg", "MOV_1.mov"]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = run_session(
            &f.ctx,
            &MockBackend::new(),
            &MockEncoder::new(),
            &NoDuplicates,
            &f.input,
            &cancel,
            None,
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Stopped);
        assert!(!f.ctx.event_dir().join("output 1").exists());
        assert!(!f.ctx.event_dir().join(LEDGER_FILENAME).exists());
    }

    #[test]
    fn failed_run_leaves_no_output() {
        let f = fixture(&["IMG_1.jpg", "MOV_1.mov"]);
        let err = run_session(
            &f.ctx,
            &MockBackend::failing_on("IMG_1"),
            &MockEncoder::new(),
            &NoDuplicates,
            &f.input,
            &CancelFlag::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Derive(DeriveError::Asset { .. })));
        assert!(!f.ctx.event_dir().join("output 1").exists());
    }

    #[test]
    fn second_run_gets_next_folder() {
        let f = fixture(&["IMG_1.jpg", "MOV_1.mov"]);
        for expected in ["output 1", "output 2"] {
            let outcome = run_session(
                &f.ctx,
                &MockBackend::new(),
                &MockEncoder::new(),
                &NoDuplicates,
                &f.input,
                &CancelFlag::new(),
                None,
            )
            .unwrap();
            let RunOutcome::Completed(session) = outcome else {
                panic!("run did not complete");
            };
            assert!(session.output.ends_with(expected));
        }
        let ledger = fs::read_to_string(f.ctx.event_dir().join(LEDGER_FILENAME)).unwrap();
        assert!(ledger.contains("Total Sessions: 2"));
    }
}
