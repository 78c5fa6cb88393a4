//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity (session, photo, sheet) leads with its positional index and
//! identity. Filesystem paths follow as indented context lines, relative to
//! the event folder where possible.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! ==> Session output 3
//! Deriving
//!     50%
//!     100%
//! Copies
//! Composing
//!     100%
//!     4 sheets
//! Ledger
//! 003 output 3 (12 targets, 8 prints)
//! ```
//!
//! ## Sessions
//!
//! ```text
//! Template: DNP 6x4
//! 001 output 1 (8 targets, 8 prints)
//!     Source: output 1/
//! 002 output 1 (custom) (3 targets, 0 prints)
//!     Source: custom mode/output 1 (custom)/
//!     Custom
//!
//! 2 sessions, 11 targets, 8 prints
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and, where useful, a `print_*` wrapper that writes to stdout.
//! Format functions are pure: no I/O, no side effects.

use crate::ledger::{Session, SessionLedger};
use crate::run::{Phase, RunEvent, RunOutcome};
use crate::state::CropOverride;
use std::path::Path;

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Display a path relative to `base` when it lies inside it.
fn relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Deriving => "Deriving",
        Phase::Copies => "Copies",
        Phase::Composing => "Composing",
        Phase::Ledger => "Ledger",
    }
}

/// ```text
/// 002 output 2 (6 targets, 4 prints)
/// ```
fn session_header(index: usize, session: &Session) -> String {
    format!(
        "{} {} ({} targets, {} prints)",
        format_index(index),
        file_name(&session.output),
        session.targets,
        session.prints()
    )
}

// ============================================================================
// Runs
// ============================================================================

/// Format one progress event from a normal or custom run.
pub fn format_run_event(event: &RunEvent) -> Vec<String> {
    match event {
        RunEvent::Started { output } => vec![format!("==> Session {}", file_name(output))],
        RunEvent::Phase(phase) => vec![phase_label(*phase).to_string()],
        RunEvent::Progress { percent, .. } => vec![format!("{}{}%", indent(1), percent)],
        RunEvent::Composed { sheets } => {
            let noun = if *sheets == 1 { "sheet" } else { "sheets" };
            vec![format!("{}{} {}", indent(1), sheets, noun)]
        }
        RunEvent::Finished(session) => {
            let index = session
                .output
                .file_name()
                .and_then(|n| crate::naming::extract_number(&n.to_string_lossy()))
                .unwrap_or(0) as usize;
            vec![session_header(index, session)]
        }
        RunEvent::Stopped => vec!["Stopped, partial output removed".to_string()],
    }
}

/// One-line summary of how a run ended.
pub fn format_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed(session) => format!(
            "==> Done: {} ({} targets)",
            session.output.display(),
            session.targets
        ),
        RunOutcome::Stopped => "==> Stopped".to_string(),
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Format the ledger as an indexed session list with totals.
pub fn format_sessions(ledger: &SessionLedger, event_dir: &Path) -> Vec<String> {
    let mut lines = vec![format!("Template: {}", ledger.template)];
    for (i, session) in ledger.sessions.iter().enumerate() {
        lines.push(session_header(i + 1, session));
        lines.push(format!(
            "{}Source: {}/",
            indent(1),
            relative(&session.output, event_dir)
        ));
        if session.custom {
            lines.push(format!("{}Custom", indent(1)));
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "{} sessions, {} targets, {} prints",
        ledger.total_sessions(),
        ledger.total_targets(),
        ledger.total_prints()
    ));
    lines
}

pub fn print_sessions(ledger: &SessionLedger, event_dir: &Path) {
    for line in format_sessions(ledger, event_dir) {
        println!("{}", line);
    }
}

// ============================================================================
// Crops and prints
// ============================================================================

/// Format an applied crop override.
///
/// ```text
/// 20240501_12345_p.jpg
///     Crop: 800x1000 at (100, 0)
///     Source: 2000x2000
/// ```
pub fn format_crop(working: &Path, ov: &CropOverride) -> Vec<String> {
    vec![
        file_name(working),
        format!(
            "{}Crop: {}x{} at ({}, {})",
            indent(1),
            ov.rect.width,
            ov.rect.height,
            ov.rect.x,
            ov.rect.y
        ),
        format!(
            "{}Source: {}x{}",
            indent(1),
            ov.source_dims.0,
            ov.source_dims.1
        ),
    ]
}

/// Indexed file list, paths relative to `base`.
///
/// Used for print order and written sheets.
pub fn format_file_list(files: &[std::path::PathBuf], base: &Path) -> Vec<String> {
    files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} {}", format_index(i + 1), relative(f, base)))
        .collect()
}
