//! Session ledger: per-session counts, persisted as `event_data.txt`.
//!
//! The folders are the source of truth. Every update renumbers the run
//! folders so they read `output 1..N` without gaps, recounts images in each
//! folder and its `template_output`, and rewrites the ledger:
//!
//! ```text
//! Template: DNP 6x4
//! Total Sessions: 2
//! Total Targets: 14
//! Total Prints: 12
//!
//! Sessions Data:
//! Session # | Targets | Prints
//! 1 | 8 | 8
//! 2 | 6 | 4
//! ```
//!
//! Custom-mode runs live under `custom mode/` as `output N (custom)` and are
//! renumbered and counted the same way, listed after the normal sessions.

use crate::compose::DEFAULT_TEMPLATE;
use crate::naming::{OUTPUT_PREFIX, extract_number, is_custom, output_folder_name, trailing_number};
use crate::state::{CUSTOM_DIR, DIGITAL_DIR, LEDGER_FILENAME};
use crate::types::is_photo;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Folder inside a run that receives composed print sheets.
pub const TEMPLATE_OUTPUT_DIR: &str = "template_output";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("No session #{index} (event has {count})")]
    NoSuchSession { index: usize, count: usize },
}

/// Why an existing ledger could not be read. Always recovered from.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LedgerParseError {
    #[error("ledger is empty")]
    Empty,
    #[error("line {line}: expected '{expected}'")]
    Malformed { line: usize, expected: &'static str },
}

/// One processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Folder the captures came from (the output folder after a resync).
    pub folder: PathBuf,
    pub output: PathBuf,
    /// Working photos produced.
    pub targets: usize,
    /// Composed sheets in `template_output`.
    pub print_files: usize,
    pub digital_dir: PathBuf,
    pub custom: bool,
}

impl Session {
    /// Physical prints: every sheet is cut in two.
    pub fn prints(&self) -> usize {
        self.print_files * 2
    }
}

/// All sessions of an event plus the template it prints with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionLedger {
    pub template: String,
    pub sessions: Vec<Session>,
}

impl SessionLedger {
    pub fn total_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_targets(&self) -> usize {
        self.sessions.iter().map(|s| s.targets).sum()
    }

    pub fn total_prints(&self) -> usize {
        self.sessions.iter().map(|s| s.print_files).sum::<usize>() * 2
    }

    /// The `event_data.txt` text.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Template: {}\nTotal Sessions: {}\nTotal Targets: {}\nTotal Prints: {}\n\n",
            self.template,
            self.total_sessions(),
            self.total_targets(),
            self.total_prints()
        );
        out.push_str("Sessions Data:\nSession # | Targets | Prints\n");
        for (i, s) in self.sessions.iter().enumerate() {
            out.push_str(&format!("{} | {} | {}\n", i + 1, s.targets, s.prints()));
        }
        out
    }

    pub fn write(&self, event_dir: &Path) -> io::Result<()> {
        fs::write(event_dir.join(LEDGER_FILENAME), self.render())
    }
}

/// What a ledger file says, without touching the folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSummary {
    pub template: String,
    pub total_sessions: usize,
    pub total_targets: usize,
    pub total_prints: usize,
    /// `(session #, targets, prints)`
    pub rows: Vec<(usize, usize, usize)>,
}

fn field<'a>(line: Option<&'a str>, n: usize, key: &'static str) -> Result<&'a str, LedgerParseError> {
    line.and_then(|l| l.strip_prefix(key))
        .and_then(|rest| rest.strip_prefix(": "))
        .map(str::trim)
        .ok_or(LedgerParseError::Malformed {
            line: n,
            expected: key,
        })
}

fn count(line: Option<&str>, n: usize, key: &'static str) -> Result<usize, LedgerParseError> {
    field(line, n, key)?
        .parse()
        .map_err(|_| LedgerParseError::Malformed {
            line: n,
            expected: key,
        })
}

/// Parse ledger text.
pub fn parse_ledger(text: &str) -> Result<LedgerSummary, LedgerParseError> {
    if text.trim().is_empty() {
        return Err(LedgerParseError::Empty);
    }
    let mut lines = text.lines();
    let template = field(lines.next(), 1, "Template")?.to_string();
    let total_sessions = count(lines.next(), 2, "Total Sessions")?;
    let total_targets = count(lines.next(), 3, "Total Targets")?;
    let total_prints = count(lines.next(), 4, "Total Prints")?;

    // Header and blank lines do not parse as three numbers.
    let rows = lines
        .filter_map(|l| {
            let cols: Vec<&str> = l.split('|').map(str::trim).collect();
            match cols.as_slice() {
                [a, b, c] => Some((a.parse().ok()?, b.parse().ok()?, c.parse().ok()?)),
                _ => None,
            }
        })
        .collect();

    Ok(LedgerSummary {
        template,
        total_sessions,
        total_targets,
        total_prints,
        rows,
    })
}

/// Template name recorded in the event's ledger, or the default.
pub fn ledger_template(event_dir: &Path) -> String {
    let path = event_dir.join(LEDGER_FILENAME);
    let Ok(text) = fs::read_to_string(&path) else {
        return DEFAULT_TEMPLATE.to_string();
    };
    match parse_ledger(&text) {
        Ok(summary) => summary.template,
        Err(e) => {
            // The template line alone is enough.
            match field(text.lines().next(), 1, "Template") {
                Ok(t) if !t.is_empty() => t.to_string(),
                _ => {
                    warn!(path = %path.display(), error = %e, "unreadable ledger, using default template");
                    DEFAULT_TEMPLATE.to_string()
                }
            }
        }
    }
}

// =============================================================================
// Folders
// =============================================================================

/// Run folders directly inside `dir`, ordered by sequence number.
pub fn output_folders(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut folders: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(OUTPUT_PREFIX))
        })
        .collect();
    folders.sort_by_cached_key(|p| {
        let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        (extract_number(&name).unwrap_or(u64::MAX), name)
    });
    Ok(folders)
}

/// Rename run folders in `dir` to `output 1..N` in sequence order.
///
/// `custom` selects the `output N (custom)` form. Folders whose number cannot
/// be read are left alone and do not take a slot. Returns the folders in
/// their final order.
pub fn renumber_output_folders(dir: &Path, custom: bool) -> io::Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    let mut expected = 1;
    for folder in output_folders(dir)? {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let number = if custom {
            is_custom(&name).then(|| extract_number(&name)).flatten()
        } else {
            trailing_number(&name)
        };
        let Some(number) = number else {
            continue;
        };
        if number != expected as u64 {
            let target = dir.join(output_folder_name(expected, custom));
            if target.exists() {
                warn!(from = %folder.display(), to = %target.display(), "renumber target exists, skipping");
                result.push(folder);
                expected += 1;
                continue;
            }
            fs::rename(&folder, &target)?;
            info!(from = %name, to = %target.display(), "renumbered session folder");
            result.push(target);
        } else {
            result.push(folder);
        }
        expected += 1;
    }
    Ok(result)
}

fn count_photos(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .filter(|e| e.path().is_file() && is_photo(&e.path()))
                .count()
        })
        .unwrap_or(0)
}

/// Count a run folder as a session.
pub fn session_from_folder(event_dir: &Path, output: &Path) -> Session {
    let custom = output
        .file_name()
        .is_some_and(|n| is_custom(&n.to_string_lossy()));
    Session {
        folder: output.to_path_buf(),
        output: output.to_path_buf(),
        targets: count_photos(output),
        print_files: count_photos(&output.join(TEMPLATE_OUTPUT_DIR)),
        digital_dir: event_dir.join(DIGITAL_DIR),
        custom,
    }
}

/// Rebuild sessions from the folders on disk without renaming anything.
pub fn sync_from_folders(event_dir: &Path, template: Option<&str>) -> io::Result<SessionLedger> {
    let template = template
        .map(str::to_string)
        .unwrap_or_else(|| ledger_template(event_dir));
    let sessions = output_folders(event_dir)?
        .into_iter()
        .chain(output_folders(&event_dir.join(CUSTOM_DIR))?)
        .map(|out| session_from_folder(event_dir, &out))
        .collect();
    Ok(SessionLedger { template, sessions })
}

/// Renumber, recount and rewrite `event_data.txt`.
///
/// `template` replaces the recorded template name when given.
pub fn update_event_data(event_dir: &Path, template: Option<&str>) -> Result<SessionLedger, LedgerError> {
    renumber_output_folders(event_dir, false)?;
    renumber_output_folders(&event_dir.join(CUSTOM_DIR), true)?;
    let ledger = sync_from_folders(event_dir, template)?;
    ledger.write(event_dir)?;
    debug!(
        sessions = ledger.total_sessions(),
        targets = ledger.total_targets(),
        prints = ledger.total_prints(),
        "ledger updated"
    );
    Ok(ledger)
}

/// Remove session `index` (1-based, as listed) and rewrite the ledger.
pub fn delete_session(event_dir: &Path, index: usize) -> Result<SessionLedger, LedgerError> {
    let ledger = sync_from_folders(event_dir, None)?;
    let count = ledger.sessions.len();
    let session = index
        .checked_sub(1)
        .and_then(|i| ledger.sessions.get(i))
        .ok_or(LedgerError::NoSuchSession { index, count })?;
    fs::remove_dir_all(&session.output)?;
    info!(output = %session.output.display(), "deleted session");
    update_event_data(event_dir, Some(&ledger.template))
}
