//! Per-event application context.
//!
//! Three tables outlive a single run and are shared by every command that
//! touches an event folder:
//!
//! - [`ArchiveIndex`]: archival file → the capture it was derived from.
//!   Crop overrides re-crop the *original* capture, so the mapping must
//!   survive after the working copy has been replaced.
//! - [`CropOverrides`]: user crops keyed by working file, plus an alias from
//!   the archival file so compositing picks up the re-cropped working copy.
//! - [`IdAllocator`]: the random part of every `{YYYYMMDD}_{NNNNN}` identifier
//!   handed out, seeded from names already in `digital/`.
//!
//! ## Storage
//!
//! The first two tables are written to `<event>/.vide-state.json`. A missing,
//! corrupt or outdated file loads as empty; identifiers are recovered from
//! disk regardless.
//!
//! Derivation workers insert concurrently, so every table sits behind a
//! `Mutex`. A poisoned lock is recovered rather than propagated: the tables
//! hold plain data with no invariant a panicking writer could break.

use crate::config::{ConfigError, EventConfig, load_config};
use crate::imaging::CropRect;
use crate::naming::copy_sort_key;
use crate::types::is_photo;
use chrono::Local;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the persisted state file inside the event folder.
pub const STATE_FILENAME: &str = ".vide-state.json";

/// Bump to discard state written by an incompatible version.
const STATE_VERSION: u32 = 1;

pub const DIGITAL_DIR: &str = "digital";
pub const PHOTOS_DIR: &str = "photos";
pub const VIDEOS_DIR: &str = "videos";
pub const CUSTOM_DIR: &str = "custom mode";
pub const LEDGER_FILENAME: &str = "event_data.txt";

/// Lowest and highest random identifier part.
const ID_RANGE: std::ops::RangeInclusive<u32> = 10000..=99999;

static RE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}_(\d{5})_[pv]").unwrap());

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("State file error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("All {count} identifiers are in use")]
    IdsExhausted { count: usize },
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Archive index
// =============================================================================

/// Archival path → source capture path.
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    entries: Mutex<BTreeMap<PathBuf, PathBuf>>,
}

impl ArchiveIndex {
    pub fn insert(&self, archival: PathBuf, source: PathBuf) {
        locked(&self.entries).insert(archival, source);
    }

    pub fn source_of(&self, archival: &Path) -> Option<PathBuf> {
        locked(&self.entries).get(archival).cloned()
    }

    /// Find the archival entry for a working file name.
    ///
    /// Working copies share the archival file name. Duplicate copies
    /// (`_copyN`) and file-manager suffixes (` (N)`) resolve to the shot they
    /// were made from.
    pub fn find_by_name(&self, name: &str) -> Option<(PathBuf, PathBuf)> {
        let wanted = base_name(Path::new(name));
        locked(&self.entries)
            .iter()
            .find(|(archival, _)| {
                archival.file_name().is_some_and(|n| n == name) || base_name(archival) == wanted
            })
            .map(|(a, s)| (a.clone(), s.clone()))
    }

    pub fn len(&self) -> usize {
        locked(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> BTreeMap<PathBuf, PathBuf> {
        locked(&self.entries).clone()
    }
}

/// `stem_copy2 (1).jpg` → `stem.jpg`
fn base_name(path: &Path) -> String {
    let (stem, _) = copy_sort_key(path);
    match path.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
        None => stem,
    }
}

// =============================================================================
// Crop overrides
// =============================================================================

/// A user crop, in pixels of the oriented original capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOverride {
    pub rect: CropRect,
    /// Oriented size of the capture the rectangle was drawn on.
    pub source_dims: (u32, u32),
}

#[derive(Debug, Default)]
struct CropTable {
    by_working: BTreeMap<PathBuf, CropOverride>,
    /// archival → working
    aliases: BTreeMap<PathBuf, PathBuf>,
}

#[derive(Debug, Default)]
pub struct CropOverrides {
    table: Mutex<CropTable>,
}

impl CropOverrides {
    pub fn record(&self, working: PathBuf, archival: Option<PathBuf>, ov: CropOverride) {
        let mut t = locked(&self.table);
        if let Some(archival) = archival {
            t.aliases.insert(archival, working.clone());
        }
        t.by_working.insert(working, ov);
    }

    pub fn get(&self, working: &Path) -> Option<CropOverride> {
        locked(&self.table).by_working.get(working).copied()
    }

    /// Drop the override for `working` and any alias to it.
    /// Returns whether an override existed.
    pub fn clear(&self, working: &Path) -> bool {
        let mut t = locked(&self.table);
        t.aliases.retain(|_, w| w != working);
        t.by_working.remove(working).is_some()
    }

    /// The path compositing should read instead of `path`.
    ///
    /// An archival file with an override resolves to the re-cropped working
    /// copy; anything else is returned unchanged.
    pub fn substitute(&self, path: &Path) -> PathBuf {
        let t = locked(&self.table);
        match t.aliases.get(path) {
            Some(working) if t.by_working.contains_key(working) => working.clone(),
            _ => path.to_path_buf(),
        }
    }

    pub fn len(&self) -> usize {
        locked(&self.table).by_working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Hands out `{YYYYMMDD}_{NNNNN}` identifiers without reusing `NNNNN`.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: Mutex<HashSet<u32>>,
}

impl IdAllocator {
    /// Seed from identifiers already present below `dirs`.
    pub fn seeded_from(dirs: &[PathBuf]) -> Self {
        let used: HashSet<u32> = dirs
            .iter()
            .filter(|d| d.is_dir())
            .flat_map(|d| WalkDir::new(d).max_depth(1).into_iter().filter_map(|e| e.ok()))
            .filter_map(|e| identifier_part(&e.file_name().to_string_lossy()))
            .collect();
        debug!(count = used.len(), "seeded identifiers");
        Self {
            used: Mutex::new(used),
        }
    }

    pub fn reserve(&self, n: u32) -> bool {
        locked(&self.used).insert(n)
    }

    pub fn is_used(&self, n: u32) -> bool {
        locked(&self.used).contains(&n)
    }

    /// A fresh identifier dated today.
    pub fn next_id(&self) -> Result<String, StateError> {
        let date = Local::now().format("%Y%m%d");
        let n = self.next_number()?;
        Ok(format!("{date}_{n}"))
    }

    fn next_number(&self) -> Result<u32, StateError> {
        let mut used = locked(&self.used);
        let count = (ID_RANGE.end() - ID_RANGE.start() + 1) as usize;
        if used.len() >= count {
            return Err(StateError::IdsExhausted { count });
        }
        let mut rng = rand::rng();
        loop {
            let n = rng.random_range(ID_RANGE);
            if used.insert(n) {
                return Ok(n);
            }
        }
    }
}

/// The `NNNNN` of a derived file name like `20240501_12345_p.jpg`.
pub fn identifier_part(name: &str) -> Option<u32> {
    RE_IDENTIFIER
        .captures(name)
        .and_then(|c| c[1].parse().ok())
}

// =============================================================================
// State file
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    archive: BTreeMap<PathBuf, PathBuf>,
    crops: BTreeMap<PathBuf, CropOverride>,
    aliases: BTreeMap<PathBuf, PathBuf>,
}

impl StateFile {
    fn empty() -> Self {
        Self {
            version: STATE_VERSION,
            archive: BTreeMap::new(),
            crops: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    fn load(event_dir: &Path) -> Self {
        let path = event_dir.join(STATE_FILENAME);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let state: Self = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
                return Self::empty();
            }
        };
        if state.version != STATE_VERSION {
            warn!(version = state.version, "ignoring state file from another version");
            return Self::empty();
        }
        state
    }
}

// =============================================================================
// Context
// =============================================================================

/// Everything an operation on one event folder needs.
#[derive(Debug)]
pub struct AppContext {
    event_dir: PathBuf,
    pub config: EventConfig,
    pub archive: ArchiveIndex,
    pub crops: CropOverrides,
    pub ids: IdAllocator,
}

impl AppContext {
    /// Load config and saved state for `event_dir`.
    pub fn open(event_dir: &Path) -> Result<Self, StateError> {
        let config = load_config(event_dir)?;
        Ok(Self::with_config(event_dir, config))
    }

    /// Load saved state with an already-resolved config.
    pub fn with_config(event_dir: &Path, config: EventConfig) -> Self {
        let state = StateFile::load(event_dir);
        let ctx = Self {
            event_dir: event_dir.to_path_buf(),
            config,
            archive: ArchiveIndex {
                entries: Mutex::new(state.archive),
            },
            crops: CropOverrides {
                table: Mutex::new(CropTable {
                    by_working: state.crops,
                    aliases: state.aliases,
                }),
            },
            ids: IdAllocator::default(),
        };
        let ids = IdAllocator::seeded_from(&[ctx.digital_photos(), ctx.digital_videos()]);
        Self { ids, ..ctx }
    }

    pub fn event_dir(&self) -> &Path {
        &self.event_dir
    }

    pub fn digital_photos(&self) -> PathBuf {
        self.event_dir.join(DIGITAL_DIR).join(PHOTOS_DIR)
    }

    pub fn digital_videos(&self) -> PathBuf {
        self.event_dir.join(DIGITAL_DIR).join(VIDEOS_DIR)
    }

    pub fn custom_dir(&self) -> PathBuf {
        self.event_dir.join(CUSTOM_DIR)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.event_dir.join(LEDGER_FILENAME)
    }

    pub fn ensure_digital_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.digital_photos())?;
        fs::create_dir_all(self.digital_videos())
    }

    /// Template artwork for this event.
    ///
    /// `template.artwork` from config when set, otherwise the first image
    /// directly inside the event folder by name.
    pub fn template_artwork(&self) -> Option<PathBuf> {
        if let Some(name) = &self.config.template.artwork {
            let path = self.event_dir.join(name);
            return path.is_file().then_some(path);
        }
        let mut images: Vec<PathBuf> = fs::read_dir(&self.event_dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_photo(p))
            .collect();
        images.sort();
        images.into_iter().next()
    }

    /// Persist the archive index and crop overrides.
    pub fn save(&self) -> Result<(), StateError> {
        let state = {
            let crops = locked(&self.crops.table);
            StateFile {
                version: STATE_VERSION,
                archive: self.archive.snapshot(),
                crops: crops.by_working.clone(),
                aliases: crops.aliases.clone(),
            }
        };
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(self.event_dir.join(STATE_FILENAME), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(dir: &Path) -> AppContext {
        AppContext::with_config(dir, EventConfig::default())
    }

    // =========================================================================
    // Archive index
    // =========================================================================

    #[test]
    fn archive_lookup_by_path_and_name() {
        let index = ArchiveIndex::default();
        index.insert("/ev/digital/photos/20240501_12345_p.jpg".into(), "/in/IMG_1.jpg".into());

        assert_eq!(
            index.source_of(Path::new("/ev/digital/photos/20240501_12345_p.jpg")),
            Some(PathBuf::from("/in/IMG_1.jpg"))
        );
        let (_, src) = index.find_by_name("20240501_12345_p_copy2.jpg").unwrap();
        assert_eq!(src, PathBuf::from("/in/IMG_1.jpg"));
        assert!(index.find_by_name("20240501_99999_p.jpg").is_none());
    }

    // =========================================================================
    // Crop overrides
    // =========================================================================

    #[test]
    fn override_substitutes_archival_until_cleared() {
        let crops = CropOverrides::default();
        let working = PathBuf::from("/ev/output 1/x_p.jpg");
        let archival = PathBuf::from("/ev/digital/photos/x_p.jpg");
        crops.record(
            working.clone(),
            Some(archival.clone()),
            CropOverride {
                rect: CropRect::new(0, 0, 400, 500),
                source_dims: (1000, 1000),
            },
        );

        assert_eq!(crops.substitute(&archival), working);
        assert_eq!(crops.substitute(Path::new("/other.jpg")), PathBuf::from("/other.jpg"));
        assert!(crops.get(&working).is_some());

        assert!(crops.clear(&working));
        assert_eq!(crops.substitute(&archival), archival);
        assert!(!crops.clear(&working));
        assert!(crops.is_empty());
    }

    // =========================================================================
    // Identifiers
    // =========================================================================

    #[test]
    fn identifier_part_parses_derived_names() {
        assert_eq!(identifier_part("20240501_12345_p.jpg"), Some(12345));
        assert_eq!(identifier_part("20240501_54321_v_copy1.mov"), Some(54321));
        assert_eq!(identifier_part("IMG_12345.jpg"), None);
    }

    #[test]
    fn next_id_is_dated_and_unique() {
        let ids = IdAllocator::default();
        let a = ids.next_id().unwrap();
        let b = ids.next_id().unwrap();
        assert_ne!(a, b);

        let (date, n) = a.split_once('_').unwrap();
        assert_eq!(date.len(), 8);
        let n: u32 = n.parse().unwrap();
        assert!(ID_RANGE.contains(&n));
        assert!(ids.is_used(n));
    }

    #[test]
    fn exhausted_allocator_errors() {
        let ids = IdAllocator::default();
        for n in ID_RANGE {
            ids.reserve(n);
        }
        assert!(matches!(ids.next_id(), Err(StateError::IdsExhausted { .. })));
    }

    #[test]
    fn seeded_from_existing_files() {
        let tmp = TempDir::new().unwrap();
        let photos = tmp.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("20240501_23456_p.jpg"), b"").unwrap();
        fs::write(photos.join("notes.txt"), b"").unwrap();

        let ids = IdAllocator::seeded_from(&[photos, tmp.path().join("missing")]);
        assert!(ids.is_used(23456));
        assert!(!ids.reserve(23456));
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn save_and_reopen_keeps_tables() {
        let tmp = TempDir::new().unwrap();
        let c = ctx(tmp.path());
        c.archive.insert(tmp.path().join("digital/photos/a_p.jpg"), "/in/a.jpg".into());
        c.crops.record(
            tmp.path().join("output 1/a_p.jpg"),
            Some(tmp.path().join("digital/photos/a_p.jpg")),
            CropOverride {
                rect: CropRect::new(10, 20, 400, 500),
                source_dims: (800, 1000),
            },
        );
        c.save().unwrap();

        let reopened = ctx(tmp.path());
        assert_eq!(reopened.archive.len(), 1);
        assert_eq!(
            reopened.crops.get(&tmp.path().join("output 1/a_p.jpg")).unwrap().rect,
            CropRect::new(10, 20, 400, 500)
        );
        assert_eq!(
            reopened.crops.substitute(&tmp.path().join("digital/photos/a_p.jpg")),
            tmp.path().join("output 1/a_p.jpg")
        );
    }

    #[test]
    fn corrupt_state_loads_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(STATE_FILENAME), "{ not json").unwrap();
        let c = ctx(tmp.path());
        assert!(c.archive.is_empty());
        assert!(c.crops.is_empty());
    }

    #[test]
    fn wrong_version_loads_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(STATE_FILENAME),
            r#"{"version": 999, "archive": {"/a": "/b"}, "crops": {}, "aliases": {}}"#,
        )
        .unwrap();
        assert!(ctx(tmp.path()).archive.is_empty());
    }

    #[test]
    fn open_reads_ids_from_digital_folders() {
        let tmp = TempDir::new().unwrap();
        let videos = tmp.path().join("digital/videos");
        fs::create_dir_all(&videos).unwrap();
        fs::write(videos.join("20240501_11111_v.mov"), b"").unwrap();

        let c = AppContext::open(tmp.path()).unwrap();
        assert!(c.ids.is_used(11111));
    }

    #[test]
    fn open_empty_event_uses_dnp_template() {
        let tmp = TempDir::new().unwrap();

        let c = AppContext::open(tmp.path()).unwrap();
        let def = c.config.template_definition().unwrap();
        assert_eq!((def.width, def.height), (1800, 1200));
        assert_eq!(def.margin_top, 4.0);
        assert_eq!(def.margin_left, 4.0);
        assert_eq!(def.margin_right, 4.0);
        assert_eq!(def.margin_bottom, 12.4);
        assert_eq!(def.dpi, 300);
    }

    // =========================================================================
    // Artwork
    // =========================================================================

    #[test]
    fn artwork_defaults_to_first_image_in_event_folder() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b_frame.png"), b"").unwrap();
        fs::write(tmp.path().join("a_frame.jpg"), b"").unwrap();
        fs::write(tmp.path().join("event_data.txt"), b"").unwrap();
        assert_eq!(ctx(tmp.path()).template_artwork(), Some(tmp.path().join("a_frame.jpg")));
    }

    #[test]
    fn artwork_from_config_must_exist() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"").unwrap();
        let mut config = EventConfig::default();
        config.template.artwork = Some("frame.png".into());
        let c = AppContext::with_config(tmp.path(), config);
        assert_eq!(c.template_artwork(), None);
    }

    #[test]
    fn no_artwork_in_empty_event() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(ctx(tmp.path()).template_artwork(), None);
    }
}
