//! # Vide Maker
//!
//! Session processing for a photo booth that shoots a still and a short clip
//! of every guest. An event is a folder; each run over a memory card becomes
//! a numbered session inside it.
//!
//! # Architecture: One Run, Four Phases
//!
//! ```text
//! card/           pairing     derive          copies      compose          ledger
//! IMG_0042.jpg ─┐         ┌─► digital/photos ─► _copyN ─► template_output ─► event_data.txt
//! MOV_0042.mov ─┴─► Pair ─┼─► digital/videos
//!                         └─► output N/ (working copies, encoded clips)
//! ```
//!
//! - **Pairing** matches each photo to one clip by the number in its file
//!   name: exact, then the most recent earlier clip, then the nearest later one.
//! - **Derivation** writes a full-resolution archival photo, a bounded working
//!   copy and an encoded clip per pair, on a bounded thread pool. Any failure
//!   removes the session folder.
//! - **Compositing** lays working photos two to a sheet on the event's print
//!   template at 300 DPI.
//! - **Ledger** renumbers session folders and recounts them into
//!   `event_data.txt`.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | File name conventions: sequence numbers, `_p`/`_v` names, `_copyN`, ` (N)` suffixes |
//! | [`types`] | [`types::Asset`] and media kinds |
//! | [`pairing`] | Photo to clip matching |
//! | [`imaging`] | Crop geometry plus the `image`-crate backend |
//! | [`video`] | Crop/scale filter expressions and the ffmpeg encoder |
//! | [`derive`] | Archival and working copies for a whole card, in parallel |
//! | [`duplicates`] | Extra print copies and name normalization |
//! | [`compose`] | Print sheet layout and rendering |
//! | [`crop`] | Manual crop overrides and resets |
//! | [`print`] | Print order, reprints and PDF export |
//! | [`ledger`] | Session counts and `event_data.txt` |
//! | [`state`] | Per-event context: archive index, crop overrides, identifiers |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`run`] | Normal-mode runs with cancellation |
//! | [`custom`] | Custom-mode runs over hand-picked files |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Folders Are the Database
//!
//! Session counts are always recomputed from what is on disk. Deleting or
//! renaming an `output N` folder by hand and running `sync` gives a correct
//! ledger. The only side state is `.vide-state.json`, which remembers where
//! archival photos came from and which working photos were re-cropped.
//!
//! ## All or Nothing per Session
//!
//! A session folder exists only if the whole run succeeded. A scope guard
//! removes it on any error or stop request, so a half-written session never
//! shows up in the ledger.
//!
//! ## Explicit Context
//!
//! Shared tables live in [`state::AppContext`], passed by reference, behind
//! mutexes the derivation workers share. There are no process-wide globals.

pub mod compose;
pub mod config;
pub mod crop;
pub mod custom;
pub mod derive;
pub mod duplicates;
pub mod imaging;
pub mod ledger;
pub mod naming;
pub mod output;
pub mod pairing;
pub mod print;
pub mod run;
pub mod state;
pub mod types;
pub mod video;

#[cfg(test)]
pub(crate) mod test_helpers;
