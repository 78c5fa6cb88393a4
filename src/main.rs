use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use tracing_subscriber::EnvFilter;
use vide_maker::compose::PRINT_DPI;
use vide_maker::custom::{CustomRequest, run_custom};
use vide_maker::duplicates::CopyCounts;
use vide_maker::imaging::{AspectRatio, CropRect, Orientation, RustBackend};
use vide_maker::run::{CancelFlag, RunEvent, run_session};
use vide_maker::state::AppContext;
use vide_maker::video::FfmpegEncoder;
use vide_maker::{config, crop, ledger, output, print};

/// Print-count flags shared by `process` and `custom`.
#[derive(clap::Args, Clone)]
struct CopyArgs {
    /// Prints per photo unless overridden
    #[arg(long)]
    copies: Option<u32>,
    /// Per-photo print count, as NAME=COUNT (repeatable)
    #[arg(long = "copy", value_name = "NAME=COUNT")]
    copy: Vec<String>,
}

impl CopyArgs {
    fn counts(&self) -> Result<CopyCounts, String> {
        Ok(CopyCounts {
            default: self.copies,
            by_name: CopyCounts::parse_overrides(&self.copy)?,
        })
    }
}

/// Crop ratio flags for photos made outside the configured ratio.
#[derive(clap::Args, Clone)]
struct RatioArgs {
    /// Ratio the photo was made at, e.g. 16:9 (defaults to [photos] aspect_ratio)
    #[arg(long)]
    ratio: Option<AspectRatio>,
    #[arg(long)]
    orientation: Option<Orientation>,
}

impl RatioArgs {
    fn resolve(&self, ctx: &AppContext) -> AspectRatio {
        crop::override_ratio(ctx.config.photos.ratio(), self.ratio, self.orientation)
    }
}

#[derive(Parser)]
#[command(name = "vide-maker")]
#[command(about = "Photo-booth session processor")]
#[command(long_about = "\
Photo-booth session processor

Each run pairs the photos and clips on a memory card, archives them, writes
working copies into a new session folder and composes print sheets.

Event structure:

  Party_2024-05-01/
  ├── config.toml              # Event config (optional)
  ├── template.png             # Print artwork (first image in the folder)
  ├── event_data.txt           # Session ledger, rewritten after every run
  ├── digital/
  │   ├── photos/              # Full-resolution 4:5 archival photos
  │   └── videos/              # Untouched clips
  ├── output 1/                # One folder per session
  │   ├── 20240501_12345_p.jpg # Working photo
  │   ├── 20240501_12345_v.mov # Encoded clip
  │   └── template_output/     # print_0.png, print_1.png, ...
  └── custom mode/
      └── output 1 (custom)/

Run 'vide-maker gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Event directory
    #[arg(long, default_value = ".", global = true)]
    event: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a card folder into a new session
    Process {
        /// Folder holding the captured photos and clips
        input: PathBuf,
        #[command(flatten)]
        copies: CopyArgs,
    },
    /// Process hand-picked files at a chosen aspect ratio
    Custom {
        /// Photos and clips to include
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Target ratio, e.g. 4:5, 16:9
        #[arg(long, default_value = "4:5")]
        ratio: AspectRatio,
        #[arg(long, default_value = "portrait")]
        orientation: Orientation,
        /// Keep the full frame instead of centre-cropping to the ratio
        #[arg(long)]
        no_crop: bool,
        /// Keep working copies at full resolution
        #[arg(long)]
        no_minimize: bool,
        /// Skip print sheets
        #[arg(long)]
        no_template: bool,
        #[command(flatten)]
        copies: CopyArgs,
    },
    /// Compose a reprint of selected photos from a session
    Compose {
        /// Session folder (e.g. "output 2")
        session: PathBuf,
        /// Photo to print, optionally with a count as NAME=COUNT (repeatable)
        #[arg(long = "photo", value_name = "NAME[=COUNT]", required = true)]
        photos: Vec<String>,
    },
    /// Re-crop a working photo from its original capture
    Crop {
        /// Working photo inside a session folder
        photo: PathBuf,
        /// Region of the original as x,y,w,h
        rect: CropRect,
        #[command(flatten)]
        ratio: RatioArgs,
    },
    /// Drop a crop override and regenerate the working photo
    ResetCrop {
        photo: PathBuf,
        #[command(flatten)]
        ratio: RatioArgs,
    },
    /// Renumber session folders and rewrite event_data.txt
    Sync,
    /// List sessions and totals
    Sessions,
    /// Delete a session folder by its 1-based number
    DeleteSession { index: usize },
    /// List the images in a folder in print order
    PrintOrder { dir: PathBuf },
    /// Write print_session.pdf from the images in a folder
    ExportPdf { dir: PathBuf },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let event = cli.event.as_path();

    match cli.command {
        Command::Process { input, copies } => {
            let ctx = AppContext::open(event)?;
            let encoder = locate_encoder(&ctx)?;
            let resolver = copies.counts()?;
            let cancel = cancel_on_ctrlc()?;
            let outcome = with_printer(|tx| {
                run_session(
                    &ctx,
                    &RustBackend::new(),
                    &encoder,
                    &resolver,
                    &input,
                    &cancel,
                    Some(tx),
                )
            })??;
            println!("{}", output::format_outcome(&outcome));
        }
        Command::Custom {
            files,
            ratio,
            orientation,
            no_crop,
            no_minimize,
            no_template,
            copies,
        } => {
            let ctx = AppContext::open(event)?;
            let encoder = locate_encoder(&ctx)?;
            let resolver = copies.counts()?;
            let cancel = cancel_on_ctrlc()?;
            let request = CustomRequest {
                files,
                ratio: ratio.oriented(orientation),
                crop: !no_crop,
                minimize: !no_minimize,
                apply_template: !no_template,
            };
            let outcome = with_printer(|tx| {
                run_custom(
                    &ctx,
                    &RustBackend::new(),
                    &encoder,
                    &resolver,
                    &request,
                    &cancel,
                    Some(tx),
                )
            })??;
            println!("{}", output::format_outcome(&outcome));
        }
        Command::Compose { session, photos } => {
            let ctx = AppContext::open(event)?;
            let session = resolve(event, &session);
            let selections = parse_selections(&session, &photos)?;
            let out = print::print_selected(&ctx, &session, &selections, |p| {
                println!("    {p}%")
            })?;
            let sheets = print::print_order(&out)?;
            for line in output::format_file_list(&sheets, &session) {
                println!("{}", line);
            }
        }
        Command::Crop { photo, rect, ratio } => {
            let ctx = AppContext::open(event)?;
            let photo = resolve(event, &photo);
            let ratio = ratio.resolve(&ctx);
            let ov = crop::apply_crop_override(&ctx, &RustBackend::new(), &photo, rect, ratio)?;
            ctx.save()?;
            for line in output::format_crop(&photo, &ov) {
                println!("{}", line);
            }
        }
        Command::ResetCrop { photo, ratio } => {
            let ctx = AppContext::open(event)?;
            let photo = resolve(event, &photo);
            let ratio = ratio.resolve(&ctx);
            let existed = crop::reset_crop_override(&ctx, &RustBackend::new(), &photo, ratio)?;
            ctx.save()?;
            if existed {
                println!("Reset {}", photo.display());
            } else {
                println!("No override on {}, regenerated", photo.display());
            }
        }
        Command::Sync => {
            let ledger = ledger::update_event_data(event, None)?;
            output::print_sessions(&ledger, event);
        }
        Command::Sessions => {
            let ledger = ledger::sync_from_folders(event, None)?;
            output::print_sessions(&ledger, event);
        }
        Command::DeleteSession { index } => {
            let ledger = ledger::delete_session(event, index)?;
            output::print_sessions(&ledger, event);
        }
        Command::PrintOrder { dir } => {
            let dir = resolve(event, &dir);
            for line in output::format_file_list(&print::print_order(&dir)?, &dir) {
                println!("{}", line);
            }
        }
        Command::ExportPdf { dir } => {
            let dir = resolve(event, &dir);
            let dpi = config::load_config(event)?
                .template_definition()
                .map_or(PRINT_DPI, |d| d.dpi);
            match print::export_pdf(&dir, dpi)? {
                Some(pdf) => println!("==> {}", pdf.display()),
                None => println!("No images in {}", dir.display()),
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn locate_encoder(ctx: &AppContext) -> Result<FfmpegEncoder, Box<dyn Error>> {
    let video = &ctx.config.video;
    Ok(FfmpegEncoder::locate(&video.ffmpeg, video.encoder_settings())?)
}

/// Ctrl-C asks the running job to stop at the next phase boundary.
fn cancel_on_ctrlc() -> Result<CancelFlag, ctrlc::Error> {
    let cancel = CancelFlag::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel())?;
    Ok(cancel)
}

/// Run `f` with a sender whose events are printed from a separate thread.
fn with_printer<T>(f: impl FnOnce(&Sender<RunEvent>) -> T) -> Result<T, Box<dyn Error>> {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_run_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = f(&tx);
    drop(tx);
    printer.join().map_err(|_| "output thread panicked")?;
    Ok(result)
}

/// Relative paths are taken from the event directory.
fn resolve(event: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        event.join(path)
    }
}

/// `NAME` or `NAME=COUNT` selections, resolved inside the session folder.
fn parse_selections(session: &Path, photos: &[String]) -> Result<Vec<(PathBuf, u32)>, String> {
    photos
        .iter()
        .map(|s| match s.split_once('=') {
            Some((name, count)) => {
                let count = count
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid count in '{s}'"))?;
                Ok((session.join(name.trim()), count))
            }
            None => Ok((session.join(s.trim()), 1)),
        })
        .collect()
}
