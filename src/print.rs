//! Printing: composing sheets for a session and handing them to a printer.
//!
//! Sheets go to the printer in the order they were written, so everything
//! here lists images by modification time. [`assemble_pdf`] bundles them into
//! `print_session.pdf`, one image per page at print size, for print dialogs
//! that only take a single document.
//!
//! Reprints of selected photos go to a fresh `template_output(i)` folder next
//! to the session's main `template_output`, so earlier batches stay intact.

use crate::compose::{CompositeRequest, CompositionError, compose_prints};
use crate::derive::RunDirGuard;
use crate::duplicates::{print_sources, remove_copies};
use crate::imaging::load_oriented;
use crate::naming::{copy_path, normalized_path, reprint_folder_name};
use crate::state::AppContext;
use crate::types::is_photo;
use lopdf::{Document, Object, Stream, dictionary};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// File name of the assembled print document.
pub const PDF_FILENAME: &str = "print_session.pdf";

/// PDF user space units per inch.
const POINTS_PER_INCH: f64 = 72.0;

#[derive(Error, Debug)]
pub enum PrintError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error("No template artwork in the event folder")]
    NoArtwork,
    #[error("Template '{0}' is not defined")]
    UnknownTemplate(String),
    #[error("No photos selected")]
    NoSelection,
    #[error("Failed to read {}: {message}", .path.display())]
    Image { path: PathBuf, message: String },
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Photos directly in `dir`, oldest first. Ties keep name order.
pub fn print_order(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut items: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_photo(p))
        .map(|p| -> io::Result<_> { Ok((fs::metadata(&p)?.modified()?, p)) })
        .collect::<io::Result<_>>()?;
    items.sort();
    Ok(items.into_iter().map(|(_, p)| p).collect())
}

/// Create the first free `template_output(i)` inside a session folder.
pub fn create_reprint_folder(session_output: &Path) -> io::Result<PathBuf> {
    let mut i = 1;
    loop {
        let dir = session_output.join(reprint_folder_name(i));
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            return Ok(dir);
        }
        i += 1;
    }
}

/// Compose `photos` into `out_dir` with the event's template settings.
///
/// Also writes `print_session.pdf` when `template.export_pdf` is set.
pub fn compose_session(
    ctx: &AppContext,
    photos: &[PathBuf],
    out_dir: &Path,
    progress: impl FnMut(u8),
) -> Result<Vec<PathBuf>, PrintError> {
    let artwork = ctx.template_artwork().ok_or(PrintError::NoArtwork)?;
    let definition = ctx
        .config
        .template_definition()
        .ok_or_else(|| PrintError::UnknownTemplate(ctx.config.template.name.clone()))?;

    info!(
        photos = photos.len(),
        template = %ctx.config.template.name,
        out = %out_dir.display(),
        "composing prints"
    );
    let sheets = compose_prints(
        &CompositeRequest {
            photos,
            artwork: &artwork,
            output_dir: out_dir,
            definition,
            offset: ctx.config.position_offset(),
        },
        progress,
    )?;

    if ctx.config.template.export_pdf {
        export_pdf(out_dir, definition.dpi)?;
    }
    Ok(sheets)
}

/// Compose a reprint of selected working photos.
///
/// `selections` pairs a working photo with how many prints it gets; a count
/// above one prints only the numbered copies, zero skips the photo. Returns
/// the new `template_output(i)` folder.
pub fn print_selected(
    ctx: &AppContext,
    session_output: &Path,
    selections: &[(PathBuf, u32)],
    progress: impl FnMut(u8),
) -> Result<PathBuf, PrintError> {
    if selections.iter().all(|(_, c)| *c == 0) {
        return Err(PrintError::NoSelection);
    }
    let out_dir = create_reprint_folder(session_output)?;
    let guard = RunDirGuard::new(&out_dir);

    let mut photos = Vec::new();
    let mut copies = Vec::new();
    for (path, count) in selections {
        match *count {
            0 => {}
            1 => photos.push(path.clone()),
            n => {
                for k in 1..=n {
                    let dest = copy_path(path, k);
                    fs::copy(path, &dest)?;
                    copies.push(dest.clone());
                    photos.push(dest);
                }
            }
        }
    }

    let mut normalized = Vec::with_capacity(photos.len());
    for path in photos {
        let clean = normalized_path(&path);
        if clean != path && !clean.exists() {
            fs::rename(&path, &clean)?;
            if let Some(c) = copies.iter_mut().find(|c| **c == path) {
                *c = clean.clone();
            }
            normalized.push(clean);
        } else {
            normalized.push(path);
        }
    }

    let sources = print_sources(ctx, &normalized, &ctx.digital_photos());
    let result = compose_session(ctx, &sources, &out_dir, progress);
    let removed = remove_copies(&copies);
    debug!(removed, "removed reprint copies");
    result?;

    guard.commit();
    Ok(out_dir)
}

/// Write `print_session.pdf` from the images in `dir`, in print order.
///
/// Returns `None` when there is nothing to print.
pub fn export_pdf(dir: &Path, dpi: u32) -> Result<Option<PathBuf>, PrintError> {
    let images = print_order(dir)?;
    if images.is_empty() {
        return Ok(None);
    }
    let pdf = dir.join(PDF_FILENAME);
    assemble_pdf(&images, &pdf, dpi)?;
    Ok(Some(pdf))
}

/// One page per image, each page exactly the image's print size at `dpi`.
pub fn assemble_pdf(images: &[PathBuf], pdf_path: &Path, dpi: u32) -> Result<(), PrintError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let scale = POINTS_PER_INCH / dpi.max(1) as f64;

    let mut kids = Vec::with_capacity(images.len());
    for path in images {
        let img = load_oriented(path).map_err(|e| PrintError::Image {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb.into_raw(),
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! {
                "Im1" => image_id,
            },
        });

        let page_w = width as f64 * scale;
        let page_h = height as f64 * scale;
        let content = format!("q\n{page_w:.3} 0 0 {page_h:.3} 0 0 cm\n/Im1 Do\nQ\n");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_w as f32), Object::Real(page_h as f32)],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(pdf_path)?;
    info!(pdf = %pdf_path.display(), pages = count, "assembled print document");
    Ok(())
}
