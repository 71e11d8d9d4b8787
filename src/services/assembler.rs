//! PDF assembly from validated images using `printpdf` 0.8.
//!
//! Every image becomes exactly one page. Images are decoded in full here, so a
//! file that passed the header check but has broken pixel data fails the whole
//! document; there is no partial-PDF fallback.
//!
//! Output is deterministic: image resources are named by page number and the
//! trailer `/ID` is a digest of the document, so the same inputs always yield
//! the same bytes.

use crate::models::{CandidateImage, LayoutPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use image::ImageReader;
use lopdf::{Object, StringFormat};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObject, XObjectId, XObjectTransform,
};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use tempfile::NamedTempFile;
use thiserror::Error;

/// At 72 DPI one image pixel is one PDF point.
const NATIVE_DPI: f32 = 72.0;

/// Errors raised while building the PDF document.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No images to assemble")]
    NoImages,

    #[error("Failed to encode {name}: {message}")]
    Image { name: String, message: String },

    #[error("Failed to finalize PDF: {0}")]
    Document(String),
}

/// The finished document could not be written to its destination.
#[derive(Error, Debug)]
#[error("Failed to write {path}: {source}")]
pub struct WriteError {
    pub path: Utf8PathBuf,
    #[source]
    pub source: io::Error,
}

/// Builds a multi-page PDF from an ordered image list under one layout policy.
#[derive(Debug, Clone)]
pub struct PdfAssembler {
    policy: LayoutPolicy,
}

impl PdfAssembler {
    pub fn new(policy: LayoutPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LayoutPolicy {
        self.policy
    }

    /// Produce the PDF bytes, one page per image in list order.
    pub fn assemble(&self, images: &[CandidateImage], title: &str) -> Result<Vec<u8>, AssemblyError> {
        if images.is_empty() {
            return Err(AssemblyError::NoImages);
        }

        let mut doc = PdfDocument::new(title);
        let mut pages = Vec::with_capacity(images.len());

        for (index, candidate) in images.iter().enumerate() {
            let image_error = |message: String| AssemblyError::Image {
                name: candidate.display_name.clone(),
                message,
            };

            // Sniff the format like the validator does; extensions can lie.
            let decoded = ImageReader::open(&candidate.path)
                .map_err(|e| image_error(e.to_string()))?
                .with_guessed_format()
                .map_err(|e| image_error(e.to_string()))?
                .decode()
                .map_err(|e| image_error(e.to_string()))?;
            let (width, height) = (decoded.width(), decoded.height());
            if width == 0 || height == 0 {
                return Err(image_error("image has zero width or height".into()));
            }

            let raw = RawImage {
                pixels: RawImageData::U8(decoded.to_rgb8().into_raw()),
                width: width as usize,
                height: height as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = XObjectId(format!("Im{}", index + 1));
            doc.resources
                .xobjects
                .map
                .insert(xobject_id.clone(), XObject::Image(raw));

            let placement = self.policy.place(width, height);
            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(placement.x)),
                    translate_y: Some(Pt(placement.y)),
                    scale_x: Some(placement.scale),
                    scale_y: Some(placement.scale),
                    dpi: Some(NATIVE_DPI),
                    rotate: None,
                },
            }];

            tracing::debug!(
                "Placed {} ({}x{}) at scale {:.3} on a {:.1}x{:.1}pt page",
                candidate.display_name,
                width,
                height,
                placement.scale,
                placement.page_width,
                placement.page_height
            );

            pages.push(PdfPage::new(
                pt_to_mm(placement.page_width),
                pt_to_mm(placement.page_height),
                ops,
            ));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let bytes = stamp_document_id(&doc.save(&PdfSaveOptions::default(), &mut warnings))?;

        tracing::info!(
            "Assembled {} page(s), {} bytes ({} encoder warning(s))",
            images.len(),
            bytes.len(),
            warnings.len()
        );
        Ok(bytes)
    }

    /// Write `bytes` to `destination`, replacing any existing file atomically.
    ///
    /// The parent directory is created if missing; failing to create it is not
    /// an error by itself, the write that follows reports the real problem.
    pub fn write(&self, bytes: &[u8], destination: &Utf8Path) -> Result<(), WriteError> {
        let parent = destination
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));

        if let Err(e) = fs::create_dir_all(parent) {
            tracing::debug!("Could not create output directory {}: {}", parent, e);
        }

        let persist = || -> io::Result<()> {
            let mut temp = NamedTempFile::new_in(parent)?;
            temp.write_all(bytes)?;
            temp.as_file().sync_all()?;
            temp.persist(destination).map_err(|e| e.error)?;
            Ok(())
        };

        persist().map_err(|source| WriteError {
            path: destination.to_path_buf(),
            source,
        })?;

        tracing::info!("Wrote PDF to {}", destination);
        Ok(())
    }
}

/// Replace printpdf's random trailer `/ID` with a SHA-256 digest of the
/// document saved without one.
fn stamp_document_id(bytes: &[u8]) -> Result<Vec<u8>, AssemblyError> {
    let finalize = |e: lopdf::Error| AssemblyError::Document(e.to_string());

    let mut doc = lopdf::Document::load_mem(bytes).map_err(finalize)?;
    doc.trailer.remove(b"ID");

    let mut unstamped = Vec::with_capacity(bytes.len());
    doc.save_to(&mut unstamped)
        .map_err(|e| AssemblyError::Document(e.to_string()))?;

    let digest = Sha256::digest(&unstamped);
    let id = Object::String(digest[..16].to_vec(), StringFormat::Hexadecimal);
    doc.trailer.set("ID", Object::Array(vec![id.clone(), id]));

    let mut stamped = Vec::with_capacity(unstamped.len() + 80);
    doc.save_to(&mut stamped)
        .map_err(|e| AssemblyError::Document(e.to_string()))?;
    Ok(stamped)
}

fn pt_to_mm(points: f32) -> Mm {
    Mm(points / 72.0 * 25.4)
}
