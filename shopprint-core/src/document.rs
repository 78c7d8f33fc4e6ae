//! Turning print images into PDF pages: fresh documents and appends to the latest one.
//!
//! Every page is exactly one image, sized to the image at [`PAGE_DPI`]. All PDF bytes are
//! built in memory and staged in a temporary file inside the output directory, which is
//! renamed into place only once complete. A failure anywhere leaves no output file.
//!
//! Appending never re-renders the prior document. Its objects are loaded as-is with `lopdf`
//! and the freshly rendered pages are spliced onto the end of its page tree.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lopdf::{Object, ObjectId};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, RawImage, XObjectId, XObjectTransform,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::DocumentConfig;

pub const DOCUMENT_EXTENSION: &str = "pdf";
pub const PAGE_DPI: f32 = 300.0;
const UPDATED_SUFFIX: &str = "_updated";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("no images to assemble")]
    NoAssets,
    #[error("output directory {path} is not usable: {reason}")]
    OutputPathInvalid { path: PathBuf, reason: String },
    #[error("no existing .pdf document in {dir}")]
    NoPriorDocument { dir: PathBuf },
    #[error("image file not found: {path}")]
    MissingImage { path: PathBuf },
    #[error("could not read image {path}: {message}")]
    Image { path: PathBuf, message: String },
    #[error("could not parse document {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("could not merge new pages into {path}: {message}")]
    Merge { path: PathBuf, message: String },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Repeat each path `copies` times, contiguous, preserving order.
pub fn expand_copies(images: &[(PathBuf, u64)]) -> Vec<&Path> {
    images
        .iter()
        .flat_map(|(path, copies)| std::iter::repeat(path.as_path()).take(*copies as usize))
        .collect()
}

pub struct DocumentAssembler {
    output_dir: PathBuf,
    prefix: String,
}

impl DocumentAssembler {
    pub fn new(output_dir: impl Into<PathBuf>, config: &DocumentConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: config.prefix.clone(),
        }
    }

    /// Path a document created at `timestamp` (unix seconds) is written to.
    pub fn document_path(&self, timestamp: i64) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.{}", self.prefix, timestamp, DOCUMENT_EXTENSION))
    }

    /// Write a new document with one page per expanded copy, named after the current time.
    pub fn create_document(&self, images: &[(PathBuf, u64)]) -> Result<PathBuf, DocumentError> {
        self.create_document_at(images, chrono::Utc::now().timestamp())
    }

    pub fn create_document_at(
        &self,
        images: &[(PathBuf, u64)],
        timestamp: i64,
    ) -> Result<PathBuf, DocumentError> {
        let pages = expand_copies(images);
        if pages.is_empty() {
            warn!("No images found to create PDF");
            return Err(DocumentError::NoAssets);
        }
        self.ensure_output_dir()?;

        let target = self.document_path(timestamp);
        let bytes = self.render_pages(&pages)?;
        write_atomically(&self.output_dir, &target, &bytes)?;

        info!(path = %target.display(), pages = pages.len(), "PDF created");
        Ok(target)
    }

    /// Most recently modified `.pdf` in the output directory.
    pub fn most_recent_document(&self) -> Result<PathBuf, DocumentError> {
        let no_prior = || DocumentError::NoPriorDocument {
            dir: self.output_dir.clone(),
        };
        let entries = fs::read_dir(&self.output_dir).map_err(|e| {
            warn!(error = ?e, dir = %self.output_dir.display(), "Cannot list output directory");
            no_prior()
        })?;

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_document = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(DOCUMENT_EXTENSION));
            if !is_document || !path.is_file() {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            // ties broken by name so the choice is stable
            let newer = match &newest {
                None => true,
                Some((t, p)) => (modified, &path) > (*t, p),
            };
            if newer {
                newest = Some((modified, path));
            }
        }

        let (_, path) = newest.ok_or_else(no_prior)?;
        info!(path = %path.display(), "Most recent PDF");
        Ok(path)
    }

    /// Write `<stem>_updated.pdf` holding every page of the most recent document plus one
    /// page for `image`. The source document is left untouched.
    pub fn append_image(&self, image: &Path) -> Result<PathBuf, DocumentError> {
        self.append_images(&[(image.to_path_buf(), 1)])
    }

    /// Like [`append_image`](Self::append_image), for several images with copy counts.
    pub fn append_images(&self, images: &[(PathBuf, u64)]) -> Result<PathBuf, DocumentError> {
        let source = self.most_recent_document()?;
        for (path, _) in images {
            if !path.is_file() {
                error!(path = %path.display(), "Image file not found");
                return Err(DocumentError::MissingImage { path: path.clone() });
            }
        }
        let pages = expand_copies(images);
        if pages.is_empty() {
            return Err(DocumentError::NoAssets);
        }

        let original = fs::read(&source).map_err(|e| DocumentError::Io {
            path: source.clone(),
            source: e,
        })?;
        let mut merged =
            lopdf::Document::load_mem(&original).map_err(|e| DocumentError::Parse {
                path: source.clone(),
                message: e.to_string(),
            })?;
        let prior_pages = merged.get_pages().len();

        let rendered = self.render_pages(&pages)?;
        let merge_err = |e: lopdf::Error| DocumentError::Merge {
            path: source.clone(),
            message: e.to_string(),
        };
        let addition = lopdf::Document::load_mem(&rendered).map_err(merge_err)?;
        splice_pages(&mut merged, addition).map_err(merge_err)?;

        let mut bytes = Vec::new();
        merged
            .save_to(&mut bytes)
            .map_err(|e| DocumentError::Merge {
                path: source.clone(),
                message: e.to_string(),
            })?;
        let target = updated_path(&source);
        write_atomically(&self.output_dir, &target, &bytes)?;

        info!(
            source = %source.display(),
            path = %target.display(),
            prior_pages,
            added_pages = pages.len(),
            "Updated PDF created"
        );
        Ok(target)
    }

    /// Serialise a standalone document holding one page per entry of `pages`.
    fn render_pages(&self, pages: &[&Path]) -> Result<Vec<u8>, DocumentError> {
        let mut doc = PdfDocument::new(&self.prefix);
        let mut builder = PageBuilder::default();
        let new_pages = pages
            .iter()
            .map(|path| builder.page_for(&mut doc, path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut warnings = Vec::new();
        let bytes = doc
            .with_pages(new_pages)
            .save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(count = warnings.len(), "PDF serialisation produced warnings");
        }
        Ok(bytes)
    }

    fn ensure_output_dir(&self) -> Result<(), DocumentError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(DocumentError::OutputPathInvalid {
                path: self.output_dir.clone(),
                reason: "path is empty".into(),
            });
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            error!(error = ?e, path = %self.output_dir.display(), "PDF path is incorrect");
            DocumentError::OutputPathInvalid {
                path: self.output_dir.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// `<dir>/<stem>_updated.pdf` for `<dir>/<stem>.pdf`.
pub fn updated_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}{UPDATED_SUFFIX}.{DOCUMENT_EXTENSION}"))
}

/// Move every page of `addition` to the end of `target`'s root page tree.
///
/// `addition` is renumbered above `target`'s highest object id first, so none of the
/// target's objects are rewritten. Its catalog, page root and info dictionary are dropped.
fn splice_pages(
    target: &mut lopdf::Document,
    mut addition: lopdf::Document,
) -> lopdf::Result<usize> {
    let highest = target.objects.keys().map(|(number, _)| *number).max().unwrap_or(0);
    addition.renumber_objects_with(target.max_id.max(highest) + 1);

    let root_pages = target.catalog()?.get(b"Pages")?.as_reference()?;
    let catalog_id = addition.trailer.get(b"Root")?.as_reference()?;
    let added_root = addition.catalog()?.get(b"Pages")?.as_reference()?;
    let page_ids: Vec<ObjectId> = addition.page_iter().collect();

    for id in &page_ids {
        addition
            .get_dictionary_mut(*id)?
            .set("Parent", Object::Reference(root_pages));
    }
    addition.objects.remove(&catalog_id);
    addition.objects.remove(&added_root);
    if let Ok(info) = addition.trailer.get(b"Info").and_then(Object::as_reference) {
        addition.objects.remove(&info);
    }

    target.max_id = target.max_id.max(addition.max_id);
    target.objects.extend(addition.objects);

    let tree = target.get_dictionary_mut(root_pages)?;
    let count = tree.get(b"Count").and_then(Object::as_i64)?;
    tree.get_mut(b"Kids")?
        .as_array_mut()?
        .extend(page_ids.iter().map(|id| Object::Reference(*id)));
    tree.set("Count", count + page_ids.len() as i64);

    debug!(added = page_ids.len(), "Spliced pages into document");
    Ok(page_ids.len())
}

/// Decodes each distinct image once and emits one full-bleed page per use.
#[derive(Default)]
struct PageBuilder {
    decoded: HashMap<PathBuf, (XObjectId, Mm, Mm)>,
}

impl PageBuilder {
    fn page_for(&mut self, doc: &mut PdfDocument, path: &Path) -> Result<PdfPage, DocumentError> {
        let (id, width, height) = match self.decoded.get(path) {
            Some(entry) => entry.clone(),
            None => {
                let entry = decode_into(doc, path)?;
                self.decoded.insert(path.to_path_buf(), entry.clone());
                entry
            }
        };
        let ops = vec![Op::UseXobject {
            id,
            transform: XObjectTransform {
                dpi: Some(PAGE_DPI),
                ..Default::default()
            },
        }];
        Ok(PdfPage::new(width, height, ops))
    }
}

fn decode_into(doc: &mut PdfDocument, path: &Path) -> Result<(XObjectId, Mm, Mm), DocumentError> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DocumentError::MissingImage {
                path: path.to_path_buf(),
            }
        } else {
            DocumentError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    let mut warnings = Vec::new();
    let image = RawImage::decode_from_bytes(&bytes, &mut warnings).map_err(|message| {
        error!(path = %path.display(), %message, "Failed to decode image");
        DocumentError::Image {
            path: path.to_path_buf(),
            message,
        }
    })?;
    let width = px_to_mm(image.width);
    let height = px_to_mm(image.height);
    let id = doc.add_image(&image);
    debug!(
        path = %path.display(),
        width_px = image.width,
        height_px = image.height,
        "Decoded image"
    );
    Ok((id, width, height))
}

fn px_to_mm(px: usize) -> Mm {
    Mm(px as f32 / PAGE_DPI * 25.4)
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| DocumentError::Io { path, source }
    };
    // `.part` keeps half-written files out of the most-recent scan
    let mut staged = tempfile::Builder::new()
        .prefix(".shopprint-")
        .suffix(".pdf.part")
        .tempfile_in(dir)
        .map_err(io_err(dir))?;
    staged.write_all(bytes).map_err(io_err(staged.path()))?;
    staged.as_file().sync_all().map_err(io_err(target))?;
    staged
        .persist(target)
        .map_err(|e| io_err(target)(e.error))?;
    Ok(())
}
