//! Template Instantiator
//!
//! Stages a private copy of a template, fills the placeholders for one job
//! and saves the result to a fresh path. Everything written on disk is
//! registered with the job's tracker before control returns, including on
//! failure.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::artifacts::ArtifactTracker;
use crate::barcode::BarcodeGenerator;
use crate::config::PlaceholderTokens;
use crate::error::{PipelineError, Result};
use crate::job::Job;
use crate::spreadsheet::{CellRef, PictureSize, SpreadsheetBackend, SpreadsheetDocument};

pub const TEMPLATE_EXTENSION: &str = "xlsx";

/// Result of substituting one cell's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSubstitution {
    pub text: String,
    /// The cell carried the barcode token and must become a picture.
    pub barcode: bool,
}

impl CellSubstitution {
    fn changed_from(&self, original: &str) -> bool {
        self.barcode || self.text != original
    }
}

/// Replace heat, then number; then check the original text for the barcode
/// token. A barcode cell ends up with empty text.
pub fn substitute(text: &str, tokens: &PlaceholderTokens, job: &Job) -> CellSubstitution {
    let replaced = text
        .replace(&tokens.heat, &job.measurement_text())
        .replace(&tokens.number, &job.id_text());

    if text.contains(&tokens.barcode) {
        CellSubstitution {
            text: String::new(),
            barcode: true,
        }
    } else {
        CellSubstitution {
            text: replaced,
            barcode: false,
        }
    }
}

pub struct TemplateInstantiator {
    templates_dir: PathBuf,
    temp_dir: PathBuf,
    tokens: PlaceholderTokens,
    backend: Box<dyn SpreadsheetBackend>,
    barcodes: BarcodeGenerator,
}

impl TemplateInstantiator {
    pub fn new(
        templates_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        tokens: PlaceholderTokens,
        backend: Box<dyn SpreadsheetBackend>,
        barcodes: BarcodeGenerator,
    ) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            temp_dir: temp_dir.into(),
            tokens,
            backend,
            barcodes,
        }
    }

    /// `{templates}/{label}.xlsx`, or `TemplateNotFound`.
    pub fn template_path(&self, label: &str) -> Result<PathBuf> {
        let file_name = format!("{}.{}", label, TEMPLATE_EXTENSION);
        let path = self.templates_dir.join(&file_name);

        // The label must be a bare stem, never a path into another directory.
        let plain = Path::new(&file_name).file_name() == Some(OsStr::new(&file_name));
        if !plain || label.is_empty() || !path.is_file() {
            return Err(PipelineError::TemplateNotFound {
                label: label.to_string(),
                path,
            });
        }
        Ok(path)
    }

    /// Produce the filled-in document for `job` and return its path.
    pub fn instantiate(&self, job: &Job, tracker: &mut ArtifactTracker) -> Result<PathBuf> {
        let _span = info_span!("instantiate", label = job.label()).entered();

        let template = self.template_path(job.label())?;

        let staged = self.fresh_path(TEMPLATE_EXTENSION);
        std::fs::copy(&template, &staged)
            .map_err(|e| PipelineError::io("copy template", &staged, e))?;
        tracker.track(&staged);
        debug!(template = %template.display(), staged = %staged.display(), "template staged");

        let mut document = self.backend.open(&staged)?;
        for sheet in 0..document.sheet_count() {
            self.fill_sheet(document.as_mut(), sheet, job, tracker)?;
        }

        let saved = self.fresh_path(TEMPLATE_EXTENSION);
        tracker.track(&saved);
        document.save_as(&saved)?;

        info!(document = %saved.display(), "template instantiated");
        Ok(saved)
    }

    fn fill_sheet(
        &self,
        document: &mut dyn SpreadsheetDocument,
        sheet: usize,
        job: &Job,
        tracker: &mut ArtifactTracker,
    ) -> Result<()> {
        for (cell, text) in document.text_cells(sheet)? {
            let update = substitute(&text, &self.tokens, job);
            if !update.changed_from(&text) {
                continue;
            }

            document.set_cell_text(sheet, cell, &update.text)?;
            if update.barcode {
                self.embed_barcode(document, sheet, cell, job, tracker)?;
            }
            debug!(sheet, cell = %cell, "placeholders replaced");
        }
        Ok(())
    }

    fn embed_barcode(
        &self,
        document: &mut dyn SpreadsheetDocument,
        sheet: usize,
        cell: CellRef,
        job: &Job,
        tracker: &mut ArtifactTracker,
    ) -> Result<()> {
        let raster = self.barcodes.generate(&job.barcode_payload())?;
        let size = PictureSize {
            width: raster.width(),
            height: raster.height(),
        };

        let image_path = self.fresh_path("png");
        tracker.track(&image_path);
        raster
            .save_with_format(&image_path, image::ImageFormat::Png)
            .map_err(|e| {
                PipelineError::io(
                    "write barcode image",
                    &image_path,
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })?;

        if let Err(e) = document.add_picture(sheet, cell, &image_path, size) {
            tracker.cleanup_one(&image_path);
            return Err(e.into());
        }

        debug!(cell = %cell, width = size.width, height = size.height, "barcode embedded");
        Ok(())
    }

    fn fresh_path(&self, extension: &str) -> PathBuf {
        self.temp_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension))
    }
}
