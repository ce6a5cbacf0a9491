//! HeatLabel Core - spreadsheet template to print-ready label image
//!
//! # Job lifecycle
//! 1. A template copy is staged and its placeholders filled
//! 2. Barcode cells become vertical barcode pictures
//! 3. An external converter rasterizes the configured range to PNG
//! 4. Every temporary file is owned by the job and reclaimed on request,
//!    or automatically under the aggressive cleanup policy

pub mod artifacts;
pub mod barcode;
pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod manifest;
pub mod pipeline;
pub mod spreadsheet;
pub mod template;
pub mod validation;
pub mod xlsx;

pub use artifacts::{ArtifactTracker, CleanupReport};
pub use barcode::{BarcodeEncoder, BarcodeError, BarcodeGenerator, LinearEncoder, Symbology};
pub use config::{CleanupPolicy, PipelineConfig, PlaceholderTokens};
pub use convert::{ConversionRequest, Converter};
pub use error::{ConfigError, PipelineError};
pub use job::Job;
pub use manifest::PrintManifest;
pub use pipeline::{JobFailure, JobOutcome, JobState, Pipeline, PrintJob};
pub use spreadsheet::{CellRef, DocumentError, SpreadsheetBackend, SpreadsheetDocument};
pub use template::TemplateInstantiator;
pub use xlsx::XlsxBackend;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
