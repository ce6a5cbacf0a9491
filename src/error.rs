//! Error taxonomy
//!
//! `ConfigError` is fatal at startup. `PipelineError` aborts one job only.
//! Cleanup problems are never errors; see [`crate::artifacts::CleanupReport`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::barcode::BarcodeError;
use crate::spreadsheet::DocumentError;
use crate::validation::ConfigViolation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Configuration invalid: {}", join_violations(.0))]
    Invalid(Vec<ConfigViolation>),

    #[error("Failed to prepare directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Template not found for label '{label}': {path}")]
    TemplateNotFound { label: String, path: PathBuf },

    #[error("Barcode encoding failed: {0}")]
    Encoding(#[from] BarcodeError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("{step} failed for '{path}': {source}")]
    Io {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start converter '{executable}': {source}")]
    ConversionSpawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion failed (exit status {}): {stderr}", display_status(.status))]
    ConversionFailed { status: Option<i32>, stderr: String },

    #[error("Conversion timed out after {}s", .timeout.as_secs())]
    ConversionTimedOut { timeout: Duration },

    #[error("Job has already been processed")]
    JobAlreadyRun,
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl PipelineError {
    pub(crate) fn io(step: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            step,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
