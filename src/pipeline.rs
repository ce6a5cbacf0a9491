//! Print Pipeline - Single Entry Point
//!
//! Staging -> Converting -> Done, with Failed reachable from every step.
//! A job's artifacts belong to its `PrintJob`; what happens to them when the
//! job ends is decided by the cleanup policy, never by the steps themselves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactTracker, CleanupReport};
use crate::barcode::{BarcodeEncoder, BarcodeGenerator, LinearEncoder};
use crate::config::{CleanupPolicy, PipelineConfig};
use crate::convert::{ConversionRequest, Converter};
use crate::error::{PipelineError, Result};
use crate::job::Job;
use crate::spreadsheet::SpreadsheetBackend;
use crate::template::TemplateInstantiator;
use crate::xlsx::XlsxBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Staging,
    Converting,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Staging => "staging",
            JobState::Converting => "converting",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The print pipeline. Shareable across threads; every job gets its own
/// artifact namespace and tracker.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    instantiator: TemplateInstantiator,
    converter: Converter,
}

impl Pipeline {
    /// Production constructor: `.xlsx` documents, configured symbology.
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        let encoder =
            LinearEncoder::new(config.symbology()).with_caption(config.barcode_caption());
        Self::with_components(config, Box::new(XlsxBackend), Box::new(encoder))
    }

    /// Inject a document backend and barcode encoder.
    pub fn with_components(
        config: Arc<PipelineConfig>,
        backend: Box<dyn SpreadsheetBackend>,
        encoder: Box<dyn BarcodeEncoder>,
    ) -> Self {
        let barcodes =
            BarcodeGenerator::new(encoder, config.barcode_width(), config.barcode_height());
        let instantiator = TemplateInstantiator::new(
            config.templates_dir(),
            config.temp_dir(),
            config.placeholders().clone(),
            backend,
            barcodes,
        );
        let converter = Converter::new(config.executable(), config.script(), config.timeout());

        Self {
            config,
            instantiator,
            converter,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Begin a job. Nothing touches the disk until `process_file`.
    pub fn start(&self, job: Job) -> PrintJob<'_> {
        PrintJob {
            pipeline: self,
            job,
            tracker: ArtifactTracker::new(),
            state: JobState::Staging,
            started: false,
            staged: None,
            output: None,
            policy: self.config.cleanup(),
        }
    }

    /// Run one job under the configured cleanup policy.
    ///
    /// With `Preserve` every artifact stays on disk and is handed back in the
    /// outcome or failure for the caller to clean up. With `Aggressive` a
    /// failure rolls everything back and a success keeps only the image.
    pub fn run(&self, job: Job) -> std::result::Result<JobOutcome, JobFailure> {
        let mut print_job = self.start(job);
        let result = print_job.process_file();

        if print_job.policy == CleanupPolicy::Aggressive {
            match &result {
                Ok(_) => print_job.discard_intermediates(),
                Err(_) => print_job.rollback(),
            }
        }

        let artifacts = print_job.take_artifacts();
        match result {
            Ok(image) => Ok(JobOutcome { image, artifacts }),
            Err(error) => Err(JobFailure { error, artifacts }),
        }
    }
}

/// A successful [`Pipeline::run`]: the image and whatever the policy left
/// on disk.
#[derive(Debug)]
pub struct JobOutcome {
    image: PathBuf,
    artifacts: ArtifactTracker,
}

impl JobOutcome {
    pub fn image(&self) -> &Path {
        &self.image
    }

    /// Paths still owned by the job. Under `Preserve` this includes the image.
    pub fn artifacts(&self) -> &[PathBuf] {
        self.artifacts.paths()
    }

    /// Delete every remaining artifact. Safe to call any number of times.
    pub fn cleanup(&mut self) -> CleanupReport {
        self.artifacts.cleanup_all()
    }

    pub fn into_image(self) -> PathBuf {
        self.image
    }
}

/// A failed [`Pipeline::run`] together with the artifacts left for diagnosis.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct JobFailure {
    error: PipelineError,
    artifacts: ArtifactTracker,
}

impl JobFailure {
    pub fn error(&self) -> &PipelineError {
        &self.error
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        self.artifacts.paths()
    }

    pub fn cleanup(&mut self) -> CleanupReport {
        self.artifacts.cleanup_all()
    }

    pub fn into_error(self) -> PipelineError {
        self.error
    }
}

impl From<JobFailure> for PipelineError {
    fn from(failure: JobFailure) -> Self {
        failure.error
    }
}

/// One job in flight: its inputs, state and artifacts.
pub struct PrintJob<'a> {
    pipeline: &'a Pipeline,
    job: Job,
    tracker: ArtifactTracker,
    state: JobState,
    started: bool,
    staged: Option<PathBuf>,
    output: Option<PathBuf>,
    policy: CleanupPolicy,
}

impl<'a> PrintJob<'a> {
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn policy(&self) -> CleanupPolicy {
        self.policy
    }

    /// Every path this job has registered, in creation order.
    pub fn artifacts(&self) -> &[PathBuf] {
        self.tracker.paths()
    }

    /// The filled-in document handed to the converter, once staged.
    pub fn staged_document(&self) -> Option<&Path> {
        self.staged.as_deref()
    }

    /// Stage, convert, return the image path. Artifacts are left in place
    /// whatever the outcome; call [`PrintJob::cleanup`] when done with them.
    pub fn process_file(&mut self) -> Result<PathBuf> {
        if self.started {
            return Err(PipelineError::JobAlreadyRun);
        }
        self.started = true;

        let _span = info_span!(
            "print_job",
            id = self.job.id(),
            label = self.job.label(),
        )
        .entered();

        match self.advance() {
            Ok(image) => {
                self.output = Some(image.clone());
                self.transition(JobState::Done);
                info!(image = %image.display(), "label rendered");
                Ok(image)
            }
            Err(e) => {
                self.transition(JobState::Failed);
                error!(error = %e, artifacts = self.tracker.paths().len(), "job failed");
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<PathBuf> {
        let pipeline = self.pipeline;

        let document = pipeline.instantiator.instantiate(&self.job, &mut self.tracker)?;
        self.staged = Some(document.clone());

        self.transition(JobState::Converting);
        let output_dir = pipeline.config.output_dir();
        std::fs::create_dir_all(output_dir)
            .map_err(|e| PipelineError::io("create output folder", output_dir, e))?;
        let image = output_dir.join(format!("{}.png", Uuid::new_v4()));
        self.tracker.track(&image);

        let request = ConversionRequest {
            source: document,
            destination: image.clone(),
            sheet_index: pipeline.config.sheet_index(),
            cell_range: pipeline.config.cell_range().to_string(),
        };
        pipeline.converter.convert(&request)?;

        Ok(image)
    }

    /// Delete every artifact of this job. Safe to call any number of times.
    pub fn cleanup(&mut self) -> CleanupReport {
        let report = self.tracker.cleanup_all();
        if !report.removed.is_empty() || !report.failed.is_empty() {
            info!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "artifacts cleaned up"
            );
        }
        report
    }

    /// Hand the image to the caller and delete everything else.
    pub(crate) fn discard_intermediates(&mut self) {
        if let Some(image) = &self.output {
            self.tracker.release(image);
        }
        self.cleanup();
    }

    /// Aggressive-policy failure path.
    pub(crate) fn rollback(&mut self) {
        warn!(state = %self.state, "rolling back job artifacts");
        self.cleanup();
    }

    /// Move the artifacts out; the job no longer owns anything on disk.
    fn take_artifacts(&mut self) -> ArtifactTracker {
        std::mem::take(&mut self.tracker)
    }

    fn transition(&mut self, next: JobState) {
        debug!(from = %self.state, to = %next, "job state");
        self.state = next;
    }
}

impl Drop for PrintJob<'_> {
    fn drop(&mut self) {
        if self.tracker.is_empty() {
            return;
        }
        match self.policy {
            CleanupPolicy::Aggressive if self.state == JobState::Done => {
                self.discard_intermediates();
            }
            CleanupPolicy::Aggressive => self.rollback(),
            CleanupPolicy::Preserve => {
                debug!(count = self.tracker.paths().len(), "leaving job artifacts on disk");
            }
        }
    }
}
