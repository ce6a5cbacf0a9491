//! Print Manifest - what was rendered, and a SHA-256 to prove it
//!
//! Emitted after a successful job so the print spooler (or an operator) can
//! confirm the image it sends is the one the pipeline produced.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::job::Job;
use crate::ENGINE_VERSION;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize)]
pub struct PrintManifest {
    pub image_path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub job: Job,
    pub barcode_payload: String,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
}

impl PrintManifest {
    /// Read the rendered image and describe it.
    pub fn for_image(job: &Job, image_path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(image_path)?;
        Ok(Self {
            image_path: image_path.to_path_buf(),
            size_bytes: data.len() as u64,
            sha256: sha256_hex(&data),
            job: job.clone(),
            barcode_payload: job.barcode_payload(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
        })
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
