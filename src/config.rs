//! Pipeline configuration
//!
//! `Settings` mirrors the JSON file. `PipelineConfig` is the only form the
//! pipeline accepts and can only be obtained through validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::barcode::Symbology;
use crate::error::ConfigError;
use crate::validation::{resolve, Validator};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    pub templates_folder: PathBuf,
    pub temp_folder: PathBuf,
    pub python: ConverterSettings,
    pub barcode: BarcodeSettings,
    #[serde(default)]
    pub placeholders: PlaceholderTokens,
    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConverterSettings {
    pub executable_path: PathBuf,
    pub script_path: PathBuf,
    pub output_image_folder: PathBuf,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    pub parameters: ConverterParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConverterParameters {
    pub sheet_index: i64,
    pub cell_range: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BarcodeSettings {
    pub width: u32,
    pub height: u32,
    pub format: String,
    /// Print the payload under the bars.
    #[serde(default = "default_show_text")]
    pub show_text: bool,
}

fn default_show_text() -> bool { true }

/// Literal markers recognized in cell text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlaceholderTokens {
    #[serde(default = "default_heat_token")]
    pub heat: String,
    #[serde(default = "default_number_token")]
    pub number: String,
    #[serde(default = "default_barcode_token")]
    pub barcode: String,
}

fn default_heat_token() -> String { "[плавка]".to_string() }
fn default_number_token() -> String { "[номер]".to_string() }
fn default_barcode_token() -> String { "[шрихкод]".to_string() }

impl Default for PlaceholderTokens {
    fn default() -> Self {
        Self {
            heat: default_heat_token(),
            number: default_number_token(),
            barcode: default_barcode_token(),
        }
    }
}

/// What happens to a job's artifacts when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Keep everything until the caller cleans up; failures stay inspectable.
    #[default]
    Preserve,
    /// Roll back on failure, drop intermediates on success.
    Aggressive,
}

impl std::str::FromStr for CleanupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preserve" => Ok(CleanupPolicy::Preserve),
            "aggressive" => Ok(CleanupPolicy::Aggressive),
            other => Err(format!("unknown cleanup policy '{}'", other)),
        }
    }
}

/// Validated, resolved configuration. Read-only; share it through `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    templates_dir: PathBuf,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    executable: PathBuf,
    script: PathBuf,
    sheet_index: u32,
    cell_range: String,
    barcode_width: u32,
    barcode_height: u32,
    symbology: Symbology,
    barcode_caption: bool,
    timeout: Option<Duration>,
    placeholders: PlaceholderTokens,
    cleanup: CleanupPolicy,
}

impl PipelineConfig {
    /// Read and validate a JSON config file. Relative paths resolve against
    /// the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        Self::from_json_str(&content, base_dir)
    }

    pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(content)?;
        Self::from_settings(settings, base_dir)
    }

    /// Validate every setting, then create the temp and output folders.
    pub fn from_settings(settings: Settings, base_dir: &Path) -> Result<Self, ConfigError> {
        let violations = Validator::new().validate(&settings, base_dir);
        if !violations.is_empty() {
            return Err(ConfigError::Invalid(violations));
        }

        let templates_dir = canonical_dir(&resolve(base_dir, &settings.templates_folder))?;
        let temp_dir = ensure_dir(&resolve(base_dir, &settings.temp_folder))?;
        let output_dir = ensure_dir(&resolve(base_dir, &settings.python.output_image_folder))?;

        let symbology = settings
            .barcode
            .format
            .parse::<Symbology>()
            .map_err(|e| {
                ConfigError::Invalid(vec![crate::validation::ConfigViolation {
                    setting: "Barcode:Format",
                    message: e.to_string(),
                }])
            })?;
        let sheet_index = u32::try_from(settings.python.parameters.sheet_index).map_err(|_| {
            ConfigError::Invalid(vec![crate::validation::ConfigViolation {
                setting: "Python:Parameters:SheetIndex",
                message: "sheet index out of range".to_string(),
            }])
        })?;

        let config = Self {
            templates_dir,
            temp_dir,
            output_dir,
            executable: resolve(base_dir, &settings.python.executable_path),
            script: resolve(base_dir, &settings.python.script_path),
            sheet_index,
            cell_range: settings.python.parameters.cell_range,
            barcode_width: settings.barcode.width,
            barcode_height: settings.barcode.height,
            symbology,
            barcode_caption: settings.barcode.show_text,
            timeout: settings.python.timeout_seconds.map(Duration::from_secs),
            placeholders: settings.placeholders,
            cleanup: settings.cleanup,
        };

        tracing::info!(
            templates = %config.templates_dir.display(),
            output = %config.output_dir.display(),
            symbology = %config.symbology,
            "configuration validated"
        );
        Ok(config)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Same configuration with a different cleanup policy.
    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn templates_dir(&self) -> &Path { &self.templates_dir }
    pub fn temp_dir(&self) -> &Path { &self.temp_dir }
    pub fn output_dir(&self) -> &Path { &self.output_dir }
    pub fn executable(&self) -> &Path { &self.executable }
    pub fn script(&self) -> &Path { &self.script }
    pub fn sheet_index(&self) -> u32 { self.sheet_index }
    pub fn cell_range(&self) -> &str { &self.cell_range }
    pub fn barcode_width(&self) -> u32 { self.barcode_width }
    pub fn barcode_height(&self) -> u32 { self.barcode_height }
    pub fn symbology(&self) -> Symbology { self.symbology }
    pub fn barcode_caption(&self) -> bool { self.barcode_caption }
    pub fn timeout(&self) -> Option<Duration> { self.timeout }
    pub fn placeholders(&self) -> &PlaceholderTokens { &self.placeholders }
    pub fn cleanup(&self) -> CleanupPolicy { self.cleanup }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::canonicalize(path).map_err(|e| ConfigError::Directory {
        path: path.to_path_buf(),
        source: e,
    })
}

fn ensure_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(path).map_err(|e| ConfigError::Directory {
        path: path.to_path_buf(),
        source: e,
    })?;
    canonical_dir(path)
}
