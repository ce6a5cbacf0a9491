//! Configuration Validation - Rules Produce Violations
//!
//! Every rule runs; the validator collects all violations so a broken
//! deployment is reported in one pass instead of one error per restart.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::barcode::Symbology;
use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigViolation {
    pub setting: &'static str,
    pub message: String,
}

impl ConfigViolation {
    fn new(setting: &'static str, message: impl Into<String>) -> Self {
        Self {
            setting,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.setting, self.message)
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, settings: &Settings, base_dir: &Path) -> Vec<ConfigViolation>;
}

pub(crate) fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

// --- Concrete Rules ---

pub struct TemplatesFolderRule;

impl ValidationRule for TemplatesFolderRule {
    fn name(&self) -> &'static str { "templates_folder" }

    fn validate(&self, settings: &Settings, base_dir: &Path) -> Vec<ConfigViolation> {
        let dir = resolve(base_dir, &settings.templates_folder);
        if dir.is_dir() {
            vec![]
        } else {
            vec![ConfigViolation::new(
                "TemplatesFolder",
                format!("templates folder not found: {}", dir.display()),
            )]
        }
    }
}

pub struct ConverterRule;

impl ValidationRule for ConverterRule {
    fn name(&self) -> &'static str { "converter" }

    fn validate(&self, settings: &Settings, base_dir: &Path) -> Vec<ConfigViolation> {
        let mut violations = vec![];

        let executable = resolve(base_dir, &settings.python.executable_path);
        if !executable.is_file() {
            violations.push(ConfigViolation::new(
                "Python:ExecutablePath",
                format!("converter executable not found: {}", executable.display()),
            ));
        }

        let script = resolve(base_dir, &settings.python.script_path);
        if !script.is_file() {
            violations.push(ConfigViolation::new(
                "Python:ScriptPath",
                format!("converter script not found: {}", script.display()),
            ));
        }

        if settings.python.timeout_seconds == Some(0) {
            violations.push(ConfigViolation::new(
                "Python:TimeoutSeconds",
                "timeout must be at least one second",
            ));
        }

        violations
    }
}

pub struct ConversionParametersRule;

impl ValidationRule for ConversionParametersRule {
    fn name(&self) -> &'static str { "conversion_parameters" }

    fn validate(&self, settings: &Settings, _base_dir: &Path) -> Vec<ConfigViolation> {
        let mut violations = vec![];
        let params = &settings.python.parameters;

        if params.sheet_index < 1 {
            violations.push(ConfigViolation::new(
                "Python:Parameters:SheetIndex",
                format!("sheet index must be a positive integer, got {}", params.sheet_index),
            ));
        }
        if params.cell_range.trim().is_empty() {
            violations.push(ConfigViolation::new(
                "Python:Parameters:CellRange",
                "cell range must not be empty",
            ));
        }

        violations
    }
}

/// Largest barcode side, in pixels, the rasterizer will allocate.
pub const MAX_BARCODE_DIMENSION: u32 = 10_000;

pub struct BarcodeRule;

impl ValidationRule for BarcodeRule {
    fn name(&self) -> &'static str { "barcode" }

    fn validate(&self, settings: &Settings, _base_dir: &Path) -> Vec<ConfigViolation> {
        let mut violations = vec![];
        let barcode = &settings.barcode;

        let sides = [("Barcode:Width", barcode.width), ("Barcode:Height", barcode.height)];
        for (setting, value) in sides {
            if value == 0 {
                violations.push(ConfigViolation::new(setting, "must be positive"));
            } else if value > MAX_BARCODE_DIMENSION {
                violations.push(ConfigViolation::new(
                    setting,
                    format!("must not exceed {} pixels", MAX_BARCODE_DIMENSION),
                ));
            }
        }
        if let Err(e) = barcode.format.parse::<Symbology>() {
            violations.push(ConfigViolation::new("Barcode:Format", e.to_string()));
        }

        violations
    }
}

pub struct PlaceholderRule;

impl ValidationRule for PlaceholderRule {
    fn name(&self) -> &'static str { "placeholders" }

    fn validate(&self, settings: &Settings, _base_dir: &Path) -> Vec<ConfigViolation> {
        let tokens = &settings.placeholders;
        let all = [
            ("Placeholders:Heat", &tokens.heat),
            ("Placeholders:Number", &tokens.number),
            ("Placeholders:Barcode", &tokens.barcode),
        ];

        let mut violations = vec![];
        for (setting, token) in all {
            if token.is_empty() {
                violations.push(ConfigViolation::new(setting, "token must not be empty"));
            }
        }
        if tokens.heat == tokens.number
            || tokens.heat == tokens.barcode
            || tokens.number == tokens.barcode
        {
            violations.push(ConfigViolation::new("Placeholders", "tokens must be distinct"));
        }
        violations
    }
}

/// Validator runs every rule and keeps all violations
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(TemplatesFolderRule),
                Box::new(ConverterRule),
                Box::new(ConversionParametersRule),
                Box::new(BarcodeRule),
                Box::new(PlaceholderRule),
            ],
        }
    }

    pub fn validate(&self, settings: &Settings, base_dir: &Path) -> Vec<ConfigViolation> {
        let mut all_violations = vec![];
        for rule in &self.rules {
            let violations = rule.validate(settings, base_dir);
            if !violations.is_empty() {
                tracing::debug!(rule = rule.name(), count = violations.len(), "rule failed");
            }
            all_violations.extend(violations);
        }
        all_violations
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BarcodeSettings, ConverterParameters, ConverterSettings, PlaceholderTokens};
    use tempfile::TempDir;

    fn settings(dir: &Path) -> Settings {
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(dir.join("convert.py"), "").unwrap();
        std::fs::write(dir.join("python"), "").unwrap();
        Settings {
            templates_folder: "templates".into(),
            temp_folder: "temp".into(),
            python: ConverterSettings {
                executable_path: "python".into(),
                script_path: "convert.py".into(),
                output_image_folder: "out".into(),
                timeout_seconds: None,
                parameters: ConverterParameters {
                    sheet_index: 1,
                    cell_range: "A1:D10".to_string(),
                },
            },
            barcode: BarcodeSettings {
                width: 300,
                height: 80,
                format: "CODE_128".to_string(),
                show_text: true,
            },
            placeholders: PlaceholderTokens::default(),
            cleanup: Default::default(),
        }
    }

    #[test]
    fn test_valid_settings_have_no_violations() {
        let dir = TempDir::new().unwrap();
        let s = settings(dir.path());
        assert!(Validator::new().validate(&s, dir.path()).is_empty());
    }

    #[test]
    fn test_all_violations_collected() {
        let dir = TempDir::new().unwrap();
        let mut s = settings(dir.path());
        s.templates_folder = "missing".into();
        s.python.script_path = "nope.py".into();
        s.python.parameters.sheet_index = 0;
        s.barcode.format = "QR".to_string();

        let violations = Validator::new().validate(&s, dir.path());
        let settings: Vec<_> = violations.iter().map(|v| v.setting).collect();

        assert_eq!(
            settings,
            vec![
                "TemplatesFolder",
                "Python:ScriptPath",
                "Python:Parameters:SheetIndex",
                "Barcode:Format",
            ]
        );
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let dir = TempDir::new().unwrap();
        let mut s = settings(dir.path());
        s.placeholders.number = s.placeholders.heat.clone();

        let violations = Validator::new().validate(&s, dir.path());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].setting, "Placeholders");
    }

    #[test]
    fn test_barcode_size_bounded() {
        let dir = TempDir::new().unwrap();
        let mut s = settings(dir.path());
        s.barcode.width = 0;
        s.barcode.height = 100_000;

        let violations = Validator::new().validate(&s, dir.path());
        let settings: Vec<_> = violations.iter().map(|v| v.setting).collect();
        assert_eq!(settings, vec!["Barcode:Width", "Barcode:Height"]);
        assert!(violations[1].message.contains("10000"));

        s.barcode.width = MAX_BARCODE_DIMENSION;
        s.barcode.height = MAX_BARCODE_DIMENSION;
        assert!(Validator::new().validate(&s, dir.path()).is_empty());
    }
}
