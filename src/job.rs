//! Print job - the unit of work

use serde::{Deserialize, Serialize};

/// One label to render. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: i64,
    /// The "heat" value printed on the label.
    measurement: f64,
    /// Template stem: `"1"` selects `1.xlsx`.
    label: String,
}

impl Job {
    pub fn new(id: i64, measurement: f64, label: impl Into<String>) -> Self {
        Self {
            id,
            measurement,
            label: label.into(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn measurement(&self) -> f64 {
        self.measurement
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id_text(&self) -> String {
        self.id.to_string()
    }

    /// Shortest round-trip rendering; whole values carry no fraction (`111111`).
    pub fn measurement_text(&self) -> String {
        self.measurement.to_string()
    }

    /// Barcode payload, `"{id}-{measurement}"`.
    pub fn barcode_payload(&self) -> String {
        format!("{}-{}", self.id_text(), self.measurement_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_measurement_has_no_fraction() {
        let job = Job::new(111, 111111.0, "1");
        assert_eq!(job.measurement_text(), "111111");
        assert_eq!(job.barcode_payload(), "111-111111");
    }

    #[test]
    fn test_fractional_measurement_kept() {
        let job = Job::new(7, 12.5, "2");
        assert_eq!(job.measurement_text(), "12.5");
        assert_eq!(job.barcode_payload(), "7-12.5");
    }

    #[test]
    fn test_deserialize_from_json() {
        let job: Job =
            serde_json::from_str(r#"{"id": 42, "measurement": 3.0, "label": "A"}"#).unwrap();
        assert_eq!(job, Job::new(42, 3.0, "A"));
    }
}
