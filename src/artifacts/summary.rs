//! Per-site summary report schema.
//!
//! A summary report carries a `DataByTime` map of channel name to numeric
//! series, one element per reporting interval (annual, for the reports this
//! tool consumes). Only the channels an extractor asks for are validated;
//! unrelated keys ride along untouched.

use crate::error::AnalysisError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryReport {
    #[serde(rename = "DataByTime")]
    data_by_time: BTreeMap<String, Value>,
}

impl SummaryReport {
    /// Parse and structurally validate a summary report.
    pub fn from_slice(artifact: &str, bytes: &[u8]) -> Result<Self, AnalysisError> {
        let report: SummaryReport =
            serde_json::from_slice(bytes).map_err(|e| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("not a summary report: {}", e),
            })?;
        if report.data_by_time.is_empty() {
            return Err(AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: "DataByTime is empty".to_string(),
            });
        }
        Ok(report)
    }

    /// A named channel as a numeric series. Absent channels and non-numeric
    /// entries are schema errors, caught here instead of mid-computation.
    pub fn channel(&self, artifact: &str, name: &str) -> Result<Vec<f64>, AnalysisError> {
        let value = self
            .data_by_time
            .get(name)
            .ok_or_else(|| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("channel '{}' absent from DataByTime", name),
            })?;

        let entries = value
            .as_array()
            .ok_or_else(|| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("channel '{}' is not an array", name),
            })?;

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry.as_f64().ok_or_else(|| AnalysisError::ArtifactSchema {
                    artifact: artifact.to_string(),
                    reason: format!("channel '{}' element {} is not numeric", name, i),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &[u8] = br#"{
        "Metadata": {"Reporting_Interval": 365},
        "DataByTime": {
            "PfPR_2to10": [0.41, 0.38, 0.35],
            "Annual EIR": [24.0, 20.1, 18.9],
            "Time Of Report": [365, 730, 1095]
        }
    }"#;

    #[test]
    fn test_channel_lookup() {
        let report = SummaryReport::from_slice("a", REPORT).unwrap();
        assert_eq!(report.channel("a", "PfPR_2to10").unwrap(), vec![0.41, 0.38, 0.35]);
    }

    #[test]
    fn test_absent_channel_fails_fast() {
        let report = SummaryReport::from_slice("a", REPORT).unwrap();
        let err = report.channel("a", "PfPR_0to5").unwrap_err();
        assert!(err.to_string().contains("PfPR_0to5"));
    }

    #[test]
    fn test_non_numeric_channel_fails_fast() {
        let bytes = br#"{"DataByTime": {"PfPR_2to10": [0.4, "x"]}}"#;
        let report = SummaryReport::from_slice("a", bytes).unwrap();
        let err = report.channel("a", "PfPR_2to10").unwrap_err();
        assert!(matches!(err, AnalysisError::ArtifactSchema { .. }));
    }

    #[test]
    fn test_malformed_report_is_schema_error() {
        let err = SummaryReport::from_slice("a", b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, AnalysisError::ArtifactSchema { .. }));

        let err = SummaryReport::from_slice("a", br#"{"DataByTime": {}}"#).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
