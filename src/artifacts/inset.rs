//! Whole-population inset chart schema.

use crate::error::AnalysisError;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct InsetChart {
    #[serde(rename = "Channels")]
    channels: BTreeMap<String, InsetChannel>,
}

#[derive(Debug, Clone, Deserialize)]
struct InsetChannel {
    #[serde(rename = "Data")]
    data: Vec<f64>,
}

impl InsetChart {
    pub fn from_slice(artifact: &str, bytes: &[u8]) -> Result<Self, AnalysisError> {
        let chart: InsetChart =
            serde_json::from_slice(bytes).map_err(|e| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("not an inset chart: {}", e),
            })?;
        if chart.channels.is_empty() {
            return Err(AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: "Channels is empty".to_string(),
            });
        }
        Ok(chart)
    }

    /// A named channel's daily series.
    pub fn channel(&self, artifact: &str, name: &str) -> Result<&[f64], AnalysisError> {
        self.channels
            .get(name)
            .map(|c| c.data.as_slice())
            .ok_or_else(|| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("channel '{}' absent from Channels", name),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &[u8] = br#"{
        "Header": {"Timestep": 1},
        "Channels": {
            "Infected": {"Units": "", "Data": [0.1, 0.2, 0.3]},
            "New Clinical Cases": {"Units": "", "Data": [4.0, 5.0, 6.0]}
        }
    }"#;

    #[test]
    fn test_channel_lookup() {
        let chart = InsetChart::from_slice("i", CHART).unwrap();
        assert_eq!(chart.channel("i", "Infected").unwrap(), &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_absent_channel_fails_fast() {
        let chart = InsetChart::from_slice("i", CHART).unwrap();
        let err = chart.channel("i", "Statistical Population").unwrap_err();
        assert!(matches!(err, AnalysisError::ArtifactSchema { .. }));
    }

    #[test]
    fn test_empty_chart_rejected() {
        let err = InsetChart::from_slice("i", br#"{"Channels": {}}"#).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
