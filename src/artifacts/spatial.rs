//! Decoded spatial report schema.
//!
//! The simulator writes spatial channels as binary grids; the platform's
//! export step decodes each channel to JSON with the grid's node identifiers
//! and one value vector per timestep. Decoding the binary format is not this
//! tool's job.

use crate::error::AnalysisError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SpatialReport {
    /// Node identifiers, in grid order.
    pub node_ids: Vec<u32>,
    /// `values[t][n]` is the channel value at timestep `t` for node
    /// `node_ids[n]`.
    pub values: Vec<Vec<f64>>,
}

impl SpatialReport {
    /// Parse and structurally validate a decoded spatial report: the node
    /// list must be non-empty and every timestep must cover every node.
    pub fn from_slice(artifact: &str, bytes: &[u8]) -> Result<Self, AnalysisError> {
        let report: SpatialReport =
            serde_json::from_slice(bytes).map_err(|e| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("not a decoded spatial report: {}", e),
            })?;

        if report.node_ids.is_empty() {
            return Err(AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: "node_ids is empty".to_string(),
            });
        }
        for (t, row) in report.values.iter().enumerate() {
            if row.len() != report.node_ids.len() {
                return Err(AnalysisError::ArtifactSchema {
                    artifact: artifact.to_string(),
                    reason: format!(
                        "timestep {} has {} values for {} nodes",
                        t,
                        row.len(),
                        report.node_ids.len()
                    ),
                });
            }
        }
        Ok(report)
    }

    pub fn timesteps(&self) -> usize {
        self.values.len()
    }

    /// The full time series for one node. An unknown node id is a schema
    /// error: the reference site table and the grid disagree.
    pub fn node_series(&self, artifact: &str, node: u32) -> Result<Vec<f64>, AnalysisError> {
        let index = self
            .node_ids
            .iter()
            .position(|&id| id == node)
            .ok_or_else(|| AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!("node {} absent from spatial grid", node),
            })?;
        Ok(self.values.iter().map(|row| row[index]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &[u8] = br#"{
        "node_ids": [11, 22, 33],
        "values": [
            [1.0, 10.0, 100.0],
            [2.0, 20.0, 200.0],
            [3.0, 30.0, 300.0]
        ]
    }"#;

    #[test]
    fn test_node_series() {
        let report = SpatialReport::from_slice("s", REPORT).unwrap();
        assert_eq!(report.timesteps(), 3);
        assert_eq!(report.node_series("s", 22).unwrap(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_unknown_node_is_schema_error() {
        let report = SpatialReport::from_slice("s", REPORT).unwrap();
        let err = report.node_series("s", 99).unwrap_err();
        assert!(err.to_string().contains("node 99"));
    }

    #[test]
    fn test_ragged_grid_rejected() {
        let bytes = br#"{"node_ids": [1, 2], "values": [[1.0, 2.0], [3.0]]}"#;
        let err = SpatialReport::from_slice("s", bytes).unwrap_err();
        assert!(err.to_string().contains("timestep 1"));
    }

    #[test]
    fn test_empty_node_list_rejected() {
        let bytes = br#"{"node_ids": [], "values": []}"#;
        assert!(SpatialReport::from_slice("s", bytes).is_err());
    }
}
