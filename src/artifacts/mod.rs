//! Parsed report artifacts and their explicit schemas.
//!
//! Each artifact kind the pipeline consumes has a typed schema and a
//! validating parser that fails fast with a named error when an expected key
//! or shape is absent. Numeric computation downstream never sees a raw JSON
//! fault.
//!
//! The binary spatial-grid format itself is decoded by the platform; the
//! spatial artifact consumed here is its decoded JSON export.

pub mod inset;
pub mod spatial;
pub mod summary;

pub use inset::InsetChart;
pub use spatial::SpatialReport;
pub use summary::SummaryReport;

use crate::error::AnalysisError;
use crate::models::SimulationId;
use std::collections::HashMap;

/// File name of the per-site summary report artifact.
pub fn summary_artifact(site: &str) -> String {
    format!("output/MalariaSummaryReport_{}.json", site)
}

/// File name of the decoded per-channel spatial report artifact.
pub fn spatial_artifact(channel: &str) -> String {
    format!("output/SpatialReport_{}.json", channel)
}

/// File name of the whole-population inset chart artifact.
pub const INSET_ARTIFACT: &str = "output/InsetChart.json";

/// File name of the per-simulation sweep-tag mapping.
pub const TAGS_FILE: &str = "tags.json";

/// One parsed artifact.
#[derive(Debug, Clone)]
pub enum Artifact {
    Summary(SummaryReport),
    Spatial(SpatialReport),
    Inset(InsetChart),
}

impl Artifact {
    /// Parse raw artifact bytes, picking the schema from the artifact name.
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Self, AnalysisError> {
        if name.starts_with("output/MalariaSummaryReport_") {
            SummaryReport::from_slice(name, bytes).map(Artifact::Summary)
        } else if name.starts_with("output/SpatialReport_") {
            SpatialReport::from_slice(name, bytes).map(Artifact::Spatial)
        } else if name == INSET_ARTIFACT {
            InsetChart::from_slice(name, bytes).map(Artifact::Inset)
        } else {
            Err(AnalysisError::ArtifactSchema {
                artifact: name.to_string(),
                reason: "no schema is declared for this artifact name".to_string(),
            })
        }
    }
}

/// The artifacts delivered to an extractor for one simulation, keyed by
/// artifact name. The set is built from the extractor's declared list, so a
/// lookup miss means the contract was violated upstream; it still surfaces
/// as a named `MissingArtifact` error rather than a panic.
#[derive(Debug)]
pub struct ArtifactSet {
    simulation: SimulationId,
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactSet {
    pub fn new(simulation: SimulationId) -> Self {
        Self {
            simulation,
            artifacts: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: String, artifact: Artifact) {
        self.artifacts.insert(name, artifact);
    }

    fn get(&self, name: &str) -> Result<&Artifact, AnalysisError> {
        self.artifacts
            .get(name)
            .ok_or_else(|| AnalysisError::MissingArtifact {
                simulation: self.simulation.clone(),
                artifact: name.to_string(),
            })
    }

    /// Fetch an artifact expected to be a summary report.
    pub fn summary(&self, name: &str) -> Result<&SummaryReport, AnalysisError> {
        match self.get(name)? {
            Artifact::Summary(report) => Ok(report),
            _ => Err(wrong_kind(name, "summary report")),
        }
    }

    /// Fetch an artifact expected to be a decoded spatial report.
    pub fn spatial(&self, name: &str) -> Result<&SpatialReport, AnalysisError> {
        match self.get(name)? {
            Artifact::Spatial(report) => Ok(report),
            _ => Err(wrong_kind(name, "spatial report")),
        }
    }

    /// Fetch an artifact expected to be an inset chart.
    pub fn inset(&self, name: &str) -> Result<&InsetChart, AnalysisError> {
        match self.get(name)? {
            Artifact::Inset(chart) => Ok(chart),
            _ => Err(wrong_kind(name, "inset chart")),
        }
    }
}

fn wrong_kind(name: &str, expected: &str) -> AnalysisError {
    AnalysisError::ArtifactSchema {
        artifact: name.to_string(),
        reason: format!("expected a {}", expected),
    }
}
