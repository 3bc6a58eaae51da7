//! Error taxonomy for the analysis pipeline.
//!
//! Extraction-level failures (missing or malformed artifacts) are recovered
//! locally: the affected simulation is dropped from the experiment and
//! logged. Aggregation- and join-level failures terminate the analysis
//! invocation for that experiment.

use thiserror::Error;

use crate::models::TimeSlice;

/// Everything that can go wrong between reading a simulation's output
/// artifacts and writing a comparison table.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required output artifact was not present for a simulation.
    #[error("required artifact '{artifact}' missing for simulation {simulation}")]
    MissingArtifact {
        simulation: String,
        artifact: String,
    },

    /// An artifact was present but did not match its declared schema.
    #[error("artifact '{artifact}' has unexpected shape: {reason}")]
    ArtifactSchema { artifact: String, reason: String },

    /// The declared time slice selects no elements from a channel series.
    #[error(
        "time slice '{slice}' selects no elements from '{artifact}' (series length {len})"
    )]
    EmptySlice {
        artifact: String,
        slice: TimeSlice,
        len: usize,
    },

    /// A configured site name is not present in the reference site table.
    #[error("site '{0}' not present in the reference site table")]
    UnknownSite(String),

    /// The aggregator received no row-sets at all. Diagnostic: the caller
    /// reports it and skips the experiment instead of writing an empty file.
    #[error("no simulation data returned for experiment '{0}'")]
    EmptyResult(String),

    /// A simulation's row-set columns differ from the rest of the experiment.
    #[error(
        "row-set columns for simulation {simulation} do not match the experiment column set"
    )]
    ColumnMismatch { simulation: String },

    /// A declared sweep or metric column is absent from the consolidated table.
    #[error("'{0}' is not a column of the consolidated table")]
    MissingColumn(String),

    /// More than one baseline row matched a (site, sweep-context) group.
    /// The grouping key no longer identifies the baseline arm; averaging the
    /// candidates away would silently corrupt every reduction downstream.
    #[error(
        "{count} baseline rows match intervention '{baseline}' for site '{site}' \
         (context: {context}); the baseline key must be unique"
    )]
    AmbiguousBaseline {
        site: String,
        context: String,
        baseline: String,
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = AnalysisError::MissingArtifact {
            simulation: "sim-001".to_string(),
            artifact: "output/InsetChart.json".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sim-001"));
        assert!(msg.contains("output/InsetChart.json"));

        let err = AnalysisError::AmbiguousBaseline {
            site: "Matsari".to_string(),
            context: "x_Temporary_Larval_Habitat=0.5".to_string(),
            baseline: "itn".to_string(),
            count: 2,
        };
        assert!(err.to_string().contains("must be unique"));
    }
}
