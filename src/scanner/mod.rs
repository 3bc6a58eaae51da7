//! Simulation discovery and artifact loading.
//!
//! The external platform materializes each experiment's resolved outputs as
//! a directory tree: one subdirectory per simulation, holding its `tags.json`
//! and an `output/` directory of report artifacts. This module discovers
//! those simulation directories and loads exactly the artifacts an extractor
//! declares.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::artifacts::{Artifact, ArtifactSet, TAGS_FILE};
use crate::error::AnalysisError;
use crate::models::{SimulationId, SimulationTags};

/// One discovered simulation directory.
#[derive(Debug, Clone)]
pub struct SimulationDir {
    /// Simulation identifier (the directory name, assigned by the platform).
    pub id: SimulationId,
    /// Absolute or data-dir-relative path to the simulation directory.
    pub path: PathBuf,
}

/// Scans one experiment's directory for simulations and loads their outputs.
pub struct ExperimentScanner {
    experiment: String,
    experiment_dir: PathBuf,
}

impl ExperimentScanner {
    /// Create a scanner for `<data_dir>/<experiment>`.
    pub fn new(data_dir: &Path, experiment: &str) -> Self {
        Self {
            experiment: experiment.to_string(),
            experiment_dir: data_dir.join(experiment),
        }
    }

    /// The experiment's directory under the data dir.
    #[allow(dead_code)] // Utility accessor
    pub fn experiment_dir(&self) -> &Path {
        &self.experiment_dir
    }

    /// Discover simulation directories, sorted by simulation id so every
    /// downstream step sees a deterministic order. A directory without a
    /// `tags.json` is not a simulation and is skipped.
    pub fn scan(&self) -> Result<Vec<SimulationDir>> {
        if !self.experiment_dir.is_dir() {
            anyhow::bail!(
                "No local outputs for experiment '{}' at {} (try --fetch)",
                self.experiment,
                self.experiment_dir.display()
            );
        }

        let mut simulations = Vec::new();
        for entry in WalkDir::new(&self.experiment_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path().to_path_buf();
            if !path.join(TAGS_FILE).is_file() {
                debug!("Skipping {} (no {})", path.display(), TAGS_FILE);
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            simulations.push(SimulationDir { id, path });
        }

        simulations.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            "Found {} simulations under {}",
            simulations.len(),
            self.experiment_dir.display()
        );
        Ok(simulations)
    }

    /// Load a simulation's sweep-tag mapping.
    pub fn load_tags(&self, sim: &SimulationDir) -> Result<SimulationTags, AnalysisError> {
        let path = sim.path.join(TAGS_FILE);
        let bytes = std::fs::read(&path).map_err(|_| AnalysisError::MissingArtifact {
            simulation: sim.id.clone(),
            artifact: TAGS_FILE.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| AnalysisError::ArtifactSchema {
            artifact: path.display().to_string(),
            reason: format!("not a tag mapping: {}", e),
        })
    }

    /// Load and parse the declared artifacts for one simulation. An absent
    /// file is a `MissingArtifact` error; the caller drops the simulation.
    pub fn load_artifacts(
        &self,
        sim: &SimulationDir,
        names: &[String],
    ) -> Result<ArtifactSet, AnalysisError> {
        let mut set = ArtifactSet::new(sim.id.clone());
        for name in names {
            let path = sim.path.join(name);
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(AnalysisError::MissingArtifact {
                        simulation: sim.id.clone(),
                        artifact: name.clone(),
                    });
                }
                Err(e) => {
                    return Err(AnalysisError::ArtifactSchema {
                        artifact: name.clone(),
                        reason: format!("unreadable: {}", e),
                    });
                }
            };
            set.insert(name.clone(), Artifact::parse(name, &bytes)?);
        }
        Ok(set)
    }

    /// Load everything an extractor needs for one simulation.
    pub fn load_simulation(
        &self,
        sim: &SimulationDir,
        names: &[String],
    ) -> Result<(SimulationTags, ArtifactSet), AnalysisError> {
        let tags = self.load_tags(sim)?;
        let artifacts = self.load_artifacts(sim, names)?;
        Ok((tags, artifacts))
    }
}
