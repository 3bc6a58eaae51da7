//! HTTP client for the experiment-management service.
//!
//! Downloads are resumable: artifacts already present locally are skipped,
//! so re-running `--fetch` after an interruption only pulls what is missing.
//! A simulation whose download fails is logged and left incomplete; the
//! scanner will drop it at extraction time. There are no retries here: the
//! expensive, failure-prone work happened on the platform, not in this
//! client.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::artifacts::TAGS_FILE;
use crate::models::SimulationTags;

/// Experiment metadata as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentInfo {
    pub id: String,
    pub name: String,
    pub simulations: Vec<SimulationInfo>,
}

/// One simulation's identity and sweep tags.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationInfo {
    pub id: String,
    #[serde(default)]
    pub tags: SimulationTags,
}

/// Counts for one fetch run.
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub simulations: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Client for the experiment service's read-only output API.
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlatformClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch an experiment's metadata and simulation list.
    pub async fn experiment(&self, id: &str) -> Result<ExperimentInfo> {
        let url = format!("{}/api/experiments/{}", self.base_url, id);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach experiment service at {}", url))?
            .error_for_status()
            .with_context(|| format!("Experiment {} not available", id))?;
        response
            .json::<ExperimentInfo>()
            .await
            .with_context(|| format!("Malformed experiment metadata for {}", id))
    }

    /// Fetch one artifact's bytes for a simulation.
    pub async fn artifact(&self, simulation: &str, artifact: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/api/simulations/{}/output/{}",
            self.base_url, simulation, artifact
        );
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach experiment service at {}", url))?
            .error_for_status()
            .with_context(|| format!("Artifact {} not available for {}", artifact, simulation))?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download an experiment's resolved outputs into
    /// `<data_dir>/<experiment_name>/<simulation>/`, the layout the scanner
    /// consumes. Returns what was downloaded, skipped, and failed.
    pub async fn fetch_experiment(
        &self,
        experiment_id: &str,
        experiment_name: &str,
        artifacts: &[String],
        data_dir: &Path,
        show_progress: bool,
    ) -> Result<FetchSummary> {
        let info = self.experiment(experiment_id).await?;
        info!(
            "Experiment {} ({}): {} simulations",
            info.name,
            info.id,
            info.simulations.len()
        );

        let progress = if show_progress {
            let pb = ProgressBar::new(info.simulations.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let mut summary = FetchSummary {
            simulations: info.simulations.len(),
            ..FetchSummary::default()
        };

        for sim in &info.simulations {
            let sim_dir = data_dir.join(experiment_name).join(&sim.id);
            std::fs::create_dir_all(&sim_dir)
                .with_context(|| format!("Failed to create {}", sim_dir.display()))?;
            std::fs::write(
                sim_dir.join(TAGS_FILE),
                serde_json::to_string_pretty(&sim.tags).context("Failed to encode tags")?,
            )
            .with_context(|| format!("Failed to write tags for {}", sim.id))?;

            for artifact in artifacts {
                let target = sim_dir.join(artifact);
                if target.is_file() {
                    summary.skipped += 1;
                    continue;
                }
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                match self.artifact(&sim.id, artifact).await {
                    Ok(bytes) => {
                        std::fs::write(&target, bytes)
                            .with_context(|| format!("Failed to write {}", target.display()))?;
                        summary.downloaded += 1;
                    }
                    Err(e) => {
                        warn!("Simulation {} left incomplete: {}", sim.id, e);
                        summary.failed += 1;
                        break;
                    }
                }
            }

            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("Fetch complete");
        }
        Ok(summary)
    }
}
