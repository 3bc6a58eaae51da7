//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.simsift.toml` files. Every pipeline stage receives its settings from
//! one explicit [`Config`] value built here; nothing reads module-level
//! state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{ChannelRule, TimeSlice};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Experiment service settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Experiment name → platform experiment id.
    #[serde(default)]
    pub experiments: BTreeMap<String, String>,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Reduction settings.
    #[serde(default)]
    pub reduction: ReductionConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding per-experiment simulation outputs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory consolidated tables are written to.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            out_dir: default_out_dir(),
            verbose: false,
        }
    }
}

fn default_data_dir() -> String {
    "sim_data".to_string()
}

fn default_out_dir() -> String {
    "sim_out".to_string()
}

/// Experiment service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the experiment-management service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8474".to_string()
}

fn default_timeout() -> u64 {
    300
}

/// Which extractor variant an analysis run uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerVariant {
    /// Per-site summary-report channel only.
    Summary,
    /// Summary channel plus spatial channels collapsed per site node.
    #[default]
    Spatial,
    /// Whole-population inset-chart channels over a trailing window.
    Inset,
}

/// Analysis (extraction) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Extractor variant.
    #[serde(default)]
    pub variant: AnalyzerVariant,

    /// Reference site table path.
    #[serde(default = "default_site_table")]
    pub site_table: String,

    /// Sites to analyze. Empty means every site in the site table.
    #[serde(default)]
    pub sites: Vec<String>,

    /// Summary-report channel to extract.
    #[serde(default = "default_summary_channel")]
    pub summary_channel: String,

    /// Output column name for the summary channel.
    #[serde(default = "default_summary_column")]
    pub summary_column: String,

    /// Which elements of the summary series to retain. When omitted, each
    /// variant keeps its historical behavior: `second-to-last` for spatial,
    /// `drop-last` for summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slice: Option<TimeSlice>,

    /// Sweep variables every row is tagged with, in column order.
    #[serde(default = "default_sweep_variables")]
    pub sweep_variables: Vec<String>,

    /// Value substituted for a sweep variable absent from a simulation's tags.
    #[serde(default)]
    pub tag_default: f64,

    /// Spatial channels with their per-channel node-collapse rule.
    #[serde(default = "default_spatial_channels")]
    pub spatial: Vec<SpatialChannelConfig>,

    /// Inset-variant settings.
    #[serde(default)]
    pub inset: InsetConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            variant: AnalyzerVariant::default(),
            site_table: default_site_table(),
            sites: Vec::new(),
            summary_channel: default_summary_channel(),
            summary_column: default_summary_column(),
            time_slice: None,
            sweep_variables: default_sweep_variables(),
            tag_default: 0.0,
            spatial: default_spatial_channels(),
            inset: InsetConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// The time slice in effect, resolving the per-variant default.
    pub fn effective_time_slice(&self) -> TimeSlice {
        self.time_slice.unwrap_or(match self.variant {
            AnalyzerVariant::Summary => TimeSlice::DropLast,
            AnalyzerVariant::Spatial | AnalyzerVariant::Inset => TimeSlice::SecondToLast,
        })
    }
}

fn default_site_table() -> String {
    "site_details.csv".to_string()
}

fn default_summary_channel() -> String {
    "PfPR_2to10".to_string()
}

fn default_summary_column() -> String {
    "PfPR2to10".to_string()
}

fn default_sweep_variables() -> Vec<String> {
    vec![
        "Run_Number".to_string(),
        "x_Temporary_Larval_Habitat".to_string(),
        "intervention".to_string(),
    ]
}

/// One spatial channel and its node-collapse rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialChannelConfig {
    pub channel: String,
    pub rule: ChannelRule,
}

fn default_spatial_channels() -> Vec<SpatialChannelConfig> {
    vec![
        SpatialChannelConfig {
            channel: "Population".to_string(),
            rule: ChannelRule::Mean,
        },
        SpatialChannelConfig {
            channel: "Blood_Smear_Parasite_Prevalence".to_string(),
            rule: ChannelRule::Mean,
        },
        SpatialChannelConfig {
            channel: "New_Infections".to_string(),
            rule: ChannelRule::Sum,
        },
        SpatialChannelConfig {
            channel: "New_Clinical_Cases".to_string(),
            rule: ChannelRule::Sum,
        },
    ]
}

/// Inset-chart extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsetConfig {
    /// Inset channels to extract.
    #[serde(default = "default_inset_channels")]
    pub channels: Vec<String>,

    /// Window start, as a negative offset from the end of the series.
    #[serde(default = "default_window_start")]
    pub window_start: usize,

    /// Window end, as a negative offset from the end of the series.
    /// Retains `series[len - window_start .. len - window_end]`.
    #[serde(default = "default_window_end")]
    pub window_end: usize,

    /// The inset chart is not per-site; its rows carry this label so the
    /// consolidated column set stays fixed.
    #[serde(default = "default_site_label")]
    pub site_label: String,
}

impl Default for InsetConfig {
    fn default() -> Self {
        Self {
            channels: default_inset_channels(),
            window_start: default_window_start(),
            window_end: default_window_end(),
            site_label: default_site_label(),
        }
    }
}

fn default_inset_channels() -> Vec<String> {
    vec![
        "Blood Smear Parasite Prevalence".to_string(),
        "Infected".to_string(),
        "New Clinical Cases".to_string(),
    ]
}

fn default_window_start() -> usize {
    578
}

fn default_window_end() -> usize {
    213
}

fn default_site_label() -> String {
    "all".to_string()
}

/// Reduction (baseline-comparison) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionConfig {
    /// Baseline intervention label effect sizes are measured against.
    #[serde(default = "default_baseline")]
    pub baseline: String,

    /// Sweep variable carrying the intervention label.
    #[serde(default = "default_intervention_variable")]
    pub intervention_variable: String,

    /// Replicate variable averaged out before the baseline join. Set to
    /// nothing to join raw rows, in which case the (site, sweep-context)
    /// key must identify a single baseline row.
    #[serde(default = "default_replicate_variable", skip_serializing_if = "Option::is_none")]
    pub replicate_variable: Option<String>,

    /// Intervention labels excluded from the comparison output.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Derived rate channels computed before the join.
    #[serde(default = "default_rates")]
    pub rates: Vec<RateConfig>,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            baseline: default_baseline(),
            intervention_variable: default_intervention_variable(),
            replicate_variable: default_replicate_variable(),
            ignore: default_ignore(),
            rates: default_rates(),
        }
    }
}

fn default_baseline() -> String {
    "itn".to_string()
}

fn default_intervention_variable() -> String {
    "intervention".to_string()
}

fn default_replicate_variable() -> Option<String> {
    Some("Run_Number".to_string())
}

fn default_ignore() -> Vec<String> {
    vec!["none".to_string()]
}

fn default_rates() -> Vec<RateConfig> {
    vec![
        RateConfig {
            name: "cases per 1000".to_string(),
            numerator: "New_Clinical_Cases".to_string(),
            denominator: "Population".to_string(),
            scale: 1000.0,
        },
        RateConfig {
            name: "infections per 1000".to_string(),
            numerator: "New_Infections".to_string(),
            denominator: "Population".to_string(),
            scale: 1000.0,
        },
    ]
}

/// A derived per-capita rate channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Output column name.
    pub name: String,
    /// Count channel divided...
    pub numerator: String,
    /// ...by this channel...
    pub denominator: String,
    /// ...and multiplied by this factor.
    #[serde(default = "default_rate_scale")]
    pub scale: f64,
}

fn default_rate_scale() -> f64 {
    1000.0
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".simsift.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings. Only
    /// explicitly provided CLI values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.display().to_string();
        }
        if let Some(ref out_dir) = args.out_dir {
            self.general.out_dir = out_dir.display().to_string();
        }
        if let Some(ref url) = args.platform_url {
            self.platform.base_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.platform.timeout_seconds = timeout;
        }
        if let Some(variant) = args.variant {
            self.analysis.variant = variant;
        }
        if let Some(ref baseline) = args.baseline {
            self.reduction.baseline = baseline.clone();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
