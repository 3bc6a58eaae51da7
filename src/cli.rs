//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

use crate::config::AnalyzerVariant;

/// Simsift - aggregation and cost-effectiveness analysis for vector-control
/// simulation experiments
///
/// Consolidates per-simulation outputs of an experiment into one CSV table
/// and derives baseline-relative effect tables for plotting.
///
/// Examples:
///   simsift --experiment atsb_llin_v2
///   simsift --experiment atsb_llin_v2 --fetch
///   simsift --all --reduce New_Clinical_Cases --baseline itn
///   simsift --experiment atsb_llin_v2 --dry-run
///   simsift --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Experiment to analyze
    ///
    /// Must name a directory under the data dir; with --fetch it must also
    /// appear under [experiments] in .simsift.toml.
    #[arg(
        short,
        long,
        value_name = "NAME",
        required_unless_present_any = ["init_config", "all"]
    )]
    pub experiment: Option<String>,

    /// Analyze every experiment configured in [experiments]
    #[arg(long, conflicts_with = "experiment")]
    pub all: bool,

    /// Fetch resolved simulation outputs from the experiment service first
    #[arg(long)]
    pub fetch: bool,

    /// Experiment service base URL
    #[arg(long, value_name = "URL", env = "SIMSIFT_PLATFORM_URL")]
    pub platform_url: Option<String>,

    /// Directory holding per-experiment simulation outputs
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output directory for consolidated tables
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .simsift.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Extractor variant override (summary, spatial, inset)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<AnalyzerVariant>,

    /// Also produce a baseline-relative table for this metric channel
    ///
    /// Example: --reduce New_Clinical_Cases
    #[arg(long, value_name = "CHANNEL")]
    pub reduce: Option<String>,

    /// Baseline intervention label for --reduce
    ///
    /// Overrides the [reduction] baseline from the config file.
    #[arg(short, long, value_name = "LABEL")]
    pub baseline: Option<String>,

    /// Request timeout in seconds for the experiment service
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: list discovered simulations without analyzing
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .simsift.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.platform_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Platform URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.baseline.is_some() && self.reduce.is_none() {
            return Err("--baseline requires --reduce".to_string());
        }

        if self.dry_run && self.reduce.is_some() {
            return Err("--dry-run does not analyze, so --reduce has no effect".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            experiment: Some("atsb_llin_v2".to_string()),
            all: false,
            fetch: false,
            platform_url: None,
            data_dir: None,
            out_dir: None,
            config: None,
            variant: None,
            reduce: None,
            baseline: None,
            timeout: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_ok() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.platform_url = Some("comps.example.org".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_baseline_needs_reduce() {
        let mut args = make_args();
        args.baseline = Some("itn".to_string());
        assert!(args.validate().is_err());

        args.reduce = Some("New_Clinical_Cases".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
