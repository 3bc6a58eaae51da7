//! Simsift - simulation-output aggregation for vector-control experiments
//!
//! A CLI tool that consolidates per-simulation outputs of an experiment run
//! on the external simulation platform into one CSV table per experiment,
//! and derives baseline-relative effect tables for plotting.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, fetch, missing data dir, join error, etc.)
//!   2 - At least one experiment returned no simulation data

mod analysis;
mod artifacts;
mod cli;
mod config;
mod error;
mod models;
mod platform;
mod scanner;
mod sites;

use anyhow::{Context, Result};
use cli::Args;
use config::{AnalyzerVariant, Config};
use error::AnalysisError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{RowSet, SimulationId};
use scanner::{ExperimentScanner, SimulationDir};
use sites::SiteTable;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Simsift v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the analysis
    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .simsift.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(".simsift.toml");

    if path.exists() {
        eprintln!("⚠️  .simsift.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .simsift.toml")?;

    println!("✅ Created .simsift.toml with default settings.");
    println!("   Edit it to register experiments, sites, channels, and the baseline arm.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let data_dir = PathBuf::from(&config.general.data_dir);
    let out_dir = PathBuf::from(&config.general.out_dir);

    // Which experiments this run covers.
    let experiments: Vec<(String, Option<String>)> = if args.all {
        if config.experiments.is_empty() {
            anyhow::bail!("--all given but no experiments are configured under [experiments]");
        }
        config
            .experiments
            .iter()
            .map(|(name, id)| (name.clone(), Some(id.clone())))
            .collect()
    } else {
        let name = args
            .experiment
            .clone()
            .context("No experiment specified")?;
        let id = config.experiments.get(&name).cloned();
        vec![(name, id)]
    };

    // Step 1: Load the reference site table (not used by the inset variant).
    let site_table = match config.analysis.variant {
        AnalyzerVariant::Inset => None,
        _ => {
            let path = Path::new(&config.analysis.site_table);
            let table = SiteTable::load(path)?;
            println!("🌍 Site table: {} sites from {}", table.len(), path.display());
            Some(table)
        }
    };

    // Step 2: Build the configured extractor.
    let extractor = analysis::build_extractor(&config.analysis, site_table.as_ref())?;
    let required = extractor.required_artifacts();
    info!(
        "Extractor: {} ({} artifacts per simulation)",
        extractor.name(),
        required.len()
    );

    let client = if args.fetch {
        Some(platform::PlatformClient::new(
            &config.platform.base_url,
            config.platform.timeout_seconds,
        )?)
    } else {
        None
    };

    let mut exit_code = 0;
    for (name, platform_id) in &experiments {
        println!("\n🔬 Experiment: {}", name);

        // Step 3: Fetch resolved outputs from the platform if requested.
        if let Some(ref client) = client {
            let id = platform_id.as_deref().ok_or_else(|| {
                anyhow::anyhow!(
                    "Experiment '{}' has no platform id under [experiments]",
                    name
                )
            })?;
            println!("📥 Fetching outputs from {}", config.platform.base_url);
            let summary = client
                .fetch_experiment(id, name, &required, &data_dir, !args.quiet)
                .await?;
            println!(
                "   {} simulations: {} artifacts downloaded, {} cached, {} failed",
                summary.simulations, summary.downloaded, summary.skipped, summary.failed
            );
        }

        // Step 4: Discover simulations.
        let exp_scanner = ExperimentScanner::new(&data_dir, name);
        let sims = exp_scanner.scan()?;
        println!("   Found {} simulations", sims.len());

        if args.dry_run {
            for sim in &sims {
                println!("     📄 {}", sim.id);
            }
            continue;
        }

        // Step 5: Extract each simulation's row-set. Failures drop that
        // simulation only, never the experiment.
        let row_sets = extract_all(&exp_scanner, &sims, extractor.as_ref(), &required, args.quiet);
        let dropped = sims.len() - row_sets.len();
        if dropped > 0 {
            println!(
                "   ⚠️  {} simulations dropped (missing or malformed outputs)",
                dropped
            );
        }

        // Step 6: Consolidate and persist.
        let aggregator = analysis::Aggregator::new(name.clone(), out_dir.clone());
        let table = match aggregator.consolidate(&row_sets) {
            Ok(table) => table,
            Err(e @ AnalysisError::EmptyResult(_)) => {
                // Terminal for this experiment: report it, write nothing.
                warn!("{}", e);
                println!("   ⚠️  No data have been returned, skipping");
                exit_code = 2;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        aggregator.write(&table)?;
        println!(
            "📊 {} rows from {} simulations → {}",
            table.rows.len(),
            table.simulation_count,
            aggregator.table_path().display()
        );

        // Step 7: Baseline-relative reduction, if requested.
        if let Some(ref channel) = args.reduce {
            let spec = reduction_spec(&config, channel.clone());
            let reduced = analysis::reduce(&table, &spec)?;
            let path = out_dir.join(format!("{}_vs_{}.csv", name, spec.baseline));
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            reduced
                .write_csv(file)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "   ↳ {} comparison rows vs '{}' → {}",
                reduced.rows.len(),
                reduced.baseline,
                path.display()
            );
            if reduced.groups_without_baseline > 0 {
                println!(
                    "     ({} groups had no baseline row)",
                    reduced.groups_without_baseline
                );
            }
            if reduced.zero_baseline_rows > 0 {
                println!(
                    "     ({} rows excluded for zero baseline)",
                    reduced.zero_baseline_rows
                );
            }
        }
    }

    Ok(exit_code)
}

/// Extract every simulation, dropping the ones whose outputs are missing or
/// malformed. Returns the surviving {simulation → row-set} mapping in id
/// order.
fn extract_all(
    exp_scanner: &ExperimentScanner,
    sims: &[SimulationDir],
    extractor: &dyn analysis::Extractor,
    required: &[String],
    quiet: bool,
) -> BTreeMap<SimulationId, RowSet> {
    let progress = if quiet || sims.is_empty() {
        None
    } else {
        let pb = ProgressBar::new(sims.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    let mut row_sets = BTreeMap::new();
    for sim in sims {
        let result = exp_scanner
            .load_simulation(sim, required)
            .and_then(|(tags, artifacts)| extractor.extract(&artifacts, &tags));
        match result {
            Ok(row_set) if row_set.is_empty() => {
                warn!("Dropping simulation {}: produced no rows", sim.id);
            }
            Ok(row_set) => {
                row_sets.insert(sim.id.clone(), row_set);
            }
            Err(e) => {
                warn!("Dropping simulation {}: {}", sim.id, e);
            }
        }
        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    row_sets
}

/// Build the reduction settings for one channel from the merged config.
fn reduction_spec(config: &Config, channel: String) -> analysis::ReductionSpec {
    analysis::ReductionSpec {
        channel,
        baseline: config.reduction.baseline.clone(),
        intervention_variable: config.reduction.intervention_variable.clone(),
        replicate_variable: config.reduction.replicate_variable.clone(),
        ignore: config.reduction.ignore.clone(),
        rates: config
            .reduction
            .rates
            .iter()
            .map(|r| analysis::RateSpec {
                name: r.name.clone(),
                numerator: r.numerator.clone(),
                denominator: r.denominator.clone(),
                scale: r.scale,
            })
            .collect(),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .simsift.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
