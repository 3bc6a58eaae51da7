//! Experiment-level consolidation.
//!
//! The aggregator is the pipeline's single barrier: it runs once, after
//! every simulation's extraction has either produced a row-set or been
//! dropped, and turns the surviving {simulation → row-set} mapping into one
//! [`ConsolidatedTable`] persisted under the experiment's name.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::models::{ConsolidatedTable, RowSet, SimulationId};

/// Consolidates row-sets for one experiment and persists the result.
pub struct Aggregator {
    experiment: String,
    out_dir: PathBuf,
}

impl Aggregator {
    pub fn new(experiment: String, out_dir: PathBuf) -> Self {
        Self {
            experiment,
            out_dir,
        }
    }

    /// Where the consolidated table is written.
    pub fn table_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.csv", self.experiment))
    }

    /// Where the sidecar run manifest is written.
    pub fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.meta.json", self.experiment))
    }

    /// Concatenate all row-sets into one table.
    ///
    /// Simulations are visited in id order so repeated runs over identical
    /// input produce identical output; each simulation's own row order is
    /// preserved as extracted. Rows are not deduplicated and carry no
    /// implied key. An empty input mapping is the declared `EmptyResult`
    /// terminal state; mismatched column sets are an error rather than a
    /// ragged table.
    pub fn consolidate(
        &self,
        row_sets: &BTreeMap<SimulationId, RowSet>,
    ) -> Result<ConsolidatedTable, AnalysisError> {
        let mut iter = row_sets.iter();
        let (first_id, first) = iter
            .next()
            .ok_or_else(|| AnalysisError::EmptyResult(self.experiment.clone()))?;
        debug!("Consolidating against column set of simulation {}", first_id);

        let mut rows = first.rows.clone();
        for (id, row_set) in iter {
            if !row_set.columns_match(first) {
                return Err(AnalysisError::ColumnMismatch {
                    simulation: id.clone(),
                });
            }
            rows.extend(row_set.rows.iter().cloned());
        }

        Ok(ConsolidatedTable {
            experiment: self.experiment.clone(),
            metric_columns: first.metric_columns.clone(),
            sweep_columns: first.sweep_columns.clone(),
            simulation_count: row_sets.len(),
            rows,
        })
    }

    /// Persist the table and its manifest, overwriting any previous run for
    /// the same experiment name.
    pub fn write(&self, table: &ConsolidatedTable) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.out_dir.display())
        })?;

        let table_path = self.table_path();
        let file = File::create(&table_path)
            .with_context(|| format!("Failed to create {}", table_path.display()))?;
        table
            .write_csv(file)
            .with_context(|| format!("Failed to write {}", table_path.display()))?;

        let manifest = RunManifest {
            experiment: &table.experiment,
            written_at: Utc::now(),
            simulation_count: table.simulation_count,
            row_count: table.rows.len(),
            columns: table.header(),
        };
        let manifest_path = self.manifest_path();
        std::fs::write(
            &manifest_path,
            serde_json::to_string_pretty(&manifest).context("Failed to encode run manifest")?,
        )
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

        info!(
            "Wrote {} rows from {} simulations to {}",
            table.rows.len(),
            table.simulation_count,
            table_path.display()
        );
        Ok(())
    }
}

/// Sidecar metadata written next to each consolidated table.
#[derive(Debug, Serialize)]
struct RunManifest<'a> {
    experiment: &'a str,
    written_at: DateTime<Utc>,
    simulation_count: usize,
    row_count: usize,
    columns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Row, TagValue};
    use tempfile::TempDir;

    fn single_row_set(site: &str, value: f64, run: f64) -> RowSet {
        RowSet {
            metric_columns: vec!["PfPR2to10".to_string()],
            sweep_columns: vec!["Run_Number".to_string()],
            rows: vec![Row {
                site: site.to_string(),
                time: 2,
                values: vec![value],
                tags: vec![TagValue::Number(run)],
            }],
        }
    }

    #[test]
    fn test_consolidate_three_runs() {
        // Three simulations for one site, Run_Number 0..2, one row each.
        let mut row_sets = BTreeMap::new();
        row_sets.insert("sim-0".to_string(), single_row_set("X", 0.4, 0.0));
        row_sets.insert("sim-1".to_string(), single_row_set("X", 0.5, 1.0));
        row_sets.insert("sim-2".to_string(), single_row_set("X", 0.6, 2.0));

        let aggregator = Aggregator::new("test".to_string(), PathBuf::from("unused"));
        let table = aggregator.consolidate(&row_sets).unwrap();

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.simulation_count, 3);
        let values: Vec<f64> = table.rows.iter().map(|r| r.values[0]).collect();
        assert_eq!(values, vec![0.4, 0.5, 0.6]);
        let runs: Vec<&TagValue> = table.rows.iter().map(|r| &r.tags[0]).collect();
        assert_eq!(
            runs,
            vec![&TagValue::Number(0.0), &TagValue::Number(1.0), &TagValue::Number(2.0)]
        );
    }

    #[test]
    fn test_empty_mapping_is_diagnostic_not_crash() {
        let aggregator = Aggregator::new("test".to_string(), PathBuf::from("unused"));
        let err = aggregator.consolidate(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResult(ref e) if e == "test"));
    }

    #[test]
    fn test_column_mismatch_rejected() {
        let mut other = single_row_set("X", 0.5, 1.0);
        other.metric_columns = vec!["Population".to_string()];

        let mut row_sets = BTreeMap::new();
        row_sets.insert("sim-0".to_string(), single_row_set("X", 0.4, 0.0));
        row_sets.insert("sim-1".to_string(), other);

        let aggregator = Aggregator::new("test".to_string(), PathBuf::from("unused"));
        let err = aggregator.consolidate(&row_sets).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ColumnMismatch { ref simulation } if simulation == "sim-1"
        ));
    }

    #[test]
    fn test_within_simulation_order_preserved() {
        let multi = RowSet {
            metric_columns: vec!["PfPR2to10".to_string()],
            sweep_columns: vec!["Run_Number".to_string()],
            rows: vec![
                Row {
                    site: "X".to_string(),
                    time: 0,
                    values: vec![0.1],
                    tags: vec![TagValue::Number(0.0)],
                },
                Row {
                    site: "X".to_string(),
                    time: 1,
                    values: vec![0.2],
                    tags: vec![TagValue::Number(0.0)],
                },
            ],
        };
        let mut row_sets = BTreeMap::new();
        row_sets.insert("sim-0".to_string(), multi);

        let aggregator = Aggregator::new("test".to_string(), PathBuf::from("unused"));
        let table = aggregator.consolidate(&row_sets).unwrap();
        assert_eq!(table.rows[0].time, 0);
        assert_eq!(table.rows[1].time, 1);
    }

    #[test]
    fn test_write_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut row_sets = BTreeMap::new();
        row_sets.insert("sim-0".to_string(), single_row_set("X", 0.4, 0.0));
        row_sets.insert("sim-1".to_string(), single_row_set("X", 0.5, 1.0));

        let aggregator = Aggregator::new("test".to_string(), tmp.path().to_path_buf());
        let table = aggregator.consolidate(&row_sets).unwrap();

        aggregator.write(&table).unwrap();
        let first = std::fs::read(aggregator.table_path()).unwrap();

        // Re-running the identical consolidation overwrites, never appends.
        let table = aggregator.consolidate(&row_sets).unwrap();
        aggregator.write(&table).unwrap();
        let second = std::fs::read(aggregator.table_path()).unwrap();

        assert_eq!(first, second);
    }
}
