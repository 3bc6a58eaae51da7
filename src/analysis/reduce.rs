//! Baseline-relative reduction.
//!
//! Turns a consolidated table into a plot-ready comparison against a
//! designated baseline intervention arm: optionally averages out a replicate
//! variable, derives per-capita rate channels, then joins each
//! (site, sweep-context) row against its baseline row and computes cases
//! averted and fractional reduction.
//!
//! The reduction is floored at zero by design: for comparative-effectiveness
//! reporting an intervention is never credited with a negative effect, so
//! every (value > baseline) pair collapses to a reduction of exactly 0.

use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::models::{ConsolidatedTable, TagValue};

/// A derived per-capita rate channel, computed before the baseline join.
#[derive(Debug, Clone)]
pub struct RateSpec {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    pub scale: f64,
}

/// Settings for one reduction run.
#[derive(Debug, Clone)]
pub struct ReductionSpec {
    /// Metric channel the comparison is computed on. May name a derived
    /// rate channel.
    pub channel: String,
    /// Baseline intervention label.
    pub baseline: String,
    /// Sweep variable carrying the intervention label.
    pub intervention_variable: String,
    /// Replicate variable averaged out before the join. With no replicate
    /// variable rows pass through unaveraged, and the (site, sweep-context)
    /// key must then identify a single baseline row.
    pub replicate_variable: Option<String>,
    /// Intervention labels excluded from the output.
    pub ignore: Vec<String>,
    /// Rate channels to derive. Rates whose inputs are absent from the
    /// table are skipped.
    pub rates: Vec<RateSpec>,
}

/// One output row of the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionRow {
    pub site: String,
    /// Parallel to `BaselineRelativeTable::context_columns`.
    pub context: Vec<TagValue>,
    pub intervention: String,
    pub value: f64,
    pub baseline_value: f64,
    /// `baseline - value`; negative when the arm did worse than baseline.
    pub averted: f64,
    /// `(baseline - value) / baseline`, floored at 0.
    pub reduction: f64,
}

/// The baseline-relative table handed to plotting.
#[derive(Debug, Clone)]
pub struct BaselineRelativeTable {
    pub channel: String,
    pub baseline: String,
    pub context_columns: Vec<String>,
    pub rows: Vec<ReductionRow>,
    /// (site, context) groups skipped because no baseline row matched.
    pub groups_without_baseline: usize,
    /// Rows excluded because the baseline value was exactly zero.
    pub zero_baseline_rows: usize,
}

impl BaselineRelativeTable {
    /// The declared CSV header, in fixed order.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["site".to_string()];
        header.extend(self.context_columns.iter().cloned());
        header.push("intervention".to_string());
        header.push(self.channel.clone());
        header.push(format!("baseline_{}", self.channel));
        header.push("averted".to_string());
        header.push("reduction".to_string());
        header
    }

    /// Write the comparison as delimited text.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for row in &self.rows {
            let mut record = vec![row.site.clone()];
            record.extend(row.context.iter().map(|t| t.to_string()));
            record.push(row.intervention.clone());
            record.push(row.value.to_string());
            record.push(row.baseline_value.to_string());
            record.push(row.averted.to_string());
            record.push(row.reduction.to_string());
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// One row after rate derivation and (optional) replicate collapse.
struct WorkRecord {
    site: String,
    sweeps: Vec<TagValue>,
    metrics: Vec<f64>,
}

/// Compute the baseline-relative table for one metric channel.
pub fn reduce(
    table: &ConsolidatedTable,
    spec: &ReductionSpec,
) -> Result<BaselineRelativeTable, AnalysisError> {
    // Resolve derived rates against the table's metric columns.
    let mut metric_columns = table.metric_columns.clone();
    let mut rate_plan = Vec::new();
    for rate in &spec.rates {
        let numerator = table.metric_columns.iter().position(|c| *c == rate.numerator);
        let denominator = table
            .metric_columns
            .iter()
            .position(|c| *c == rate.denominator);
        match (numerator, denominator) {
            (Some(n), Some(d)) => {
                rate_plan.push((n, d, rate.scale));
                metric_columns.push(rate.name.clone());
            }
            _ => debug!(
                "Rate '{}' skipped: inputs not in table columns",
                rate.name
            ),
        }
    }

    let channel_idx = metric_columns
        .iter()
        .position(|c| *c == spec.channel)
        .ok_or_else(|| AnalysisError::MissingColumn(spec.channel.clone()))?;

    // Locate the replicate sweep column.
    let sweep_columns = &table.sweep_columns;
    let replicate_idx = match &spec.replicate_variable {
        Some(var) => Some(
            sweep_columns
                .iter()
                .position(|c| c == var)
                .ok_or_else(|| AnalysisError::MissingColumn(var.clone()))?,
        ),
        None => None,
    };

    // Materialize working records with derived rate values appended.
    let mut zero_denominators = 0usize;
    let records: Vec<WorkRecord> = table
        .rows
        .iter()
        .map(|row| {
            let mut metrics = row.values.clone();
            for &(n, d, scale) in &rate_plan {
                if row.values[d] == 0.0 {
                    zero_denominators += 1;
                    metrics.push(0.0);
                } else {
                    metrics.push(row.values[n] / row.values[d] * scale);
                }
            }
            WorkRecord {
                site: row.site.clone(),
                sweeps: row.tags.clone(),
                metrics,
            }
        })
        .collect();
    if zero_denominators > 0 {
        warn!(
            "{} rows had a zero rate denominator; their rate values were set to 0",
            zero_denominators
        );
    }

    // Average out the replicate variable (and the time axis with it).
    let (work_columns, records) = match replicate_idx {
        Some(idx) => {
            let columns: Vec<String> = sweep_columns
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, c)| c.clone())
                .collect();
            (columns, collapse_replicates(records, idx))
        }
        None => (sweep_columns.clone(), records),
    };

    // Resolved after the collapse: if the replicate variable shadowed the
    // intervention variable, the column is gone and that is an error here.
    let intervention_idx = work_columns
        .iter()
        .position(|c| *c == spec.intervention_variable)
        .ok_or_else(|| AnalysisError::MissingColumn(spec.intervention_variable.clone()))?;
    let context_columns: Vec<String> = work_columns
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != intervention_idx)
        .map(|(_, c)| c.clone())
        .collect();

    // Group by (site, sweep-context excluding the intervention label).
    let mut groups: BTreeMap<Vec<String>, Vec<&WorkRecord>> = BTreeMap::new();
    for record in &records {
        let mut key = vec![record.site.clone()];
        key.extend(
            record
                .sweeps
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != intervention_idx)
                .map(|(_, t)| t.to_string()),
        );
        groups.entry(key).or_default().push(record);
    }

    let mut rows = Vec::new();
    let mut groups_without_baseline = 0usize;
    let mut zero_baseline_rows = 0usize;

    for members in groups.values() {
        let baselines: Vec<&&WorkRecord> = members
            .iter()
            .filter(|r| r.sweeps[intervention_idx].to_string() == spec.baseline)
            .collect();

        let baseline = match baselines.len() {
            0 => {
                groups_without_baseline += 1;
                continue;
            }
            1 => baselines[0],
            count => {
                let sample = members[0];
                return Err(AnalysisError::AmbiguousBaseline {
                    site: sample.site.clone(),
                    context: format_context(&context_columns, sample, intervention_idx),
                    baseline: spec.baseline.clone(),
                    count,
                });
            }
        };
        let baseline_value = baseline.metrics[channel_idx];

        for record in members.iter() {
            let label = record.sweeps[intervention_idx].to_string();
            if label == spec.baseline || spec.ignore.contains(&label) {
                continue;
            }
            if baseline_value == 0.0 {
                // Never let a zero baseline turn into Inf/NaN downstream.
                zero_baseline_rows += 1;
                continue;
            }
            let value = record.metrics[channel_idx];
            let averted = baseline_value - value;
            let reduction = (averted / baseline_value).max(0.0);
            rows.push(ReductionRow {
                site: record.site.clone(),
                context: record
                    .sweeps
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != intervention_idx)
                    .map(|(_, t)| t.clone())
                    .collect(),
                intervention: label,
                value,
                baseline_value,
                averted,
                reduction,
            });
        }
    }

    rows.sort_by(|a, b| {
        (&a.site, context_key(&a.context), &a.intervention).cmp(&(
            &b.site,
            context_key(&b.context),
            &b.intervention,
        ))
    });

    Ok(BaselineRelativeTable {
        channel: spec.channel.clone(),
        baseline: spec.baseline.clone(),
        context_columns,
        rows,
        groups_without_baseline,
        zero_baseline_rows,
    })
}

/// Mean every metric within (site, sweeps-minus-replicate) groups. Replicate
/// runs and retained time buckets average together, matching the grouped
/// mean the plotting scripts apply before comparing arms.
fn collapse_replicates(records: Vec<WorkRecord>, replicate_idx: usize) -> Vec<WorkRecord> {
    struct Accum {
        site: String,
        sweeps: Vec<TagValue>,
        sums: Vec<f64>,
        count: usize,
    }

    let mut groups: BTreeMap<Vec<String>, Accum> = BTreeMap::new();
    for record in records {
        let sweeps: Vec<TagValue> = record
            .sweeps
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != replicate_idx)
            .map(|(_, t)| t.clone())
            .collect();
        let mut key = vec![record.site.clone()];
        key.extend(sweeps.iter().map(|t| t.to_string()));

        match groups.get_mut(&key) {
            Some(accum) => {
                for (sum, value) in accum.sums.iter_mut().zip(&record.metrics) {
                    *sum += value;
                }
                accum.count += 1;
            }
            None => {
                groups.insert(
                    key,
                    Accum {
                        site: record.site,
                        sweeps,
                        sums: record.metrics,
                        count: 1,
                    },
                );
            }
        }
    }

    groups
        .into_values()
        .map(|accum| WorkRecord {
            site: accum.site,
            sweeps: accum.sweeps,
            metrics: accum
                .sums
                .iter()
                .map(|s| s / accum.count as f64)
                .collect(),
        })
        .collect()
}

fn format_context(context_columns: &[String], record: &WorkRecord, intervention_idx: usize) -> String {
    let values: Vec<String> = record
        .sweeps
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != intervention_idx)
        .map(|(_, t)| t.to_string())
        .collect();
    context_columns
        .iter()
        .zip(values)
        .map(|(column, value)| format!("{}={}", column, value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn context_key(context: &[TagValue]) -> Vec<String> {
    context.iter().map(|t| t.to_string()).collect()
}
