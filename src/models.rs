//! Core table types for the aggregation pipeline.
//!
//! The pipeline moves data through three shapes: per-simulation [`RowSet`]s,
//! one [`ConsolidatedTable`] per experiment, and (downstream) the
//! baseline-relative table produced by the reduction stage. Row-sets are
//! created once per simulation and never mutated, only concatenated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

/// Opaque simulation identifier assigned by the external platform.
pub type SimulationId = String;

/// Sweep-tag mapping for one simulation, as recorded by the platform.
///
/// A `BTreeMap` keeps tag iteration deterministic across runs.
pub type SimulationTags = BTreeMap<String, TagValue>;

/// A sweep-tag value. The platform records tags as JSON scalars; everything
/// that is not a number is carried as text (intervention labels mostly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Number(n) => write!(f, "{}", n),
            TagValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Which elements of a channel time series an extractor retains.
///
/// The original analyzers disagreed on this (`[-2:-1]` in one, `[:-1]` in a
/// near-duplicate), so it is a declared parameter rather than a convention.
/// Offsets are exact: `SecondToLast` keeps only the element at index
/// `len - 2`; `DropLast` keeps `0..len - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSlice {
    /// Keep only the second-to-last element of the series.
    #[default]
    SecondToLast,
    /// Keep every element except the last.
    DropLast,
    /// Keep the whole series.
    All,
}

impl TimeSlice {
    /// Apply the slice to a series. Returns the index of the first retained
    /// element and the retained window. The window is empty when the series
    /// is too short; callers reject that as an `EmptySlice` error rather
    /// than emitting a zero-row contribution.
    pub fn apply<'a>(&self, series: &'a [f64]) -> (usize, &'a [f64]) {
        let len = series.len();
        match self {
            TimeSlice::SecondToLast => {
                if len >= 2 {
                    (len - 2, &series[len - 2..len - 1])
                } else {
                    (0, &series[0..0])
                }
            }
            TimeSlice::DropLast => {
                if len >= 2 {
                    (0, &series[..len - 1])
                } else {
                    (0, &series[0..0])
                }
            }
            TimeSlice::All => (0, series),
        }
    }
}

impl fmt::Display for TimeSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlice::SecondToLast => write!(f, "second-to-last"),
            TimeSlice::DropLast => write!(f, "drop-last"),
            TimeSlice::All => write!(f, "all"),
        }
    }
}

/// Per-channel rule for collapsing a spatial channel over the node axis.
///
/// Declared per channel in configuration, never inferred: additive count
/// channels (new infections, new clinical cases) sum; intensity and ratio
/// channels (population, prevalence) average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRule {
    Sum,
    Mean,
}

impl ChannelRule {
    /// Collapse a node's series to a scalar. Empty series are rejected
    /// during extraction, before this is reached.
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            ChannelRule::Sum => values.iter().sum(),
            ChannelRule::Mean => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
        }
    }
}

/// The declared sweep variables of an experiment plus the default value
/// substituted when a simulation's tags omit one of them.
#[derive(Debug, Clone)]
pub struct SweepSpec {
    pub variables: Vec<String>,
    pub default: f64,
}

impl SweepSpec {
    pub fn new(variables: Vec<String>, default: f64) -> Self {
        Self { variables, default }
    }

    /// Resolve a simulation's tag vector in declared-variable order.
    /// Missing variables get the declared default, so two runs over the
    /// same inputs always produce the same columns and values.
    pub fn tag_vector(&self, tags: &SimulationTags) -> Vec<TagValue> {
        self.variables
            .iter()
            .map(|var| {
                tags.get(var)
                    .cloned()
                    .unwrap_or(TagValue::Number(self.default))
            })
            .collect()
    }
}

/// One row of a row-set: a (site, time-bucket) observation with its metric
/// values and the full sweep-tag vector of the originating simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub site: String,
    /// Time-bucket index within the originating report series.
    pub time: usize,
    /// Parallel to `RowSet::metric_columns`.
    pub values: Vec<f64>,
    /// Parallel to `RowSet::sweep_columns`.
    pub tags: Vec<TagValue>,
}

/// Per-simulation extraction result: one row per (site, time-bucket),
/// ordered by (site, time) ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub metric_columns: Vec<String>,
    pub sweep_columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when two row-sets agree on both column sets, order included.
    pub fn columns_match(&self, other: &RowSet) -> bool {
        self.metric_columns == other.metric_columns
            && self.sweep_columns == other.sweep_columns
    }
}

/// Concatenation of every row-set in an experiment. The column set
/// {site, time, metric channels..., sweep variables...} is the compatibility
/// contract with downstream plotting and must not change silently.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedTable {
    pub experiment: String,
    pub metric_columns: Vec<String>,
    pub sweep_columns: Vec<String>,
    /// Number of simulations that contributed rows.
    pub simulation_count: usize,
    pub rows: Vec<Row>,
}

impl ConsolidatedTable {
    /// The declared CSV header, in fixed order.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["site".to_string(), "time".to_string()];
        header.extend(self.metric_columns.iter().cloned());
        header.extend(self.sweep_columns.iter().cloned());
        header
    }

    /// Write the table as delimited text. Numeric formatting goes through
    /// `Display`, which is deterministic, so identical tables serialize to
    /// identical bytes.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for row in &self.rows {
            let mut record = vec![row.site.clone(), row.time.to_string()];
            record.extend(row.values.iter().map(|v| v.to_string()));
            record.extend(row.tags.iter().map(|t| t.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_value_display() {
        assert_eq!(TagValue::Number(0.5).to_string(), "0.5");
        assert_eq!(TagValue::Number(3.0).to_string(), "3");
        assert_eq!(TagValue::Text("itn".to_string()).to_string(), "itn");
    }

    #[test]
    fn test_tag_value_deserializes_untagged() {
        let tags: SimulationTags =
            serde_json::from_str(r#"{"Run_Number": 4, "intervention": "atsb"}"#).unwrap();
        assert_eq!(tags.get("Run_Number"), Some(&TagValue::Number(4.0)));
        assert_eq!(
            tags.get("intervention"),
            Some(&TagValue::Text("atsb".to_string()))
        );
    }

    #[test]
    fn test_time_slice_second_to_last() {
        let series = [0.1, 0.2, 0.3, 0.4];
        let (start, window) = TimeSlice::SecondToLast.apply(&series);
        assert_eq!(start, 2);
        assert_eq!(window, &[0.3]);
    }

    #[test]
    fn test_time_slice_drop_last() {
        let series = [0.1, 0.2, 0.3];
        let (start, window) = TimeSlice::DropLast.apply(&series);
        assert_eq!(start, 0);
        assert_eq!(window, &[0.1, 0.2]);
    }

    #[test]
    fn test_time_slice_short_series_is_empty() {
        let series = [0.1];
        assert!(TimeSlice::SecondToLast.apply(&series).1.is_empty());
        assert!(TimeSlice::DropLast.apply(&series).1.is_empty());
        assert_eq!(TimeSlice::All.apply(&series).1, &[0.1]);
    }

    #[test]
    fn test_channel_rule_apply() {
        let values = [1.0, 2.0, 3.0, 6.0];
        assert_eq!(ChannelRule::Sum.apply(&values), 12.0);
        assert_eq!(ChannelRule::Mean.apply(&values), 3.0);
    }

    #[test]
    fn test_sweep_spec_defaults_missing_variables() {
        let spec = SweepSpec::new(
            vec!["Run_Number".to_string(), "intervention".to_string()],
            0.0,
        );
        let mut tags = SimulationTags::new();
        tags.insert("Run_Number".to_string(), TagValue::Number(7.0));

        let vector = spec.tag_vector(&tags);
        assert_eq!(vector[0], TagValue::Number(7.0));
        // Missing variable resolves to the declared default, never absent.
        assert_eq!(vector[1], TagValue::Number(0.0));
    }

    #[test]
    fn test_consolidated_table_header_order() {
        let table = ConsolidatedTable {
            experiment: "atsb_llin_v2".to_string(),
            metric_columns: vec!["PfPR2to10".to_string(), "Population".to_string()],
            sweep_columns: vec!["Run_Number".to_string()],
            simulation_count: 1,
            rows: Vec::new(),
        };
        assert_eq!(
            table.header(),
            vec!["site", "time", "PfPR2to10", "Population", "Run_Number"]
        );
    }

    #[test]
    fn test_consolidated_table_csv_output() {
        let table = ConsolidatedTable {
            experiment: "test".to_string(),
            metric_columns: vec!["PfPR2to10".to_string()],
            sweep_columns: vec!["Run_Number".to_string()],
            simulation_count: 1,
            rows: vec![Row {
                site: "Matsari".to_string(),
                time: 2,
                values: vec![0.4],
                tags: vec![TagValue::Number(0.0)],
            }],
        };

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "site,time,PfPR2to10,Run_Number\nMatsari,2,0.4,0\n");
    }
}
