//! Per-simulation extraction.
//!
//! An [`Extractor`] turns one simulation's parsed artifacts plus its sweep
//! tags into a [`RowSet`]: one row per (site, time-bucket), tagged with the
//! full declared sweep vector. Extraction is a pure function of its inputs;
//! the three variants differ only in which artifacts they read and how they
//! collapse the extra axes.

use crate::artifacts::{self, ArtifactSet};
use crate::config::{AnalysisConfig, AnalyzerVariant};
use crate::error::AnalysisError;
use crate::models::{ChannelRule, Row, RowSet, SimulationTags, SweepSpec, TimeSlice};
use crate::sites::SiteTable;

/// One per-simulation extraction strategy.
pub trait Extractor {
    /// Variant name, for logs.
    fn name(&self) -> &'static str;

    /// Artifact names this extractor needs for every simulation.
    fn required_artifacts(&self) -> Vec<String>;

    /// Produce the simulation's row-set, ordered by (site, time) ascending.
    fn extract(
        &self,
        artifacts: &ArtifactSet,
        tags: &SimulationTags,
    ) -> Result<RowSet, AnalysisError>;
}

/// Build the configured extractor. The site table is required for the
/// summary and spatial variants; the inset variant reads a whole-population
/// artifact and does not use it.
pub fn build_extractor(
    config: &AnalysisConfig,
    sites: Option<&SiteTable>,
) -> Result<Box<dyn Extractor>, AnalysisError> {
    let sweep = SweepSpec::new(config.sweep_variables.clone(), config.tag_default);
    let slice = config.effective_time_slice();

    match config.variant {
        AnalyzerVariant::Summary => {
            let table = sites.ok_or_else(|| {
                AnalysisError::UnknownSite("<no site table loaded>".to_string())
            })?;
            Ok(Box::new(SummaryExtractor::new(
                site_names(config, table)?,
                config.summary_channel.clone(),
                config.summary_column.clone(),
                slice,
                sweep,
            )))
        }
        AnalyzerVariant::Spatial => {
            let table = sites.ok_or_else(|| {
                AnalysisError::UnknownSite("<no site table loaded>".to_string())
            })?;
            let channels = config
                .spatial
                .iter()
                .map(|c| SpatialChannel {
                    name: c.channel.clone(),
                    rule: c.rule,
                })
                .collect();
            Ok(Box::new(SpatialExtractor::new(
                table,
                &site_names(config, table)?,
                config.summary_channel.clone(),
                config.summary_column.clone(),
                slice,
                channels,
                sweep,
            )?))
        }
        AnalyzerVariant::Inset => Ok(Box::new(InsetExtractor::new(
            config.inset.channels.clone(),
            config.inset.window_start,
            config.inset.window_end,
            config.inset.site_label.clone(),
            sweep,
        ))),
    }
}

/// Resolve the configured site list against the reference table. An empty
/// configuration means every site in the table.
fn site_names(config: &AnalysisConfig, table: &SiteTable) -> Result<Vec<String>, AnalysisError> {
    if config.sites.is_empty() {
        return Ok(table.names());
    }
    for site in &config.sites {
        table.node_id(site)?;
    }
    let mut names = config.sites.clone();
    names.sort();
    Ok(names)
}

/// Summary-report variant: one metric column taken from each site's summary
/// report, sliced per the declared [`TimeSlice`].
pub struct SummaryExtractor {
    sites: Vec<String>,
    channel: String,
    column: String,
    slice: TimeSlice,
    sweep: SweepSpec,
}

impl SummaryExtractor {
    pub fn new(
        mut sites: Vec<String>,
        channel: String,
        column: String,
        slice: TimeSlice,
        sweep: SweepSpec,
    ) -> Self {
        sites.sort();
        Self {
            sites,
            channel,
            column,
            slice,
            sweep,
        }
    }

    /// Sliced summary rows for one site: (time index, value) pairs in report
    /// order.
    fn site_window(
        &self,
        artifacts: &ArtifactSet,
        site: &str,
    ) -> Result<Vec<(usize, f64)>, AnalysisError> {
        let artifact = artifacts::summary_artifact(site);
        let report = artifacts.summary(&artifact)?;
        let series = report.channel(&artifact, &self.channel)?;
        let (start, window) = self.slice.apply(&series);
        if window.is_empty() {
            return Err(AnalysisError::EmptySlice {
                artifact,
                slice: self.slice,
                len: series.len(),
            });
        }
        Ok(window
            .iter()
            .enumerate()
            .map(|(i, v)| (start + i, *v))
            .collect())
    }
}

impl Extractor for SummaryExtractor {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn required_artifacts(&self) -> Vec<String> {
        self.sites
            .iter()
            .map(|s| artifacts::summary_artifact(s))
            .collect()
    }

    fn extract(
        &self,
        artifacts: &ArtifactSet,
        tags: &SimulationTags,
    ) -> Result<RowSet, AnalysisError> {
        let tag_vector = self.sweep.tag_vector(tags);
        let mut rows = Vec::new();

        for site in &self.sites {
            for (time, value) in self.site_window(artifacts, site)? {
                rows.push(Row {
                    site: site.clone(),
                    time,
                    values: vec![value],
                    tags: tag_vector.clone(),
                });
            }
        }

        Ok(RowSet {
            metric_columns: vec![self.column.clone()],
            sweep_columns: self.sweep.variables.clone(),
            rows,
        })
    }
}

/// One spatial channel with its declared node-collapse rule.
#[derive(Debug, Clone)]
pub struct SpatialChannel {
    pub name: String,
    pub rule: ChannelRule,
}

/// Spatial variant: the summary channel per site, plus each spatial channel
/// collapsed to a scalar over the site's node series (sum for count
/// channels, mean for intensity channels).
pub struct SpatialExtractor {
    /// (site, node id), sorted by site name.
    sites: Vec<(String, u32)>,
    summary: SummaryExtractor,
    channels: Vec<SpatialChannel>,
}

impl SpatialExtractor {
    pub fn new(
        table: &SiteTable,
        sites: &[String],
        channel: String,
        column: String,
        slice: TimeSlice,
        channels: Vec<SpatialChannel>,
        sweep: SweepSpec,
    ) -> Result<Self, AnalysisError> {
        let mut resolved = Vec::with_capacity(sites.len());
        for site in sites {
            resolved.push((site.clone(), table.node_id(site)?));
        }
        resolved.sort_by(|a, b| a.0.cmp(&b.0));
        let names: Vec<String> = resolved.iter().map(|(s, _)| s.clone()).collect();
        Ok(Self {
            sites: resolved,
            summary: SummaryExtractor::new(names, channel, column, slice, sweep),
            channels,
        })
    }

    /// Collapse every spatial channel to a scalar for one site's node.
    fn node_scalars(
        &self,
        artifacts: &ArtifactSet,
        node: u32,
    ) -> Result<Vec<f64>, AnalysisError> {
        let mut scalars = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let artifact = artifacts::spatial_artifact(&channel.name);
            let report = artifacts.spatial(&artifact)?;
            if report.timesteps() == 0 {
                return Err(AnalysisError::ArtifactSchema {
                    artifact,
                    reason: "spatial report has no timesteps".to_string(),
                });
            }
            let series = report.node_series(&artifact, node)?;
            scalars.push(channel.rule.apply(&series));
        }
        Ok(scalars)
    }
}

impl Extractor for SpatialExtractor {
    fn name(&self) -> &'static str {
        "spatial"
    }

    fn required_artifacts(&self) -> Vec<String> {
        let mut names = self.summary.required_artifacts();
        names.extend(
            self.channels
                .iter()
                .map(|c| artifacts::spatial_artifact(&c.name)),
        );
        names
    }

    fn extract(
        &self,
        artifacts: &ArtifactSet,
        tags: &SimulationTags,
    ) -> Result<RowSet, AnalysisError> {
        let tag_vector = self.summary.sweep.tag_vector(tags);
        let mut rows = Vec::new();

        for (site, node) in &self.sites {
            let window = self.summary.site_window(artifacts, site)?;
            let scalars = self.node_scalars(artifacts, *node)?;
            for (time, value) in window {
                let mut values = Vec::with_capacity(1 + scalars.len());
                values.push(value);
                values.extend_from_slice(&scalars);
                rows.push(Row {
                    site: site.clone(),
                    time,
                    values,
                    tags: tag_vector.clone(),
                });
            }
        }

        let mut metric_columns = vec![self.summary.column.clone()];
        metric_columns.extend(self.channels.iter().map(|c| c.name.clone()));

        Ok(RowSet {
            metric_columns,
            sweep_columns: self.summary.sweep.variables.clone(),
            rows,
        })
    }
}

/// Inset variant: whole-population inset-chart channels over a trailing
/// window. The window is `series[len - start .. len - end]`, both offsets
/// counted back from the end of the series.
pub struct InsetExtractor {
    channels: Vec<String>,
    window_start: usize,
    window_end: usize,
    site_label: String,
    sweep: SweepSpec,
}

impl InsetExtractor {
    pub fn new(
        channels: Vec<String>,
        window_start: usize,
        window_end: usize,
        site_label: String,
        sweep: SweepSpec,
    ) -> Self {
        Self {
            channels,
            window_start,
            window_end,
            site_label,
            sweep,
        }
    }
}

impl Extractor for InsetExtractor {
    fn name(&self) -> &'static str {
        "inset"
    }

    fn required_artifacts(&self) -> Vec<String> {
        vec![artifacts::INSET_ARTIFACT.to_string()]
    }

    fn extract(
        &self,
        artifact_set: &ArtifactSet,
        tags: &SimulationTags,
    ) -> Result<RowSet, AnalysisError> {
        let artifact = artifacts::INSET_ARTIFACT;
        let chart = artifact_set.inset(artifact)?;
        let tag_vector = self.sweep.tag_vector(tags);

        if self.window_start <= self.window_end {
            return Err(AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!(
                    "window start offset {} must exceed end offset {}",
                    self.window_start, self.window_end
                ),
            });
        }

        // Every channel must cover the window, and all with one length.
        let mut len = None;
        for name in &self.channels {
            let series = chart.channel(artifact, name)?;
            match len {
                None => len = Some(series.len()),
                Some(expected) if expected != series.len() => {
                    return Err(AnalysisError::ArtifactSchema {
                        artifact: artifact.to_string(),
                        reason: format!(
                            "channel '{}' has {} elements, expected {}",
                            name,
                            series.len(),
                            expected
                        ),
                    });
                }
                Some(_) => {}
            }
        }
        let len = len.unwrap_or(0);
        if len < self.window_start {
            return Err(AnalysisError::ArtifactSchema {
                artifact: artifact.to_string(),
                reason: format!(
                    "series length {} shorter than window start offset {}",
                    len, self.window_start
                ),
            });
        }

        let start = len - self.window_start;
        let end = len - self.window_end;
        let mut rows = Vec::with_capacity(end - start);
        for time in start..end {
            let mut values = Vec::with_capacity(self.channels.len());
            for name in &self.channels {
                values.push(chart.channel(artifact, name)?[time]);
            }
            rows.push(Row {
                site: self.site_label.clone(),
                time,
                values,
                tags: tag_vector.clone(),
            });
        }

        Ok(RowSet {
            metric_columns: self.channels.clone(),
            sweep_columns: self.sweep.variables.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Artifact;
    use crate::models::TagValue;

    fn sweep() -> SweepSpec {
        SweepSpec::new(
            vec!["Run_Number".to_string(), "intervention".to_string()],
            0.0,
        )
    }

    fn tags(run: f64, intervention: &str) -> SimulationTags {
        let mut tags = SimulationTags::new();
        tags.insert("Run_Number".to_string(), TagValue::Number(run));
        tags.insert(
            "intervention".to_string(),
            TagValue::Text(intervention.to_string()),
        );
        tags
    }

    fn summary_set(sites: &[(&str, &str)]) -> ArtifactSet {
        let mut set = ArtifactSet::new("sim-1".to_string());
        for (site, body) in sites {
            let name = artifacts::summary_artifact(site);
            set.insert(name.clone(), Artifact::parse(&name, body.as_bytes()).unwrap());
        }
        set
    }

    #[test]
    fn test_summary_extract_drop_last() {
        let set = summary_set(&[(
            "Matsari",
            r#"{"DataByTime": {"PfPR_2to10": [0.4, 0.3, 0.2]}}"#,
        )]);
        let extractor = SummaryExtractor::new(
            vec!["Matsari".to_string()],
            "PfPR_2to10".to_string(),
            "PfPR2to10".to_string(),
            TimeSlice::DropLast,
            sweep(),
        );

        let rows = extractor.extract(&set, &tags(1.0, "itn")).unwrap();
        assert_eq!(rows.metric_columns, vec!["PfPR2to10"]);
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0].time, 0);
        assert_eq!(rows.rows[0].values, vec![0.4]);
        assert_eq!(rows.rows[1].time, 1);
        assert_eq!(rows.rows[1].values, vec![0.3]);
    }

    #[test]
    fn test_summary_rows_ordered_by_site_then_time() {
        // Sites passed out of order; rows must come out sorted by site.
        let set = summary_set(&[
            ("Sugungum", r#"{"DataByTime": {"PfPR_2to10": [0.5, 0.6, 0.7]}}"#),
            ("Matsari", r#"{"DataByTime": {"PfPR_2to10": [0.1, 0.2, 0.3]}}"#),
        ]);
        let extractor = SummaryExtractor::new(
            vec!["Sugungum".to_string(), "Matsari".to_string()],
            "PfPR_2to10".to_string(),
            "PfPR2to10".to_string(),
            TimeSlice::DropLast,
            sweep(),
        );

        let rows = extractor.extract(&set, &tags(0.0, "none")).unwrap();
        let order: Vec<(&str, usize)> = rows
            .rows
            .iter()
            .map(|r| (r.site.as_str(), r.time))
            .collect();
        assert_eq!(
            order,
            vec![("Matsari", 0), ("Matsari", 1), ("Sugungum", 0), ("Sugungum", 1)]
        );
    }

    #[test]
    fn test_summary_missing_sweep_tag_defaults_to_zero() {
        let set = summary_set(&[(
            "Matsari",
            r#"{"DataByTime": {"PfPR_2to10": [0.4, 0.3]}}"#,
        )]);
        let extractor = SummaryExtractor::new(
            vec!["Matsari".to_string()],
            "PfPR_2to10".to_string(),
            "PfPR2to10".to_string(),
            TimeSlice::SecondToLast,
            sweep(),
        );

        // Tags carry only Run_Number; intervention must resolve to 0.
        let mut partial = SimulationTags::new();
        partial.insert("Run_Number".to_string(), TagValue::Number(3.0));
        let rows = extractor.extract(&set, &partial).unwrap();
        assert_eq!(
            rows.rows[0].tags,
            vec![TagValue::Number(3.0), TagValue::Number(0.0)]
        );
    }

    #[test]
    fn test_summary_short_series_is_empty_slice_error() {
        let set = summary_set(&[("Matsari", r#"{"DataByTime": {"PfPR_2to10": [0.4]}}"#)]);
        let extractor = SummaryExtractor::new(
            vec!["Matsari".to_string()],
            "PfPR_2to10".to_string(),
            "PfPR2to10".to_string(),
            TimeSlice::SecondToLast,
            sweep(),
        );

        let err = extractor.extract(&set, &tags(0.0, "none")).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptySlice { len: 1, .. }));
    }

    fn spatial_site_table() -> SiteTable {
        SiteTable::from_reader("name,nodeid\nMatsari,11\nSugungum,22\n".as_bytes()).unwrap()
    }

    #[test]
    fn test_spatial_sum_and_mean_rules() {
        let table = spatial_site_table();
        let extractor = SpatialExtractor::new(
            &table,
            &["Matsari".to_string()],
            "PfPR_2to10".to_string(),
            "PfPR2to10".to_string(),
            TimeSlice::SecondToLast,
            vec![
                SpatialChannel {
                    name: "New_Clinical_Cases".to_string(),
                    rule: ChannelRule::Sum,
                },
                SpatialChannel {
                    name: "Population".to_string(),
                    rule: ChannelRule::Mean,
                },
            ],
            sweep(),
        )
        .unwrap();

        let mut set = summary_set(&[(
            "Matsari",
            r#"{"DataByTime": {"PfPR_2to10": [0.4, 0.3, 0.2]}}"#,
        )]);
        // Node 11 series: cases [5, 7, 9] (sum 21), population [100, 110, 120]
        // (mean 110). Node 22 values must not leak into the collapse.
        let cases = artifacts::spatial_artifact("New_Clinical_Cases");
        set.insert(
            cases.clone(),
            Artifact::parse(
                &cases,
                br#"{"node_ids": [11, 22], "values": [[5.0, 1.0], [7.0, 1.0], [9.0, 1.0]]}"#,
            )
            .unwrap(),
        );
        let pop = artifacts::spatial_artifact("Population");
        set.insert(
            pop.clone(),
            Artifact::parse(
                &pop,
                br#"{"node_ids": [11, 22], "values": [[100.0, 9.0], [110.0, 9.0], [120.0, 9.0]]}"#,
            )
            .unwrap(),
        );

        let rows = extractor.extract(&set, &tags(0.0, "atsb")).unwrap();
        assert_eq!(
            rows.metric_columns,
            vec!["PfPR2to10", "New_Clinical_Cases", "Population"]
        );
        assert_eq!(rows.rows.len(), 1);
        // Second-to-last summary value, exact sum, exact mean.
        assert_eq!(rows.rows[0].values, vec![0.3, 21.0, 110.0]);
    }

    #[test]
    fn test_spatial_unknown_site_rejected_at_build() {
        let table = spatial_site_table();
        let err = SpatialExtractor::new(
            &table,
            &["Dapelogo".to_string()],
            "PfPR_2to10".to_string(),
            "PfPR2to10".to_string(),
            TimeSlice::SecondToLast,
            Vec::new(),
            sweep(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AnalysisError::UnknownSite(_)));
    }

    #[test]
    fn test_inset_window() {
        let mut set = ArtifactSet::new("sim-1".to_string());
        let body = br#"{"Channels": {"Infected": {"Data": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]}}}"#;
        set.insert(
            artifacts::INSET_ARTIFACT.to_string(),
            Artifact::parse(artifacts::INSET_ARTIFACT, body).unwrap(),
        );

        // len 6, window [len-4 .. len-2] = indices 2..4.
        let extractor = InsetExtractor::new(
            vec!["Infected".to_string()],
            4,
            2,
            "all".to_string(),
            sweep(),
        );
        let rows = extractor.extract(&set, &tags(0.0, "none")).unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0].time, 2);
        assert_eq!(rows.rows[0].values, vec![3.0]);
        assert_eq!(rows.rows[1].time, 3);
        assert_eq!(rows.rows[1].values, vec![4.0]);
        assert_eq!(rows.rows[0].site, "all");
    }

    #[test]
    fn test_inset_short_series_rejected() {
        let mut set = ArtifactSet::new("sim-1".to_string());
        let body = br#"{"Channels": {"Infected": {"Data": [1.0, 2.0]}}}"#;
        set.insert(
            artifacts::INSET_ARTIFACT.to_string(),
            Artifact::parse(artifacts::INSET_ARTIFACT, body).unwrap(),
        );

        let extractor = InsetExtractor::new(
            vec!["Infected".to_string()],
            578,
            213,
            "all".to_string(),
            sweep(),
        );
        let err = extractor.extract(&set, &tags(0.0, "none")).unwrap_err();
        assert!(err.to_string().contains("shorter than window"));
    }

    #[test]
    fn test_build_extractor_variants() {
        let table = spatial_site_table();
        let mut config = AnalysisConfig::default();

        config.variant = AnalyzerVariant::Summary;
        let extractor = build_extractor(&config, Some(&table)).unwrap();
        assert_eq!(extractor.name(), "summary");
        assert_eq!(extractor.required_artifacts().len(), 2);

        config.variant = AnalyzerVariant::Spatial;
        let extractor = build_extractor(&config, Some(&table)).unwrap();
        assert_eq!(extractor.name(), "spatial");
        // Two summary reports plus four spatial channels.
        assert_eq!(extractor.required_artifacts().len(), 6);

        config.variant = AnalyzerVariant::Inset;
        let extractor = build_extractor(&config, None).unwrap();
        assert_eq!(extractor.name(), "inset");
        assert_eq!(
            extractor.required_artifacts(),
            vec!["output/InsetChart.json".to_string()]
        );
    }
}
