//! Reference site table.
//!
//! A static CSV mapping site name to the numeric node identifier used by the
//! spatial reports (plus coordinates, which this tool carries through but
//! does not use). Loaded once per analysis run, read-only afterwards.

use crate::error::AnalysisError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// One row of the site table.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteRecord {
    /// Site name as used in report artifact names.
    pub name: String,
    /// Node identifier within the spatial grid.
    #[serde(rename = "nodeid")]
    pub node_id: u32,
    #[allow(dead_code)] // Carried for plotting scripts
    #[serde(default)]
    pub lat: Option<f64>,
    #[allow(dead_code)] // Carried for plotting scripts
    #[serde(default)]
    pub lon: Option<f64>,
}

/// The reference site table for an analysis run.
#[derive(Debug, Clone)]
pub struct SiteTable {
    records: Vec<SiteRecord>,
}

impl SiteTable {
    /// Load the table from a CSV file with a `name,nodeid,...` header.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open site table: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse site table: {}", path.display()))
    }

    /// Parse the table from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: SiteRecord = result?;
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Node identifier for a site name.
    pub fn node_id(&self, site: &str) -> Result<u32, AnalysisError> {
        self.records
            .iter()
            .find(|r| r.name == site)
            .map(|r| r.node_id)
            .ok_or_else(|| AnalysisError::UnknownSite(site.to_string()))
    }

    /// All site names, ascending. Extractors iterate this order so that
    /// row-sets come out sorted by site.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "name,nodeid,lat,lon\n\
                          Matsari,340461476,12.43,8.42\n\
                          Sugungum,340461479,12.51,8.51\n\
                          Bbondo,394422636,-17.12,27.08\n";

    #[test]
    fn test_from_reader() {
        let table = SiteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.node_id("Matsari").unwrap(), 340461476);
    }

    #[test]
    fn test_names_are_sorted() {
        let table = SiteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.names(), vec!["Bbondo", "Matsari", "Sugungum"]);
    }

    #[test]
    fn test_unknown_site_is_named_error() {
        let table = SiteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let err = table.node_id("Dapelogo").unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownSite(ref s) if s == "Dapelogo"));
    }

    #[test]
    fn test_load_checked_in_fixture() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join("site_details.csv");
        let table = SiteTable::load(&path).unwrap();
        assert_eq!(table.len(), 8);
        assert!(table.node_id("Matsari").is_ok());
    }
}
