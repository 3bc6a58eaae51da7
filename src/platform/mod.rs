//! Experiment-service integration.
//!
//! The simulation runs themselves live on the external platform; this
//! module only pulls an experiment's resolved outputs down into the local
//! data directory the scanner reads.

mod client;

pub use client::{ExperimentInfo, FetchSummary, PlatformClient, SimulationInfo};
