//! Analytical engines for bizpulse.
//!
//! KPI computation, windowed trend detection, text-record processing and
//! insight synthesis, each reading from and writing to a [`RecordStore`]
//! through an injected [`Clock`]. [`Pipeline`] runs them per client.
//!
//! [`RecordStore`]: bizpulse_core::RecordStore
//! [`Clock`]: bizpulse_core::Clock

use serde::Serialize;

pub mod error;
pub mod insight;
pub mod kpi;
pub mod pipeline;
pub mod text;
pub mod trend;

pub use error::EngineError;
pub use insight::{InsightGenerator, INSUFFICIENT_DATA_SUMMARY};
pub use kpi::{compute_from_records, KpiEngine, KpiMap, KpiSummary};
pub use pipeline::{ClientOutcome, Pipeline, PipelineConfig, PipelineReport};
pub use text::{TextBatchSummary, TextProcessor};
pub use trend::{SectorOutcome, TrendConfig, TrendEngine, TrendSweep, GENERAL_SECTOR};

/// Outcome of one client's unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Success,
    /// Nothing to analyse in the period. Not a failure.
    NoData,
    Error,
}

impl ClientStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoData => "no_data",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
