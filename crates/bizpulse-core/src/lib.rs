//! Shared domain model for the bizpulse analytical pipeline.
//!
//! Holds the artifact types every engine reads and writes, the
//! [`RecordStore`] repository contract, the injectable [`Clock`], and the
//! environment-driven [`AppConfig`].

use thiserror::Error;

pub mod app_config;
pub mod clock;
pub mod config;
pub mod store;
pub mod types;

pub use app_config::{AppConfig, Environment};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use store::memory::MemoryStore;
pub use store::{RecordStore, StoreError, UpsertOutcome};
pub use types::{
    Insight, InsightMetrics, KpiRecord, NewKpi, NewTextRecord, OpportunityLevel, RawRecord,
    RiskLevel, SentimentLabel, SentimentResult, TextRecord, TrendCandidate, TrendSignal,
    TrendStatus, TEXT_FIELD_CANDIDATES,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid sentiment label: {0}")]
    InvalidSentimentLabel(String),

    #[error("invalid trend status: {0}")]
    InvalidTrendStatus(String),

    #[error("invalid risk level: {0}")]
    InvalidRiskLevel(String),

    #[error("invalid opportunity level: {0}")]
    InvalidOpportunityLevel(String),
}
