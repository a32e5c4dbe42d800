//! Outlier detection over numeric columns of a loosely typed table.
//!
//! Columns are standardised before fitting. Every method produces one score
//! per row where lower is more anomalous; a row is flagged when its score
//! falls below the `contamination` percentile of all scores.

pub mod detector;
pub mod envelope;
pub mod error;
pub mod isolation;
pub mod lof;
pub mod report;
pub mod scaler;
pub mod stats;
pub mod table;

pub use detector::{detect_anomalies, AnomalyDetector, DEFAULT_CONTAMINATION, MAX_DETAILS, MIN_ROWS};
pub use error::AnomalyError;
pub use report::{
    AnomalyDetail, AnomalyReport, ColumnStatistics, DetectionOutcome, EnsembleReport, Method,
    ModelParameters, Severity, SeverityDistribution,
};
pub use table::{Dataset, Table};
