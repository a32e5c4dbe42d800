//! Serializable detection reports.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::AnomalyError;

/// Detection method, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    IsolationForest,
    /// Gaussian envelope (Mahalanobis distance).
    Multivariate,
    Lof,
    /// Runs the three methods side by side.
    Ensemble,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IsolationForest => "isolation_forest",
            Self::Multivariate => "multivariate",
            Self::Lof => "lof",
            Self::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = AnomalyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "isolation_forest" => Ok(Self::IsolationForest),
            "multivariate" => Ok(Self::Multivariate),
            "lof" => Ok(Self::Lof),
            "ensemble" => Ok(Self::Ensemble),
            other => Err(AnomalyError::Validation(format!(
                "unknown method \"{other}\" (expected isolation_forest, multivariate, lof or ensemble)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityDistribution {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityDistribution {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Per-column statistics of flagged and normal rows, in original units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnStatistics {
    pub mean_anomaly_value: Option<f64>,
    pub median_anomaly_value: Option<f64>,
    pub min_anomaly_value: Option<f64>,
    pub max_anomaly_value: Option<f64>,
    pub normal_mean: Option<f64>,
    pub normal_std: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_estimators: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_neighbors: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyDetail {
    /// Row index in the input table.
    pub index: usize,
    pub values: BTreeMap<String, f64>,
    pub score: f64,
    /// Only isolation forest results carry a severity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub method: Method,
    pub total_records: usize,
    /// Full count, independent of the `anomaly_details` cap.
    pub total_anomalies: usize,
    /// Rounded to two decimals.
    pub anomaly_percentage: f64,
    pub contamination: f64,
    pub columns_analyzed: Vec<String>,
    pub model_parameters: ModelParameters,
    pub column_statistics: BTreeMap<String, ColumnStatistics>,
    pub severity_distribution: SeverityDistribution,
    /// First flagged rows in input order, capped.
    pub anomaly_details: Vec<AnomalyDetail>,
}

/// Side-by-side results of every method. A method that failed is `None`
/// with its error message alongside.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleReport {
    pub method: Method,
    pub methods_used: Vec<Method>,
    pub isolation_forest: AnomalyReport,
    pub multivariate: Option<AnomalyReport>,
    pub lof: Option<AnomalyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multivariate_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lof_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectionOutcome {
    Single(AnomalyReport),
    Ensemble(Box<EnsembleReport>),
}

impl DetectionOutcome {
    /// The isolation forest report for ensembles, otherwise the single report.
    #[must_use]
    pub fn primary(&self) -> &AnomalyReport {
        match self {
            Self::Single(report) => report,
            Self::Ensemble(ensemble) => &ensemble.isolation_forest,
        }
    }
}
