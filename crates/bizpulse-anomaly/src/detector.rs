use std::collections::BTreeMap;

use crate::envelope::envelope_scores;
use crate::error::AnomalyError;
use crate::isolation::{IsolationForest, IsolationForestParams};
use crate::lof::lof_scores;
use crate::report::{
    AnomalyDetail, AnomalyReport, ColumnStatistics, DetectionOutcome, EnsembleReport, Method,
    ModelParameters, Severity, SeverityDistribution,
};
use crate::scaler::StandardScaler;
use crate::stats::{mean, median, percentile, sample_std};
use crate::table::{Dataset, Table};

/// Minimum clean rows for any method.
pub const MIN_ROWS: usize = 10;

/// `anomaly_details` holds at most this many rows.
pub const MAX_DETAILS: usize = 100;

pub const DEFAULT_CONTAMINATION: f64 = 0.1;

/// Multi-method outlier detector over selected numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyDetector {
    pub n_estimators: usize,
    pub n_neighbors: usize,
    pub seed: u64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            n_neighbors: 20,
            seed: 42,
        }
    }
}

/// Scores from one method, lower meaning more anomalous.
struct Scored {
    method: Method,
    scores: Vec<f64>,
    params: ModelParameters,
}

impl AnomalyDetector {
    /// Run `method` over `columns` of `table`.
    ///
    /// In ensemble mode only the isolation forest is required; a failure of
    /// the envelope or LOF method is reported in the ensemble instead.
    ///
    /// # Errors
    ///
    /// Returns [`AnomalyError::Validation`] when contamination is outside
    /// `(0, 0.5]`, no requested column exists, or too few clean rows remain,
    /// and [`AnomalyError::Numerical`] when a single method cannot be fitted.
    pub fn detect(
        &self,
        table: &Table,
        columns: &[String],
        method: Method,
        contamination: f64,
    ) -> Result<DetectionOutcome, AnomalyError> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(AnomalyError::Validation(format!(
                "contamination must be in (0, 0.5], got {contamination}"
            )));
        }
        if columns.is_empty() {
            return Err(AnomalyError::Validation(
                "at least one column is required".to_string(),
            ));
        }

        let data = table.numeric(columns)?;
        if data.len() < MIN_ROWS {
            return Err(AnomalyError::Validation(format!(
                "at least {MIN_ROWS} valid rows are required, found {}",
                data.len()
            )));
        }

        tracing::debug!(
            method = %method,
            rows = data.len(),
            dropped = table.len() - data.len(),
            columns = ?data.columns,
            "detecting anomalies"
        );

        let scaled = StandardScaler::fit_transform(&data.values);

        if method == Method::Ensemble {
            return self.ensemble(&data, &scaled, contamination);
        }

        let scored = self.score(&data, &scaled, method)?;
        Ok(DetectionOutcome::Single(build_report(
            &data,
            &scored,
            contamination,
        )))
    }

    fn ensemble(
        &self,
        data: &Dataset,
        scaled: &[Vec<f64>],
        contamination: f64,
    ) -> Result<DetectionOutcome, AnomalyError> {
        let forest = self.score(data, scaled, Method::IsolationForest)?;
        let isolation_forest = build_report(data, &forest, contamination);

        let optional = |method: Method| match self.score(data, scaled, method) {
            Ok(scored) => (Some(build_report(data, &scored, contamination)), None),
            Err(e) => {
                tracing::warn!(method = %method, error = %e, "ensemble method failed");
                (None, Some(e.to_string()))
            }
        };
        let (multivariate, multivariate_error) = optional(Method::Multivariate);
        let (lof, lof_error) = optional(Method::Lof);

        let mut methods_used = vec![Method::IsolationForest];
        if multivariate.is_some() {
            methods_used.push(Method::Multivariate);
        }
        if lof.is_some() {
            methods_used.push(Method::Lof);
        }

        Ok(DetectionOutcome::Ensemble(Box::new(EnsembleReport {
            method: Method::Ensemble,
            methods_used,
            isolation_forest,
            multivariate,
            lof,
            multivariate_error,
            lof_error,
        })))
    }

    fn score(
        &self,
        data: &Dataset,
        scaled: &[Vec<f64>],
        method: Method,
    ) -> Result<Scored, AnomalyError> {
        match method {
            Method::IsolationForest => {
                let forest = IsolationForest::fit(
                    scaled,
                    IsolationForestParams {
                        n_estimators: self.n_estimators,
                        seed: self.seed,
                    },
                );
                Ok(Scored {
                    method,
                    scores: forest.score_samples(scaled),
                    params: ModelParameters {
                        n_estimators: Some(self.n_estimators),
                        max_samples: Some(forest.max_samples()),
                        n_neighbors: None,
                    },
                })
            }
            Method::Multivariate => Ok(Scored {
                method,
                scores: envelope_scores(scaled)?,
                params: ModelParameters::default(),
            }),
            Method::Lof => {
                if data.len() < self.n_neighbors {
                    return Err(AnomalyError::Validation(format!(
                        "lof needs at least {} valid rows, found {}",
                        self.n_neighbors,
                        data.len()
                    )));
                }
                Ok(Scored {
                    method,
                    scores: lof_scores(scaled, self.n_neighbors),
                    params: ModelParameters {
                        n_neighbors: Some(self.n_neighbors),
                        ..ModelParameters::default()
                    },
                })
            }
            Method::Ensemble => Err(AnomalyError::Validation(
                "ensemble cannot be scored as a single method".to_string(),
            )),
        }
    }
}

/// Score quartiles used to band flagged rows.
struct Quartiles {
    q25: f64,
    q50: f64,
    q75: f64,
}

impl Quartiles {
    fn of(scores: &[f64]) -> Option<Self> {
        Some(Self {
            q25: percentile(scores, 25.0)?,
            q50: percentile(scores, 50.0)?,
            q75: percentile(scores, 75.0)?,
        })
    }

    fn band(&self, score: f64) -> Severity {
        if score <= self.q25 {
            Severity::Critical
        } else if score <= self.q50 {
            Severity::High
        } else if score <= self.q75 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn build_report(data: &Dataset, scored: &Scored, contamination: f64) -> AnomalyReport {
    let threshold = percentile(&scored.scores, 100.0 * contamination).unwrap_or(f64::NEG_INFINITY);
    let flagged: Vec<usize> = scored
        .scores
        .iter()
        .enumerate()
        .filter(|(_, s)| **s < threshold)
        .map(|(i, _)| i)
        .collect();

    let quartiles = if scored.method == Method::IsolationForest {
        Quartiles::of(&scored.scores)
    } else {
        None
    };

    let mut severity_distribution = SeverityDistribution::default();
    let mut anomaly_details = Vec::with_capacity(flagged.len().min(MAX_DETAILS));
    for (n, &row) in flagged.iter().enumerate() {
        let score = scored.scores[row];
        let severity = quartiles.as_ref().map(|q| q.band(score));
        if let Some(severity) = severity {
            severity_distribution.record(severity);
        }
        if n < MAX_DETAILS {
            anomaly_details.push(AnomalyDetail {
                index: data.index[row],
                values: data
                    .columns
                    .iter()
                    .cloned()
                    .zip(data.values[row].iter().copied())
                    .collect(),
                score,
                severity,
            });
        }
    }

    let total = data.len();
    let percentage = flagged.len() as f64 / total as f64 * 100.0;

    AnomalyReport {
        method: scored.method,
        total_records: total,
        total_anomalies: flagged.len(),
        anomaly_percentage: (percentage * 100.0).round() / 100.0,
        contamination,
        columns_analyzed: data.columns.clone(),
        model_parameters: scored.params,
        column_statistics: column_statistics(data, &flagged),
        severity_distribution,
        anomaly_details,
    }
}

fn column_statistics(data: &Dataset, flagged: &[usize]) -> BTreeMap<String, ColumnStatistics> {
    let mut is_flagged = vec![false; data.len()];
    for &row in flagged {
        if let Some(slot) = is_flagged.get_mut(row) {
            *slot = true;
        }
    }

    data.columns
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let mut anomalous = Vec::with_capacity(flagged.len());
            let mut normal = Vec::with_capacity(data.len().saturating_sub(flagged.len()));
            for (value, flag) in data.column(c).into_iter().zip(&is_flagged) {
                if *flag {
                    anomalous.push(value);
                } else {
                    normal.push(value);
                }
            }

            let stats = ColumnStatistics {
                mean_anomaly_value: mean(&anomalous),
                median_anomaly_value: median(&anomalous),
                min_anomaly_value: anomalous.iter().copied().reduce(f64::min),
                max_anomaly_value: anomalous.iter().copied().reduce(f64::max),
                normal_mean: mean(&normal),
                normal_std: sample_std(&normal),
            };
            (name.clone(), stats)
        })
        .collect()
}

/// Parse `method` by name and run the default detector.
///
/// # Errors
///
/// Returns [`AnomalyError::Validation`] for an unknown method name, plus
/// everything [`AnomalyDetector::detect`] returns.
pub fn detect_anomalies(
    table: &Table,
    columns: &[String],
    method: &str,
    contamination: f64,
) -> Result<DetectionOutcome, AnomalyError> {
    let method: Method = method.parse()?;
    AnomalyDetector::default().detect(table, columns, method, contamination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_statistics_split_flagged_and_normal_rows() {
        let data = Dataset {
            columns: vec!["amount".to_string()],
            index: vec![0, 1, 2, 3],
            values: vec![vec![1.0], vec![3.0], vec![100.0], vec![200.0]],
        };
        let stats = column_statistics(&data, &[3, 2]);
        let amount = &stats["amount"];
        assert_eq!(amount.mean_anomaly_value, Some(150.0));
        assert_eq!(amount.min_anomaly_value, Some(100.0));
        assert_eq!(amount.max_anomaly_value, Some(200.0));
        assert_eq!(amount.normal_mean, Some(2.0));
    }

    #[test]
    fn quartile_bands_follow_score_order() {
        let scores: Vec<f64> = (0..8).map(f64::from).collect();
        let q = Quartiles::of(&scores).unwrap();
        assert_eq!(q.band(0.0), Severity::Critical);
        assert_eq!(q.band(3.0), Severity::High);
        assert_eq!(q.band(5.0), Severity::Medium);
        assert_eq!(q.band(7.0), Severity::Low);
    }

    #[test]
    fn ensemble_is_not_a_single_method() {
        let data = Dataset {
            columns: vec!["a".to_string()],
            index: vec![0],
            values: vec![vec![1.0]],
        };
        let err = AnomalyDetector::default()
            .score(&data, &data.values, Method::Ensemble)
            .err()
            .unwrap();
        assert!(matches!(err, AnomalyError::Validation(_)));
    }
}
