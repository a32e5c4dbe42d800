//! Windowed term-frequency trends over text record keywords.
//!
//! Keyword frequencies in the short window are compared with the long
//! window that contains it, each normalised by its record count. Terms
//! whose relative change crosses the rising or falling threshold become
//! trend candidates; stable terms are dropped unless configured otherwise.

use std::collections::HashMap;
use std::sync::Arc;

use bizpulse_core::store::TREND_RECENCY_DAYS;
use bizpulse_core::{AppConfig, Clock, RecordStore, TextRecord, TrendCandidate, TrendStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::EngineError;

/// Sector label used when no sector is given.
pub const GENERAL_SECTOR: &str = "general";

/// Terms seen fewer times than this in the long window are noise.
pub const NOISE_FLOOR: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendConfig {
    pub window_short_days: i64,
    pub window_long_days: i64,
    /// Also return and persist stable terms.
    pub keep_stable: bool,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_short_days: 7,
            window_long_days: 30,
            keep_stable: false,
        }
    }
}

impl TrendConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            window_short_days: config.trend_window_short_days,
            window_long_days: config.trend_window_long_days,
            keep_stable: config.trend_keep_stable,
        }
    }
}

fn validate_windows(window_short_days: i64, window_long_days: i64) -> Result<(), EngineError> {
    if window_short_days <= 0 || window_short_days >= window_long_days {
        return Err(EngineError::Validation(format!(
            "trend windows must satisfy 0 < short < long, got short={window_short_days} long={window_long_days}"
        )));
    }
    Ok(())
}

/// Relative change of the short-window frequency over the long-window one,
/// in percent. A term absent from the long window scores 100 when present
/// in the short window and 0 otherwise.
#[must_use]
pub fn delta_pct(freq_short: f64, freq_long: f64) -> f64 {
    if freq_long <= 0.0 {
        return if freq_short > 0.0 { 100.0 } else { 0.0 };
    }
    (freq_short - freq_long) / freq_long * 100.0
}

fn count_terms<'a>(records: impl Iterator<Item = &'a TextRecord>) -> HashMap<String, i64> {
    let mut counts = HashMap::new();
    for record in records {
        for keyword in &record.keywords {
            let term = keyword.trim().to_lowercase();
            if !term.is_empty() {
                *counts.entry(term).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Score every term in `records` against the windows ending at `now`.
///
/// Candidates come back ordered by `|delta_pct|` descending, then by term.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_terms(
    records: &[TextRecord],
    sector: &str,
    now: DateTime<Utc>,
    window_short_days: i64,
    window_long_days: i64,
    keep_stable: bool,
) -> Vec<TrendCandidate> {
    let long_start = now - Duration::days(window_long_days);
    let short_start = now - Duration::days(window_short_days);

    let long: Vec<&TextRecord> = records
        .iter()
        .filter(|r| r.created_at >= long_start && r.created_at <= now)
        .collect();
    let short: Vec<&TextRecord> = long
        .iter()
        .copied()
        .filter(|r| r.created_at >= short_start)
        .collect();

    let long_counts = count_terms(long.iter().copied());
    let short_counts = count_terms(short.iter().copied());
    let records_long = long.len().max(1) as f64;
    let records_short = short.len().max(1) as f64;

    let mut candidates: Vec<TrendCandidate> = long_counts
        .into_iter()
        .filter(|(_, freq_long)| *freq_long >= NOISE_FLOOR)
        .filter_map(|(term, freq_long)| {
            let freq_short = short_counts.get(&term).copied().unwrap_or(0);
            let delta = delta_pct(
                freq_short as f64 / records_short,
                freq_long as f64 / records_long,
            );
            let status = TrendStatus::classify(delta);
            if !status.is_significant() && !keep_stable {
                return None;
            }
            Some(TrendCandidate {
                sector: sector.to_string(),
                term,
                frequency: freq_long,
                freq_short,
                freq_long,
                delta_pct: delta,
                status,
                period_start: long_start,
                period_end: now,
                detected_at: now,
                metadata: json!({
                    "method": "windowed_delta",
                    "freq_short": freq_short,
                    "freq_long": freq_long,
                    "records_short": short.len(),
                    "records_long": long.len(),
                    "window_short_days": window_short_days,
                    "window_long_days": window_long_days,
                }),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.delta_pct
            .abs()
            .total_cmp(&a.delta_pct.abs())
            .then_with(|| a.term.cmp(&b.term))
    });
    candidates
}

/// Result of one sector's detect-and-persist pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectorOutcome {
    pub sector: String,
    pub detected: usize,
    pub persisted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrendSweep {
    pub sectors: Vec<SectorOutcome>,
    /// Set when the sweep could not start at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrendSweep {
    #[must_use]
    pub fn failed(error: String) -> Self {
        Self {
            sectors: Vec::new(),
            error: Some(error),
        }
    }

    #[must_use]
    pub fn detected(&self) -> usize {
        self.sectors.iter().map(|s| s.detected).sum()
    }

    #[must_use]
    pub fn persisted(&self) -> usize {
        self.sectors.iter().map(|s| s.persisted).sum()
    }

    #[must_use]
    pub fn failed_sectors(&self) -> usize {
        self.sectors.iter().filter(|s| s.error.is_some()).count()
    }
}

#[derive(Clone)]
pub struct TrendEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: TrendConfig,
}

impl TrendEngine {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: TrendConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> TrendConfig {
        self.config
    }

    /// Trend candidates for `sector` (all text records when `None` or
    /// [`GENERAL_SECTOR`]), most significant first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] unless `0 < short < long`, or
    /// [`EngineError::Store`] if text records cannot be read.
    pub async fn detect(
        &self,
        sector: Option<&str>,
        window_short_days: i64,
        window_long_days: i64,
    ) -> Result<Vec<TrendCandidate>, EngineError> {
        validate_windows(window_short_days, window_long_days)?;
        let sector = sector.filter(|s| *s != GENERAL_SECTOR);

        let now = self.clock.now();
        let records = self
            .store
            .list_text_records(None, sector, now - Duration::days(window_long_days))
            .await?;
        let label = sector.unwrap_or(GENERAL_SECTOR);

        let candidates = score_terms(
            &records,
            label,
            now,
            window_short_days,
            window_long_days,
            self.config.keep_stable,
        );
        tracing::info!(
            sector = label,
            records = records.len(),
            candidates = candidates.len(),
            "trend detection finished"
        );
        Ok(candidates)
    }

    /// Upsert `rows`, reusing rows for the same (sector, term) detected within
    /// the recency horizon. Failing rows are logged and skipped. Returns the
    /// number of rows written.
    pub async fn persist(&self, rows: &[TrendCandidate]) -> usize {
        if rows.is_empty() {
            tracing::debug!("no trend rows to persist");
            return 0;
        }

        let cutoff = self.clock.now() - Duration::days(TREND_RECENCY_DAYS);
        let results = match self.store.upsert_trend_signals(rows, cutoff).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(rows = rows.len(), error = %e, "trend batch failed");
                return 0;
            }
        };

        let mut persisted = 0;
        for (row, result) in rows.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    persisted += 1;
                    tracing::debug!(sector = %row.sector, term = %row.term, ?outcome, "trend persisted");
                }
                Err(e) => {
                    tracing::warn!(
                        sector = %row.sector,
                        term = %row.term,
                        error = %e,
                        "failed to persist trend"
                    );
                }
            }
        }

        tracing::info!(persisted, total = rows.len(), "trends persisted");
        persisted
    }

    /// Detect and persist trends in one [`GENERAL_SECTOR`] pass over all text
    /// records, then once per named sector. A failing sector is recorded and
    /// the sweep continues.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the configured windows are invalid or the
    /// sector list cannot be read.
    pub async fn detect_and_persist_all(&self) -> Result<TrendSweep, EngineError> {
        let TrendConfig {
            window_short_days,
            window_long_days,
            ..
        } = self.config;
        validate_windows(window_short_days, window_long_days)?;

        let sectors = self.store.list_sectors().await?;
        let targets: Vec<Option<&str>> = std::iter::once(None)
            .chain(
                sectors
                    .iter()
                    .map(String::as_str)
                    .filter(|s| *s != GENERAL_SECTOR)
                    .map(Some),
            )
            .collect();

        let mut sweep = TrendSweep::default();
        for sector in targets {
            let label = sector.unwrap_or(GENERAL_SECTOR).to_string();
            match self.detect(sector, window_short_days, window_long_days).await {
                Ok(candidates) => {
                    let persisted = self.persist(&candidates).await;
                    sweep.sectors.push(SectorOutcome {
                        sector: label,
                        detected: candidates.len(),
                        persisted,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!(sector = %label, error = %e, "trend detection failed");
                    sweep.sectors.push(SectorOutcome {
                        sector: label,
                        detected: 0,
                        persisted: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(sweep)
    }
}
