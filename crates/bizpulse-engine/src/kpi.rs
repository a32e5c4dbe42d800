//! Numeric KPIs over one client's raw records for a period.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bizpulse_anomaly::stats::{mean, median, sample_std};
use bizpulse_core::{Clock, NewKpi, RawRecord, RecordStore};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::EngineError;
use crate::ClientStatus;

/// Fields treated as a transaction amount, first present wins.
pub const AMOUNT_FIELD_CANDIDATES: &[&str] = &["amount", "sales", "value", "total", "price"];

/// Fields treated as the sold item, first present wins.
pub const ITEM_FIELD_CANDIDATES: &[&str] = &["item", "product", "product_name", "name"];

const TOP_ITEMS: usize = 3;

/// Record fields never summarised as numeric columns.
const EXCLUDED_NUMERIC_FIELDS: &[&str] = &["id"];

pub type KpiMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub client_id: i64,
    pub kpis_calculated: usize,
    pub kpis_persisted: usize,
    /// Finite KPIs whose write failed.
    pub kpis_failed: usize,
    pub status: ClientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// First candidate field present on any record.
#[must_use]
pub fn first_present<'a>(records: &[RawRecord], candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|field| records.iter().any(|r| r.data.contains_key(*field)))
}

/// Lenient numeric coercion: numbers and numeric strings.
fn coerce_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Compute every KPI the records support. An empty slice yields an empty map.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_from_records(records: &[RawRecord]) -> KpiMap {
    let mut kpis = KpiMap::new();
    if records.is_empty() {
        return kpis;
    }

    kpis.insert("total_records".to_string(), records.len() as f64);

    let amount_field = first_present(records, AMOUNT_FIELD_CANDIDATES);
    if let Some(field) = amount_field {
        let amounts: Vec<f64> = records
            .iter()
            .filter_map(|r| r.data.get(field).and_then(coerce_number))
            .collect();
        kpis.insert("total_sales".to_string(), amounts.iter().sum());
        if let Some(avg) = mean(&amounts) {
            kpis.insert("avg_ticket".to_string(), avg);
        }
        if let Some(max) = amounts.iter().copied().reduce(f64::max) {
            kpis.insert("max_transaction".to_string(), max);
        }
        if let Some(min) = amounts.iter().copied().reduce(f64::min) {
            kpis.insert("min_transaction".to_string(), min);
        }
        if let Some(growth) = month_over_month(records, field) {
            kpis.insert("sales_mom".to_string(), growth);
        }
    }

    let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *by_source.entry(record.source_type.as_str()).or_default() += 1;
    }
    for (source, count) in by_source {
        kpis.insert(format!("count_{source}"), count as f64);
    }

    if let Some(field) = first_present(records, ITEM_FIELD_CANDIDATES) {
        let top = top_items(records, field);
        let top_total: usize = top.iter().map(|(_, count)| count).sum();
        kpis.insert(
            "items_top3_share".to_string(),
            top_total as f64 / records.len() as f64 * 100.0,
        );
        for (rank, (item, count)) in top.iter().enumerate() {
            tracing::debug!(rank = rank + 1, item = %item, count, "top item");
            kpis.insert(format!("top{}_count", rank + 1), *count as f64);
        }
    }

    for (column, values) in numeric_columns(records, amount_field) {
        if let Some(v) = mean(&values) {
            kpis.insert(format!("{column}_mean"), v);
        }
        if let Some(v) = median(&values) {
            kpis.insert(format!("{column}_median"), v);
        }
        if let Some(v) = sample_std(&values) {
            kpis.insert(format!("{column}_std"), v);
        }
    }

    kpis
}

/// Growth of the latest calendar month's amount sum over the previous
/// month's, in percent. `None` with fewer than two months or a zero
/// previous sum.
fn month_over_month(records: &[RawRecord], field: &str) -> Option<f64> {
    let mut monthly: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for record in records {
        let key = (record.created_at.year(), record.created_at.month());
        let amount = record.data.get(field).and_then(coerce_number).unwrap_or(0.0);
        *monthly.entry(key).or_default() += amount;
    }

    let mut sums = monthly.values().rev();
    let current = *sums.next()?;
    let previous = *sums.next()?;
    if previous.abs() < f64::EPSILON {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// The most frequent item values, ties broken by first appearance.
fn top_items(records: &[RawRecord], field: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, record) in records.iter().enumerate() {
        let item = match record.data.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        counts.entry(item).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(item, (count, first))| (item, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(TOP_ITEMS)
        .map(|(item, count, _)| (item, count))
        .collect()
}

/// Columns whose non-null values are all numbers, plus the amount column
/// (coerced leniently).
fn numeric_columns(records: &[RawRecord], amount_field: Option<&str>) -> BTreeMap<String, Vec<f64>> {
    let mut columns: BTreeMap<String, Option<Vec<f64>>> = BTreeMap::new();
    for record in records {
        for (key, value) in &record.data {
            if EXCLUDED_NUMERIC_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let slot = columns.entry(key.clone()).or_insert_with(|| Some(Vec::new()));
            let Some(values) = slot.as_mut() else { continue };

            if Some(key.as_str()) == amount_field {
                if let Some(v) = coerce_number(value) {
                    values.push(v);
                }
                continue;
            }
            match value {
                Value::Null => {}
                Value::Number(n) => match n.as_f64().filter(|v| v.is_finite()) {
                    Some(v) => values.push(v),
                    None => *slot = None,
                },
                _ => *slot = None,
            }
        }
    }

    columns
        .into_iter()
        .filter_map(|(key, values)| values.filter(|v| !v.is_empty()).map(|v| (key, v)))
        .collect()
}

/// Computes KPIs from the record store and upserts them.
#[derive(Clone)]
pub struct KpiEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl KpiEngine {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// KPIs for `client_id` over `[period_start, period_end]`.
    ///
    /// No records in the period is not an error: the map is empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if the period is inverted, or
    /// [`EngineError::Store`] if the records cannot be read.
    pub async fn compute(
        &self,
        client_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<KpiMap, EngineError> {
        if period_start > period_end {
            return Err(EngineError::Validation(format!(
                "period start {period_start} is after period end {period_end}"
            )));
        }

        let records = self
            .store
            .list_raw_records(client_id, period_start, period_end)
            .await?;
        if records.is_empty() {
            tracing::warn!(client_id, %period_start, %period_end, "no records in period");
            return Ok(KpiMap::new());
        }

        let kpis = compute_from_records(&records);
        tracing::info!(
            client_id,
            records = records.len(),
            kpis = kpis.len(),
            "computed kpis"
        );
        Ok(kpis)
    }

    /// Upsert one KPI keyed by (client, name, period). Returns `false` on
    /// any store failure; the failed write leaves no row behind.
    pub async fn persist(
        &self,
        client_id: i64,
        kpi_name: &str,
        kpi_value: f64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> bool {
        let kpi = NewKpi {
            client_id,
            kpi_name: kpi_name.to_string(),
            kpi_value,
            period_start,
            period_end,
            calculated_at: self.clock.now(),
        };
        match self.store.upsert_kpi(&kpi).await {
            Ok(outcome) => {
                tracing::debug!(client_id, kpi = kpi_name, kpi_value, ?outcome, "kpi persisted");
                true
            }
            Err(e) => {
                tracing::error!(client_id, kpi = kpi_name, error = %e, "failed to persist kpi");
                false
            }
        }
    }

    /// Compute and persist every finite KPI for the period.
    pub async fn compute_and_persist(
        &self,
        client_id: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> KpiSummary {
        let kpis = match self.compute(client_id, period_start, period_end).await {
            Ok(kpis) => kpis,
            Err(e) => {
                tracing::error!(client_id, error = %e, "kpi computation failed");
                return KpiSummary {
                    client_id,
                    kpis_calculated: 0,
                    kpis_persisted: 0,
                    kpis_failed: 0,
                    status: ClientStatus::Error,
                    error: Some(e.to_string()),
                };
            }
        };

        if kpis.is_empty() {
            return KpiSummary {
                client_id,
                kpis_calculated: 0,
                kpis_persisted: 0,
                kpis_failed: 0,
                status: ClientStatus::NoData,
                error: None,
            };
        }

        let (mut persisted, mut failed) = (0, 0);
        for (name, value) in &kpis {
            if !value.is_finite() {
                tracing::debug!(client_id, kpi = %name, "skipping non-finite kpi");
                continue;
            }
            if self
                .persist(client_id, name, *value, period_start, period_end)
                .await
            {
                persisted += 1;
            } else {
                failed += 1;
            }
        }

        if failed > 0 {
            tracing::warn!(
                client_id,
                persisted,
                failed,
                calculated = kpis.len(),
                "some kpis failed to persist"
            );
        } else {
            tracing::info!(client_id, persisted, calculated = kpis.len(), "kpis saved");
        }
        KpiSummary {
            client_id,
            kpis_calculated: kpis.len(),
            kpis_persisted: persisted,
            kpis_failed: failed,
            status: ClientStatus::Success,
            error: None,
        }
    }
}
