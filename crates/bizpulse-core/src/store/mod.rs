//! Repository contract the analytical engines read from and write to.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Insight, KpiRecord, NewKpi, NewTextRecord, RawRecord, TextRecord, TrendCandidate, TrendSignal,
};

/// How far back a prior trend row for the same (sector, term) is reused.
pub const TREND_RECENCY_DAYS: i64 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),

    /// A row violated a schema constraint (empty key, non-finite value).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Stored data could not be decoded into a domain type.
    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("store state unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Result of a trend batch write: one entry per input row, in input order.
pub type TrendBatchResult = Vec<Result<UpsertOutcome, StoreError>>;

/// Range queries and identity-keyed upserts over every artifact the
/// pipeline produces.
///
/// Every write is atomic: a failed write leaves no partial row behind.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Client ids with raw, text or KPI rows newer than `since`, ascending.
    async fn list_active_clients(&self, since: DateTime<Utc>) -> Result<Vec<i64>, StoreError>;

    /// Distinct non-empty sectors present on text records, ascending.
    async fn list_sectors(&self) -> Result<Vec<String>, StoreError>;

    /// Raw records with `created_at` in `[from, to]`, oldest first.
    async fn list_raw_records(
        &self,
        client_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Raw records carrying text that have not been analysed yet, newest first.
    async fn list_pending_text_sources(
        &self,
        client_id: i64,
        limit: i64,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Insert a text record, overwriting the derived fields of an existing
    /// record for the same `source_record_id`.
    async fn insert_text_record(&self, record: &NewTextRecord) -> Result<UpsertOutcome, StoreError>;

    /// Text records created at or after `since`, newest first.
    async fn list_text_records(
        &self,
        client_id: Option<i64>,
        sector: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<TextRecord>, StoreError>;

    /// Upsert keyed by (client, name, period start, period end).
    async fn upsert_kpi(&self, kpi: &NewKpi) -> Result<UpsertOutcome, StoreError>;

    /// KPIs calculated at or after `since`, newest first.
    async fn list_kpis(
        &self,
        client_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<KpiRecord>, StoreError>;

    /// Upsert each row keyed by (sector, term) among rows detected at or
    /// after `recency_cutoff`.
    ///
    /// A failing row does not stop the rest of the batch. The outer `Err`
    /// is reserved for failures that affect the whole batch.
    async fn upsert_trend_signals(
        &self,
        rows: &[TrendCandidate],
        recency_cutoff: DateTime<Utc>,
    ) -> Result<TrendBatchResult, StoreError>;

    /// Trend signals detected at or after `since`, most frequent first.
    async fn list_trend_signals(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrendSignal>, StoreError>;

    /// Upsert keyed by (client, calendar day of `generated_at`). Returns the row id.
    async fn upsert_insight(&self, insight: &Insight) -> Result<(UpsertOutcome, i64), StoreError>;
}
