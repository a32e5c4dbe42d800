//! In-process [`RecordStore`] with the same identity keys and row
//! constraints as the Postgres schema.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{RecordStore, StoreError, TrendBatchResult, UpsertOutcome};
use crate::types::{
    Insight, KpiRecord, NewKpi, NewTextRecord, RawRecord, TextRecord, TrendCandidate, TrendSignal,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    inactive_clients: HashSet<i64>,
    raw_records: Vec<RawRecord>,
    text_records: Vec<TextRecord>,
    kpis: Vec<KpiRecord>,
    trends: Vec<TrendSignal>,
    insights: Vec<Insight>,
    fail_writes: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Database("writes are disabled".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Add a raw record. Non-object `data` is stored as an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn push_raw_record(
        &self,
        client_id: i64,
        source_type: &str,
        data: Value,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let mut state = self.lock()?;
        let id = state.next_id();
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        state.raw_records.push(RawRecord {
            id,
            client_id,
            source_type: source_type.to_string(),
            data,
            created_at,
        });
        Ok(id)
    }

    /// Exclude a client from [`RecordStore::list_active_clients`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn deactivate_client(&self, client_id: i64) -> Result<(), StoreError> {
        self.lock()?.inactive_clients.insert(client_id);
        Ok(())
    }

    /// Make every subsequent write fail with [`StoreError::Database`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn set_fail_writes(&self, fail: bool) -> Result<(), StoreError> {
        self.lock()?.fail_writes = fail;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn text_records(&self) -> Result<Vec<TextRecord>, StoreError> {
        Ok(self.lock()?.text_records.clone())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn kpis(&self) -> Result<Vec<KpiRecord>, StoreError> {
        Ok(self.lock()?.kpis.clone())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn trend_signals(&self) -> Result<Vec<TrendSignal>, StoreError> {
        Ok(self.lock()?.trends.clone())
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the state lock is poisoned.
    pub fn insights(&self) -> Result<Vec<Insight>, StoreError> {
        Ok(self.lock()?.insights.clone())
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), StoreError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::Constraint(format!("{field} must be finite")))
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        Err(StoreError::Constraint(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn upsert_trend_row(
    state: &mut State,
    row: &TrendCandidate,
    recency_cutoff: DateTime<Utc>,
) -> Result<UpsertOutcome, StoreError> {
    require_non_empty("term", &row.term)?;
    require_non_empty("sector", &row.sector)?;
    require_finite("delta_pct", row.delta_pct)?;

    let existing = state
        .trends
        .iter_mut()
        .filter(|t| t.sector == row.sector && t.term == row.term && t.detected_at >= recency_cutoff)
        .max_by_key(|t| t.detected_at);

    if let Some(signal) = existing {
        signal.frequency = row.frequency;
        signal.delta_pct = row.delta_pct;
        signal.status = row.status;
        signal.metadata = row.metadata.clone();
        signal.period_start = row.period_start;
        signal.period_end = row.period_end;
        signal.updated_at = row.detected_at;
        return Ok(UpsertOutcome::Updated);
    }

    let id = state.next_id();
    state.trends.push(TrendSignal {
        id,
        sector: row.sector.clone(),
        term: row.term.clone(),
        frequency: row.frequency,
        delta_pct: row.delta_pct,
        status: row.status,
        period_start: row.period_start,
        period_end: row.period_end,
        metadata: row.metadata.clone(),
        detected_at: row.detected_at,
        updated_at: row.detected_at,
    });
    Ok(UpsertOutcome::Inserted)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_active_clients(&self, since: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let state = self.lock()?;
        let mut ids: Vec<i64> = state
            .raw_records
            .iter()
            .filter(|r| r.created_at > since)
            .map(|r| r.client_id)
            .chain(
                state
                    .text_records
                    .iter()
                    .filter(|r| r.created_at > since)
                    .map(|r| r.client_id),
            )
            .chain(
                state
                    .kpis
                    .iter()
                    .filter(|k| k.calculated_at > since)
                    .map(|k| k.client_id),
            )
            .filter(|id| !state.inactive_clients.contains(id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn list_sectors(&self) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        let mut sectors: Vec<String> = state
            .text_records
            .iter()
            .filter_map(|r| r.sector.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        sectors.sort();
        sectors.dedup();
        Ok(sectors)
    }

    async fn list_raw_records(
        &self,
        client_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<RawRecord> = state
            .raw_records
            .iter()
            .filter(|r| r.client_id == client_id && r.created_at >= from && r.created_at <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn list_pending_text_sources(
        &self,
        client_id: i64,
        limit: i64,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let state = self.lock()?;
        let analysed: HashSet<i64> = state
            .text_records
            .iter()
            .filter_map(|t| t.source_record_id)
            .collect();
        let mut rows: Vec<RawRecord> = state
            .raw_records
            .iter()
            .filter(|r| r.client_id == client_id)
            .filter(|r| !analysed.contains(&r.id) && r.text_field().is_some())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn insert_text_record(&self, record: &NewTextRecord) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.lock()?;
        state.check_writable()?;
        require_finite("polarity", record.sentiment.polarity)?;
        if !(-1.0..=1.0).contains(&record.sentiment.polarity) {
            return Err(StoreError::Constraint(
                "polarity must be within [-1, 1]".to_string(),
            ));
        }

        if let Some(source_id) = record.source_record_id {
            if let Some(existing) = state
                .text_records
                .iter_mut()
                .find(|t| t.source_record_id == Some(source_id))
            {
                existing.raw_text.clone_from(&record.raw_text);
                existing.sentiment_label = record.sentiment.label;
                existing.polarity = record.sentiment.polarity;
                existing.keywords.clone_from(&record.keywords);
                existing.sector.clone_from(&record.sector);
                return Ok(UpsertOutcome::Updated);
            }
        }

        let id = state.next_id();
        state.text_records.push(TextRecord {
            id,
            client_id: record.client_id,
            source_record_id: record.source_record_id,
            raw_text: record.raw_text.clone(),
            sentiment_label: record.sentiment.label,
            polarity: record.sentiment.polarity,
            keywords: record.keywords.clone(),
            sector: record.sector.clone(),
            created_at: record.created_at,
        });
        Ok(UpsertOutcome::Inserted)
    }

    async fn list_text_records(
        &self,
        client_id: Option<i64>,
        sector: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<TextRecord>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<TextRecord> = state
            .text_records
            .iter()
            .filter(|r| client_id.is_none_or(|id| r.client_id == id))
            .filter(|r| sector.is_none_or(|s| r.sector.as_deref() == Some(s)))
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn upsert_kpi(&self, kpi: &NewKpi) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.lock()?;
        state.check_writable()?;
        require_non_empty("kpi_name", &kpi.kpi_name)?;
        require_finite("kpi_value", kpi.kpi_value)?;

        if let Some(existing) = state.kpis.iter_mut().find(|k| {
            k.client_id == kpi.client_id
                && k.kpi_name == kpi.kpi_name
                && k.period_start == kpi.period_start
                && k.period_end == kpi.period_end
        }) {
            existing.kpi_value = kpi.kpi_value;
            existing.calculated_at = kpi.calculated_at;
            return Ok(UpsertOutcome::Updated);
        }

        let id = state.next_id();
        state.kpis.push(KpiRecord {
            id,
            client_id: kpi.client_id,
            kpi_name: kpi.kpi_name.clone(),
            kpi_value: kpi.kpi_value,
            period_start: kpi.period_start,
            period_end: kpi.period_end,
            calculated_at: kpi.calculated_at,
        });
        Ok(UpsertOutcome::Inserted)
    }

    async fn list_kpis(
        &self,
        client_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<KpiRecord>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<KpiRecord> = state
            .kpis
            .iter()
            .filter(|k| k.client_id == client_id && k.calculated_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.calculated_at
                .cmp(&a.calculated_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn upsert_trend_signals(
        &self,
        rows: &[TrendCandidate],
        recency_cutoff: DateTime<Utc>,
    ) -> Result<TrendBatchResult, StoreError> {
        let mut state = self.lock()?;
        state.check_writable()?;
        Ok(rows
            .iter()
            .map(|row| upsert_trend_row(&mut state, row, recency_cutoff))
            .collect())
    }

    async fn list_trend_signals(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrendSignal>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<TrendSignal> = state
            .trends
            .iter()
            .filter(|t| t.detected_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.term.cmp(&b.term)));
        rows.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn upsert_insight(&self, insight: &Insight) -> Result<(UpsertOutcome, i64), StoreError> {
        let mut state = self.lock()?;
        state.check_writable()?;
        require_non_empty("summary_text", &insight.summary_text)?;

        let day = insight.generated_at.date_naive();
        if let Some(existing) = state
            .insights
            .iter_mut()
            .find(|i| i.client_id == insight.client_id && i.generated_at.date_naive() == day)
        {
            let id = existing.id.unwrap_or_default();
            *existing = Insight {
                id: Some(id),
                ..insight.clone()
            };
            return Ok((UpsertOutcome::Updated, id));
        }

        let id = state.next_id();
        state.insights.push(Insight {
            id: Some(id),
            ..insight.clone()
        });
        Ok((UpsertOutcome::Inserted, id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;
    use crate::types::{SentimentResult, TrendStatus};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn candidate(term: &str, frequency: i64, detected_at: DateTime<Utc>) -> TrendCandidate {
        TrendCandidate {
            sector: "general".to_string(),
            term: term.to_string(),
            frequency,
            freq_short: frequency,
            freq_long: frequency,
            delta_pct: 80.0,
            status: TrendStatus::Emergent,
            period_start: detected_at - Duration::days(30),
            period_end: detected_at,
            detected_at,
            metadata: json!({"method": "windowed"}),
        }
    }

    #[tokio::test]
    async fn kpi_upsert_updates_in_place() {
        let store = MemoryStore::new();
        let mut kpi = NewKpi {
            client_id: 1,
            kpi_name: "total_sales".to_string(),
            kpi_value: 10.0,
            period_start: t0() - Duration::days(30),
            period_end: t0(),
            calculated_at: t0(),
        };
        assert_eq!(store.upsert_kpi(&kpi).await.unwrap(), UpsertOutcome::Inserted);
        kpi.kpi_value = 12.0;
        kpi.calculated_at = t0() + Duration::minutes(5);
        assert_eq!(store.upsert_kpi(&kpi).await.unwrap(), UpsertOutcome::Updated);

        let rows = store.kpis().unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].kpi_value - 12.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].calculated_at, t0() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn kpi_upsert_rejects_non_finite_values() {
        let store = MemoryStore::new();
        let kpi = NewKpi {
            client_id: 1,
            kpi_name: "avg_ticket".to_string(),
            kpi_value: f64::NAN,
            period_start: t0(),
            period_end: t0(),
            calculated_at: t0(),
        };
        assert!(matches!(
            store.upsert_kpi(&kpi).await,
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn trend_batch_reports_per_row_failures() {
        let store = MemoryStore::new();
        let rows = vec![
            candidate("refund", 4, t0()),
            candidate("", 3, t0()),
            candidate("delivery", 2, t0()),
        ];
        let results = store
            .upsert_trend_signals(&rows, t0() - Duration::days(3))
            .await
            .unwrap();
        assert!(matches!(results[0], Ok(UpsertOutcome::Inserted)));
        assert!(matches!(results[1], Err(StoreError::Constraint(_))));
        assert!(matches!(results[2], Ok(UpsertOutcome::Inserted)));
        assert_eq!(store.trend_signals().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn trend_rows_outside_recency_horizon_are_inserted_again() {
        let store = MemoryStore::new();
        let first = t0();
        store
            .upsert_trend_signals(&[candidate("refund", 4, first)], first - Duration::days(3))
            .await
            .unwrap();

        let later = first + Duration::days(5);
        let results = store
            .upsert_trend_signals(&[candidate("refund", 6, later)], later - Duration::days(3))
            .await
            .unwrap();
        assert!(matches!(results[0], Ok(UpsertOutcome::Inserted)));
        assert_eq!(store.trend_signals().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pending_text_sources_skip_analysed_records() {
        let store = MemoryStore::new();
        let analysed = store
            .push_raw_record(1, "review", json!({"text": "great"}), t0())
            .unwrap();
        store
            .push_raw_record(1, "review", json!({"review": "slow"}), t0() + Duration::hours(1))
            .unwrap();
        store
            .push_raw_record(1, "sales", json!({"amount": 10}), t0())
            .unwrap();

        store
            .insert_text_record(&NewTextRecord {
                client_id: 1,
                source_record_id: Some(analysed),
                raw_text: "great".to_string(),
                sentiment: SentimentResult::from_polarity(1.0),
                keywords: vec!["great".to_string()],
                sector: None,
                created_at: t0(),
            })
            .await
            .unwrap();

        let pending = store.list_pending_text_sources(1, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text_field(), Some("slow"));
    }

    #[tokio::test]
    async fn pending_text_sources_skip_non_string_text_values() {
        let store = MemoryStore::new();
        for data in [json!({"text": 123}), json!({"comment": {"body": "x"}})] {
            store.push_raw_record(1, "review", data, t0()).unwrap();
        }
        store
            .push_raw_record(1, "review", json!({"text": 7, "review": "bien"}), t0())
            .unwrap();

        let pending = store.list_pending_text_sources(1, 1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text_field(), Some("bien"));
    }

    #[tokio::test]
    async fn insight_upsert_is_keyed_by_calendar_day() {
        let store = MemoryStore::new();
        let mut insight = Insight {
            id: None,
            client_id: 3,
            summary_text: "first".to_string(),
            key_findings: vec![],
            risk_level: crate::RiskLevel::Low,
            opportunity_level: crate::OpportunityLevel::Low,
            metrics: crate::InsightMetrics::default(),
            generated_at: t0(),
        };
        let (outcome, id) = store.upsert_insight(&insight).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        insight.summary_text = "second".to_string();
        insight.generated_at = t0() + Duration::hours(6);
        let (outcome, same_id) = store.upsert_insight(&insight).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(id, same_id);

        let rows = store.insights().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].summary_text, "second");
    }

    #[tokio::test]
    async fn active_clients_respect_cutoff_and_deactivation() {
        let store = MemoryStore::new();
        store.push_raw_record(1, "sales", json!({}), t0()).unwrap();
        store
            .push_raw_record(2, "sales", json!({}), t0() - Duration::days(30))
            .unwrap();
        store.push_raw_record(3, "sales", json!({}), t0()).unwrap();
        store.deactivate_client(3).unwrap();

        let active = store
            .list_active_clients(t0() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(active, vec![1]);
    }

    #[tokio::test]
    async fn failing_writes_surface_as_database_errors() {
        let store = MemoryStore::new();
        store.set_fail_writes(true).unwrap();
        let result = store
            .upsert_trend_signals(&[candidate("refund", 4, t0())], t0())
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
