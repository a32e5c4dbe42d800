//! [`RecordStore`] over a Postgres pool.

use async_trait::async_trait;
use bizpulse_core::store::TrendBatchResult;
use bizpulse_core::{
    Insight, KpiRecord, NewKpi, NewTextRecord, RawRecord, RecordStore, StoreError, TextRecord,
    TrendCandidate, TrendSignal, UpsertOutcome,
};
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Sqlx(sqlx::Error::Database(db_err))
                if matches!(
                    db_err.kind(),
                    ErrorKind::CheckViolation
                        | ErrorKind::NotNullViolation
                        | ErrorKind::ForeignKeyViolation
                        | ErrorKind::UniqueViolation
                ) =>
            {
                StoreError::Constraint(db_err.to_string())
            }
            DbError::Decode(msg) => StoreError::Decode(msg),
            other => StoreError::Database(other.to_string()),
        }
    }
}

fn outcome(inserted: bool) -> UpsertOutcome {
    if inserted {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::Updated
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn list_active_clients(&self, since: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        Ok(crate::list_active_clients(&self.pool, since).await?)
    }

    async fn list_sectors(&self) -> Result<Vec<String>, StoreError> {
        Ok(crate::list_sectors(&self.pool).await?)
    }

    async fn list_raw_records(
        &self,
        client_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let rows = crate::list_raw_records(&self.pool, client_id, from, to).await?;
        Ok(rows.into_iter().map(RawRecord::from).collect())
    }

    async fn list_pending_text_sources(
        &self,
        client_id: i64,
        limit: i64,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let rows = crate::list_pending_text_sources(&self.pool, client_id, limit).await?;
        Ok(rows.into_iter().map(RawRecord::from).collect())
    }

    async fn insert_text_record(&self, record: &NewTextRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(outcome(crate::insert_text_record(&self.pool, record).await?))
    }

    async fn list_text_records(
        &self,
        client_id: Option<i64>,
        sector: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<TextRecord>, StoreError> {
        let rows = crate::list_text_records(&self.pool, client_id, sector, since).await?;
        rows.into_iter()
            .map(|row| TextRecord::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn upsert_kpi(&self, kpi: &NewKpi) -> Result<UpsertOutcome, StoreError> {
        Ok(outcome(crate::upsert_kpi(&self.pool, kpi).await?))
    }

    async fn list_kpis(
        &self,
        client_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<KpiRecord>, StoreError> {
        let rows = crate::list_kpis(&self.pool, client_id, since).await?;
        Ok(rows.into_iter().map(KpiRecord::from).collect())
    }

    async fn upsert_trend_signals(
        &self,
        rows: &[TrendCandidate],
        recency_cutoff: DateTime<Utc>,
    ) -> Result<TrendBatchResult, StoreError> {
        let results = crate::upsert_trend_signals(&self.pool, rows, recency_cutoff).await?;
        Ok(results
            .into_iter()
            .map(|r| r.map(outcome).map_err(StoreError::from))
            .collect())
    }

    async fn list_trend_signals(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TrendSignal>, StoreError> {
        let rows = crate::list_trend_signals(&self.pool, since, limit).await?;
        rows.into_iter()
            .map(|row| TrendSignal::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn upsert_insight(&self, insight: &Insight) -> Result<(UpsertOutcome, i64), StoreError> {
        let (id, inserted) = crate::upsert_insight(&self.pool, insight).await?;
        Ok((outcome(inserted), id))
    }
}
