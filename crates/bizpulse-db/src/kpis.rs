//! Database operations for `kpi_records`.

use bizpulse_core::{KpiRecord, NewKpi};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `kpi_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KpiRow {
    pub id: i64,
    pub client_id: i64,
    pub kpi_name: String,
    pub kpi_value: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>,
}

impl From<KpiRow> for KpiRecord {
    fn from(row: KpiRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            kpi_name: row.kpi_name,
            kpi_value: row.kpi_value,
            period_start: row.period_start,
            period_end: row.period_end,
            calculated_at: row.calculated_at,
        }
    }
}

/// Upserts a KPI value.
///
/// Conflicts on `(client_id, kpi_name, period_start, period_end)` update
/// `kpi_value` and `calculated_at` in place. The write runs in its own
/// transaction, which is rolled back on failure. Returns `true` when a new
/// row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert or commit fails.
pub async fn upsert_kpi(pool: &PgPool, kpi: &NewKpi) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO kpi_records \
             (client_id, kpi_name, kpi_value, period_start, period_end, calculated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT ON CONSTRAINT kpi_records_identity DO UPDATE SET \
             kpi_value     = EXCLUDED.kpi_value, \
             calculated_at = EXCLUDED.calculated_at \
         RETURNING (xmax = 0)",
    )
    .bind(kpi.client_id)
    .bind(&kpi.kpi_name)
    .bind(kpi.kpi_value)
    .bind(kpi.period_start)
    .bind(kpi.period_end)
    .bind(kpi.calculated_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(inserted)
}

/// Returns a client's KPIs calculated at or after `since`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_kpis(
    pool: &PgPool,
    client_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<KpiRow>, DbError> {
    let rows = sqlx::query_as::<_, KpiRow>(
        "SELECT id, client_id, kpi_name, kpi_value, period_start, period_end, calculated_at \
         FROM kpi_records \
         WHERE client_id = $1 AND calculated_at >= $2 \
         ORDER BY calculated_at DESC, id DESC",
    )
    .bind(client_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
