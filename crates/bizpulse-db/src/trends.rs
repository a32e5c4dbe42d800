//! Database operations for `trend_signals`.

use bizpulse_core::{TrendCandidate, TrendSignal, TrendStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Acquire, PgConnection, PgPool};

use crate::DbError;

/// A row from the `trend_signals` table.
///
/// `status` is selected as `status::text` from the `trend_status` enum.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrendSignalRow {
    pub id: i64,
    pub sector: String,
    pub term: String,
    pub frequency: i64,
    pub delta_pct: f64,
    pub status: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metadata: Value,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TrendSignalRow> for TrendSignal {
    type Error = DbError;

    fn try_from(row: TrendSignalRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TrendStatus>()
            .map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(Self {
            id: row.id,
            sector: row.sector,
            term: row.term,
            frequency: row.frequency,
            delta_pct: row.delta_pct,
            status,
            period_start: row.period_start,
            period_end: row.period_end,
            metadata: row.metadata,
            detected_at: row.detected_at,
            updated_at: row.updated_at,
        })
    }
}

/// Upserts a batch of trend rows in one transaction.
///
/// Each row runs inside its own savepoint: a failing row is rolled back to
/// its savepoint and reported in the returned vector while the remaining
/// rows continue. A row updates the most recent existing signal for the same
/// `(sector, term)` detected at or after `recency_cutoff`, otherwise it is
/// inserted. Each entry is `true` for an insert and `false` for an update.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the transaction cannot begin or commit, or a
/// savepoint cannot be created or rolled back.
pub async fn upsert_trend_signals(
    pool: &PgPool,
    rows: &[TrendCandidate],
    recency_cutoff: DateTime<Utc>,
) -> Result<Vec<Result<bool, DbError>>, DbError> {
    let mut tx = pool.begin().await?;
    let mut results = Vec::with_capacity(rows.len());

    for row in rows {
        let mut savepoint = Acquire::begin(&mut *tx).await?;
        match upsert_trend_row(&mut savepoint, row, recency_cutoff).await {
            Ok(inserted) => {
                savepoint.commit().await?;
                results.push(Ok(inserted));
            }
            Err(e) => {
                tracing::warn!(
                    sector = %row.sector,
                    term = %row.term,
                    error = %e,
                    "trend row rolled back to savepoint"
                );
                savepoint.rollback().await?;
                results.push(Err(e));
            }
        }
    }

    tx.commit().await?;
    Ok(results)
}

async fn upsert_trend_row(
    conn: &mut PgConnection,
    row: &TrendCandidate,
    recency_cutoff: DateTime<Utc>,
) -> Result<bool, DbError> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM trend_signals \
         WHERE sector = $1 AND term = $2 AND detected_at >= $3 \
         ORDER BY detected_at DESC, id DESC \
         LIMIT 1 \
         FOR UPDATE",
    )
    .bind(&row.sector)
    .bind(&row.term)
    .bind(recency_cutoff)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        sqlx::query(
            "UPDATE trend_signals SET \
                 frequency    = $1, \
                 delta_pct    = $2, \
                 status       = $3::trend_status, \
                 metadata     = $4, \
                 period_start = $5, \
                 period_end   = $6, \
                 updated_at   = $7 \
             WHERE id = $8",
        )
        .bind(row.frequency)
        .bind(row.delta_pct)
        .bind(row.status.as_str())
        .bind(&row.metadata)
        .bind(row.period_start)
        .bind(row.period_end)
        .bind(row.detected_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO trend_signals \
             (sector, term, frequency, delta_pct, status, period_start, period_end, \
              metadata, detected_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5::trend_status, $6, $7, $8, $9, $9)",
    )
    .bind(&row.sector)
    .bind(&row.term)
    .bind(row.frequency)
    .bind(row.delta_pct)
    .bind(row.status.as_str())
    .bind(row.period_start)
    .bind(row.period_end)
    .bind(&row.metadata)
    .bind(row.detected_at)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// Returns up to `limit` trend signals detected at or after `since`,
/// most frequent first, ties by term.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_trend_signals(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TrendSignalRow>, DbError> {
    let rows = sqlx::query_as::<_, TrendSignalRow>(
        "SELECT id, sector, term, frequency, delta_pct, status::text AS status, \
                period_start, period_end, metadata, detected_at, updated_at \
         FROM trend_signals \
         WHERE detected_at >= $1 \
         ORDER BY frequency DESC, term ASC \
         LIMIT $2",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
