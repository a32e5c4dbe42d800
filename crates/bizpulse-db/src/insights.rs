//! Database operations for `insights`.

use bizpulse_core::{Insight, InsightMetrics, OpportunityLevel, RiskLevel};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `insights` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InsightRow {
    pub id: i64,
    pub client_id: i64,
    pub summary_text: String,
    /// JSON array of finding strings.
    pub key_findings: Value,
    pub risk_level: String,
    pub opportunity_level: String,
    pub metrics: Value,
    pub generated_at: DateTime<Utc>,
}

impl TryFrom<InsightRow> for Insight {
    type Error = DbError;

    fn try_from(row: InsightRow) -> Result<Self, Self::Error> {
        let decode = |e: &dyn std::fmt::Display| DbError::Decode(e.to_string());
        Ok(Self {
            id: Some(row.id),
            client_id: row.client_id,
            summary_text: row.summary_text,
            key_findings: serde_json::from_value(row.key_findings).map_err(|e| decode(&e))?,
            risk_level: row.risk_level.parse::<RiskLevel>().map_err(|e| decode(&e))?,
            opportunity_level: row
                .opportunity_level
                .parse::<OpportunityLevel>()
                .map_err(|e| decode(&e))?,
            metrics: serde_json::from_value::<InsightMetrics>(row.metrics)
                .map_err(|e| decode(&e))?,
            generated_at: row.generated_at,
        })
    }
}

/// Upserts an insight keyed by `(client_id, calendar day of generated_at)`.
///
/// Returns the row id and whether a new row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert or commit fails.
pub async fn upsert_insight(pool: &PgPool, insight: &Insight) -> Result<(i64, bool), DbError> {
    let mut tx = pool.begin().await?;

    let (id, inserted) = sqlx::query_as::<_, (i64, bool)>(
        "INSERT INTO insights \
             (client_id, summary_text, key_findings, risk_level, opportunity_level, \
              metrics, generated_at, generated_on) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT ON CONSTRAINT insights_identity DO UPDATE SET \
             summary_text      = EXCLUDED.summary_text, \
             key_findings      = EXCLUDED.key_findings, \
             risk_level        = EXCLUDED.risk_level, \
             opportunity_level = EXCLUDED.opportunity_level, \
             metrics           = EXCLUDED.metrics, \
             generated_at      = EXCLUDED.generated_at \
         RETURNING id, (xmax = 0)",
    )
    .bind(insight.client_id)
    .bind(&insight.summary_text)
    .bind(Json(&insight.key_findings))
    .bind(insight.risk_level.as_str())
    .bind(insight.opportunity_level.as_str())
    .bind(Json(&insight.metrics))
    .bind(insight.generated_at)
    .bind(insight.generated_at.date_naive())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((id, inserted))
}

/// Returns a client's most recent `limit` insights, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_insights(
    pool: &PgPool,
    client_id: i64,
    limit: i64,
) -> Result<Vec<InsightRow>, DbError> {
    let rows = sqlx::query_as::<_, InsightRow>(
        "SELECT id, client_id, summary_text, key_findings, risk_level, opportunity_level, \
                metrics, generated_at \
         FROM insights \
         WHERE client_id = $1 \
         ORDER BY generated_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(client_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
