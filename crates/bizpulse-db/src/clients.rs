//! Active-client selection over `clients` and the artifact tables.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Returns ids of active clients with any raw, text or KPI row newer than
/// `since`, ascending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_clients(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT c.id \
         FROM clients c \
         WHERE c.is_active \
           AND ( \
               EXISTS (SELECT 1 FROM raw_records r \
                       WHERE r.client_id = c.id AND r.created_at > $1) \
            OR EXISTS (SELECT 1 FROM text_records t \
                       WHERE t.client_id = c.id AND t.created_at > $1) \
            OR EXISTS (SELECT 1 FROM kpi_records k \
                       WHERE k.client_id = c.id AND k.calculated_at > $1) \
           ) \
         ORDER BY c.id",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}
