//! Read access to `raw_records`.

use bizpulse_core::{RawRecord, TEXT_FIELD_CANDIDATES};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `raw_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawRecordRow {
    pub id: i64,
    pub client_id: i64,
    pub source_type: String,
    /// The schema constrains this to a JSON object.
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl From<RawRecordRow> for RawRecord {
    fn from(row: RawRecordRow) -> Self {
        let data = match row.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: row.id,
            client_id: row.client_id,
            source_type: row.source_type,
            data,
            created_at: row.created_at,
        }
    }
}

/// Returns a client's raw records with `created_at` in `[from, to]`, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_raw_records(
    pool: &PgPool,
    client_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<RawRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, RawRecordRow>(
        "SELECT id, client_id, source_type, data, created_at \
         FROM raw_records \
         WHERE client_id = $1 AND created_at BETWEEN $2 AND $3 \
         ORDER BY created_at, id",
    )
    .bind(client_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns up to `limit` raw records that carry a non-blank string text field
/// and have no text record yet, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_text_sources(
    pool: &PgPool,
    client_id: i64,
    limit: i64,
) -> Result<Vec<RawRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, RawRecordRow>(
        r"SELECT r.id, r.client_id, r.source_type, r.data, r.created_at
          FROM raw_records r
          WHERE r.client_id = $1
            AND NOT EXISTS (SELECT 1 FROM text_records t WHERE t.source_record_id = r.id)
            AND EXISTS (
                SELECT 1 FROM unnest($3::text[]) AS k(key)
                WHERE jsonb_typeof(r.data -> k.key) = 'string'
                  AND (r.data ->> k.key) ~ '\S'
            )
          ORDER BY r.created_at DESC, r.id DESC
          LIMIT $2",
    )
    .bind(client_id)
    .bind(limit)
    .bind(TEXT_FIELD_CANDIDATES)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
