//! Database operations for `text_records`.

use bizpulse_core::{NewTextRecord, SentimentLabel, TextRecord};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `text_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TextRecordRow {
    pub id: i64,
    pub client_id: i64,
    pub source_record_id: Option<i64>,
    pub raw_text: String,
    /// Constrained to `positive`, `negative` or `neutral`.
    pub sentiment_label: String,
    pub polarity: f64,
    pub keywords: Vec<String>,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TextRecordRow> for TextRecord {
    type Error = DbError;

    fn try_from(row: TextRecordRow) -> Result<Self, Self::Error> {
        let sentiment_label = row
            .sentiment_label
            .parse::<SentimentLabel>()
            .map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(Self {
            id: row.id,
            client_id: row.client_id,
            source_record_id: row.source_record_id,
            raw_text: row.raw_text,
            sentiment_label,
            polarity: row.polarity,
            keywords: row.keywords,
            sector: row.sector,
            created_at: row.created_at,
        })
    }
}

/// Inserts a text record.
///
/// Conflicts on `source_record_id` overwrite the derived fields in place.
/// Returns `true` when a new row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn insert_text_record(pool: &PgPool, record: &NewTextRecord) -> Result<bool, DbError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO text_records \
             (client_id, source_record_id, raw_text, sentiment_label, polarity, \
              keywords, sector, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (source_record_id) DO UPDATE SET \
             raw_text        = EXCLUDED.raw_text, \
             sentiment_label = EXCLUDED.sentiment_label, \
             polarity        = EXCLUDED.polarity, \
             keywords        = EXCLUDED.keywords, \
             sector          = EXCLUDED.sector \
         RETURNING (xmax = 0)",
    )
    .bind(record.client_id)
    .bind(record.source_record_id)
    .bind(&record.raw_text)
    .bind(record.sentiment.label.as_str())
    .bind(record.sentiment.polarity)
    .bind(&record.keywords)
    .bind(&record.sector)
    .bind(record.created_at)
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

/// Returns text records created at or after `since`, newest first.
///
/// `client_id` and `sector` narrow the result when given.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_text_records(
    pool: &PgPool,
    client_id: Option<i64>,
    sector: Option<&str>,
    since: DateTime<Utc>,
) -> Result<Vec<TextRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, TextRecordRow>(
        "SELECT id, client_id, source_record_id, raw_text, sentiment_label, polarity, \
                keywords, sector, created_at \
         FROM text_records \
         WHERE ($1::BIGINT IS NULL OR client_id = $1) \
           AND ($2::TEXT IS NULL OR sector = $2) \
           AND created_at >= $3 \
         ORDER BY created_at DESC, id DESC",
    )
    .bind(client_id)
    .bind(sector)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the distinct non-blank sectors present on text records.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sectors(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let sectors = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT btrim(sector) \
         FROM text_records \
         WHERE sector IS NOT NULL AND btrim(sector) <> '' \
         ORDER BY 1",
    )
    .fetch_all(pool)
    .await?;

    Ok(sectors)
}
