//! Live integration tests for bizpulse-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. `"../../migrations"` resolves to the workspace
//! migration directory from the crate root.

use bizpulse_core::{NewTextRecord, RawRecord, SentimentResult};
use bizpulse_db::list_pending_text_sources;
use chrono::Utc;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_test_client(pool: &sqlx::PgPool, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("INSERT INTO clients (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("insert_test_client failed for '{name}': {e}"))
}

async fn insert_raw(pool: &sqlx::PgPool, client_id: i64, data: Value) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO raw_records (client_id, source_type, data) \
         VALUES ($1, 'feedback', $2) RETURNING id",
    )
    .bind(client_id)
    .bind(data)
    .fetch_one(pool)
    .await
    .expect("insert raw record")
}

// ---------------------------------------------------------------------------
// Pending text sources
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn pending_sources_ignore_non_string_text_values(pool: sqlx::PgPool) {
    let client_id = insert_test_client(&pool, "acme").await;
    insert_raw(&pool, client_id, json!({"text": 123})).await;
    insert_raw(&pool, client_id, json!({"text": true})).await;
    insert_raw(&pool, client_id, json!({"comment": {"body": "hidden"}})).await;
    insert_raw(&pool, client_id, json!({"review": "   "})).await;
    let fallback = insert_raw(&pool, client_id, json!({"text": 7, "review": "muy bueno"})).await;
    let plain = insert_raw(&pool, client_id, json!({"description": "entrega lenta"})).await;

    let rows = list_pending_text_sources(&pool, client_id, 10)
        .await
        .expect("list pending sources");
    let mut ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![fallback, plain]);

    for row in rows {
        assert!(RawRecord::from(row).text_field().is_some());
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn non_string_rows_do_not_consume_the_batch_limit(pool: sqlx::PgPool) {
    let client_id = insert_test_client(&pool, "acme").await;
    let wanted = insert_raw(&pool, client_id, json!({"text": "excelente servicio"})).await;
    for n in 0..3 {
        insert_raw(&pool, client_id, json!({"text": n})).await;
    }

    let rows = list_pending_text_sources(&pool, client_id, 1)
        .await
        .expect("list pending sources");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, wanted);
}

#[sqlx::test(migrations = "../../migrations")]
async fn analysed_sources_are_no_longer_pending(pool: sqlx::PgPool) {
    let client_id = insert_test_client(&pool, "acme").await;
    let analysed = insert_raw(&pool, client_id, json!({"text": "todo bien"})).await;
    let pending = insert_raw(&pool, client_id, json!({"comment": "precio alto"})).await;

    bizpulse_db::insert_text_record(
        &pool,
        &NewTextRecord {
            client_id,
            source_record_id: Some(analysed),
            raw_text: "todo bien".to_string(),
            sentiment: SentimentResult::from_polarity(0.5),
            keywords: vec!["bien".to_string()],
            sector: None,
            created_at: Utc::now(),
        },
    )
    .await
    .expect("insert text record");

    let rows = list_pending_text_sources(&pool, client_id, 10)
        .await
        .expect("list pending sources");
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![pending]);
}
