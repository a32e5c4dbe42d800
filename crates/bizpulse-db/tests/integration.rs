//! Offline unit tests for bizpulse-db pool configuration and row types.
//! These tests do not require a live database connection.

use bizpulse_core::{
    AppConfig, Environment, Insight, OpportunityLevel, RawRecord, RiskLevel, SentimentLabel,
    StoreError, TextRecord, TrendSignal, TrendStatus,
};
use bizpulse_db::{
    DbError, InsightRow, PipelineRunRow, PoolConfig, RawRecordRow, TextRecordRow, TrendSignalRow,
};
use chrono::Utc;
use serde_json::json;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        model_url: None,
        model_name: "llama3".to_string(),
        model_timeout_secs: 15,
        active_client_hours: 168,
        kpi_period_days: 30,
        trend_window_short_days: 7,
        trend_window_long_days: 30,
        trend_keep_stable: false,
        insight_days_back: 7,
        text_batch_limit: 100,
        max_concurrent_clients: 4,
        pipeline_cron: "0 0 3 * * *".to_string(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn raw_record_row_with_non_object_data_converts_to_empty_map() {
    let row = RawRecordRow {
        id: 1,
        client_id: 2,
        source_type: "sales".to_string(),
        data: json!([1, 2, 3]),
        created_at: Utc::now(),
    };
    let record = RawRecord::from(row);
    assert!(record.data.is_empty());
    assert_eq!(record.source_type, "sales");
}

#[test]
fn text_record_row_decodes_label() {
    let row = TextRecordRow {
        id: 5,
        client_id: 2,
        source_record_id: Some(9),
        raw_text: "excelente servicio".to_string(),
        sentiment_label: "positive".to_string(),
        polarity: 1.0,
        keywords: vec!["excelente".to_string(), "servicio".to_string()],
        sector: Some("retail".to_string()),
        created_at: Utc::now(),
    };
    let record = TextRecord::try_from(row).unwrap();
    assert_eq!(record.sentiment_label, SentimentLabel::Positive);
    assert_eq!(record.keywords.len(), 2);
}

#[test]
fn text_record_row_with_unknown_label_is_a_decode_error() {
    let row = TextRecordRow {
        id: 5,
        client_id: 2,
        source_record_id: None,
        raw_text: "?".to_string(),
        sentiment_label: "ecstatic".to_string(),
        polarity: 0.0,
        keywords: vec![],
        sector: None,
        created_at: Utc::now(),
    };
    let err = TextRecord::try_from(row).unwrap_err();
    assert!(matches!(err, DbError::Decode(_)));
    assert!(matches!(StoreError::from(err), StoreError::Decode(_)));
}

#[test]
fn trend_signal_row_decodes_status() {
    let now = Utc::now();
    let row = TrendSignalRow {
        id: 3,
        sector: "general".to_string(),
        term: "refund".to_string(),
        frequency: 12,
        delta_pct: 85.0,
        status: "emergent".to_string(),
        period_start: now,
        period_end: now,
        metadata: json!({"method": "windowed"}),
        detected_at: now,
        updated_at: now,
    };
    let signal = TrendSignal::try_from(row).unwrap();
    assert_eq!(signal.status, TrendStatus::Emergent);
    assert_eq!(signal.frequency, 12);
}

#[test]
fn insight_row_decodes_json_columns() {
    let row = InsightRow {
        id: 8,
        client_id: 2,
        summary_text: "summary".to_string(),
        key_findings: json!(["a", "b"]),
        risk_level: "medium".to_string(),
        opportunity_level: "unknown".to_string(),
        metrics: json!({
            "text_records": 10,
            "kpis_analyzed": 5,
            "trends_detected": 0,
            "analysis_period_days": 30
        }),
        generated_at: Utc::now(),
    };
    let insight = Insight::try_from(row).unwrap();
    assert_eq!(insight.id, Some(8));
    assert_eq!(insight.key_findings, vec!["a", "b"]);
    assert_eq!(insight.risk_level, RiskLevel::Medium);
    assert_eq!(insight.opportunity_level, OpportunityLevel::Unknown);
    assert_eq!(insight.metrics.text_records, 10);
}

#[test]
fn non_database_errors_map_to_store_database_errors() {
    let err = StoreError::from(DbError::NotFound);
    assert!(matches!(err, StoreError::Database(_)));
}

/// Compile-time smoke test: confirm that [`PipelineRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn pipeline_run_row_has_expected_fields() {
    let row = PipelineRunRow {
        id: 1,
        public_id: uuid::Uuid::new_v4(),
        trigger_source: "cli".to_string(),
        status: "queued".to_string(),
        started_at: None,
        completed_at: None,
        clients_processed: 0,
        error_message: None,
        created_at: Utc::now(),
    };
    assert_eq!(row.status, "queued");
    assert!(row.started_at.is_none());
}
