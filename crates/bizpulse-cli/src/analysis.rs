//! Single-operation command handlers.
//!
//! Each handler prints its result as JSON on stdout. `--dry-run` variants
//! compute and print without writing to the store.

use std::path::Path;

use bizpulse_anomaly::Table;
use bizpulse_engine::{InsightGenerator, KpiEngine, TrendConfig, TrendEngine};
use bizpulse_sentiment::TextAnalyzer;
use chrono::Duration;
use serde_json::json;

use crate::{print_json, Context};

pub(crate) async fn run_kpis(
    ctx: &Context,
    client_id: i64,
    days: i64,
    dry_run: bool,
) -> anyhow::Result<()> {
    let engine = KpiEngine::new(ctx.store.clone(), ctx.clock.clone());
    let period_end = ctx.clock.now();
    let period_start = period_end - Duration::days(days);

    if dry_run {
        let kpis = engine.compute(client_id, period_start, period_end).await?;
        return print_json(&kpis);
    }

    let summary = engine
        .compute_and_persist(client_id, period_start, period_end)
        .await;
    print_json(&summary)?;
    if let Some(error) = summary.error {
        anyhow::bail!("kpi computation failed for client {client_id}: {error}");
    }
    Ok(())
}

/// With `--sector`, detect (and persist) that sector only. Without it, a
/// dry run scores all text records as one pool and a real run sweeps that
/// pool plus every named sector.
pub(crate) async fn run_trends(
    ctx: &Context,
    config: TrendConfig,
    sector: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let engine = TrendEngine::new(ctx.store.clone(), ctx.clock.clone(), config);

    if sector.is_none() && !dry_run {
        let sweep = engine.detect_and_persist_all().await?;
        print_json(&sweep)?;
        if sweep.failed_sectors() > 0 {
            anyhow::bail!("{} sectors failed trend detection", sweep.failed_sectors());
        }
        return Ok(());
    }

    let candidates = engine
        .detect(sector, config.window_short_days, config.window_long_days)
        .await?;
    if dry_run {
        return print_json(&candidates);
    }

    let persisted = engine.persist(&candidates).await;
    print_json(&json!({
        "sector": sector,
        "detected": candidates.len(),
        "persisted": persisted,
    }))
}

pub(crate) async fn run_insight(
    ctx: &Context,
    client_id: i64,
    days_back: i64,
    dry_run: bool,
) -> anyhow::Result<()> {
    let generator = InsightGenerator::new(ctx.store.clone(), ctx.clock.clone());
    let insight = generator.generate(client_id, days_back).await?;

    if !dry_run && !generator.persist(&insight).await {
        print_json(&insight)?;
        anyhow::bail!("failed to persist insight for client {client_id}");
    }
    print_json(&insight)
}

pub(crate) async fn run_sentiment(analyzer: &TextAnalyzer, text: &str) -> anyhow::Result<()> {
    let result = analyzer.analyze(text).await;
    print_json(&result)
}

pub(crate) async fn run_keywords(
    analyzer: &TextAnalyzer,
    text: &str,
    max: usize,
) -> anyhow::Result<()> {
    let keywords = analyzer.keywords(text, max).await;
    print_json(&keywords)
}

pub(crate) fn run_anomalies(
    file: &Path,
    columns: &[String],
    method: &str,
    contamination: f64,
) -> anyhow::Result<()> {
    let table = load_table(file)?;
    tracing::info!(
        rows = table.len(),
        columns = columns.len(),
        method,
        contamination,
        "detecting anomalies"
    );
    let outcome = bizpulse_anomaly::detect_anomalies(&table, columns, method, contamination)?;
    print_json(&outcome)
}

fn load_table(file: &Path) -> anyhow::Result<Table> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not valid JSON: {e}", file.display()))?;
    Ok(Table::from_json(&value)?)
}
