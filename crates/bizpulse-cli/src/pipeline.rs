//! One-shot pipeline runs and their bookkeeping.
//!
//! A run row moves `queued -> running -> succeeded|failed`. Per-client
//! failures are recorded against the run and do not fail it; the run fails
//! only when it cannot start, every client failed, or the bookkeeping
//! itself errors.

use std::sync::Arc;

use bizpulse_engine::{Pipeline, PipelineConfig, PipelineReport};
use bizpulse_sentiment::TextAnalyzer;

use crate::{fail_run_best_effort, print_json, Context};

const TRIGGER_SOURCE: &str = "cli";

pub(crate) async fn run_pipeline(
    ctx: &Context,
    analyzer: Arc<TextAnalyzer>,
    clients: &[i64],
) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    let pipeline = Pipeline::new(
        ctx.store.clone(),
        ctx.clock.clone(),
        analyzer,
        PipelineConfig::from_app_config(&ctx.config),
    );

    let run = bizpulse_db::create_pipeline_run(pool, TRIGGER_SOURCE).await?;
    if let Err(e) = bizpulse_db::start_pipeline_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, format!("{e:#}")).await;
        return Err(e.into());
    }

    let report = if clients.is_empty() {
        match pipeline.run().await {
            Ok(report) => report,
            Err(e) => {
                fail_run_best_effort(pool, run.id, format!("{e:#}")).await;
                return Err(e.into());
            }
        }
    } else {
        pipeline.run_clients(clients).await
    };

    record_clients(pool, run.id, &report).await;
    print_json(&report)?;

    if report.all_failed() {
        let message = format!("all {} clients failed", report.clients.len());
        fail_run_best_effort(pool, run.id, message.clone()).await;
        anyhow::bail!("{message}");
    }

    let processed = i32::try_from(report.clients.len()).unwrap_or(i32::MAX);
    if let Err(err) = bizpulse_db::complete_pipeline_run(pool, run.id, processed).await {
        fail_run_best_effort(pool, run.id, format!("{err:#}")).await;
        return Err(err.into());
    }
    tracing::info!(run_id = run.id, public_id = %run.public_id, "pipeline run recorded");
    Ok(())
}

async fn record_clients(pool: &sqlx::PgPool, run_id: i64, report: &PipelineReport) {
    for outcome in &report.clients {
        if let Err(e) = bizpulse_db::upsert_pipeline_run_client(
            pool,
            run_id,
            outcome.client_id,
            outcome.status.as_str(),
            outcome.message.as_deref(),
        )
        .await
        {
            tracing::warn!(
                run_id,
                client_id = outcome.client_id,
                error = %e,
                "failed to record client outcome"
            );
        }
    }
}

pub(crate) async fn list_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = bizpulse_db::list_pipeline_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no pipeline runs recorded");
        return Ok(());
    }
    for run in &runs {
        println!(
            "{:>6}  {:<9}  {:<6}  clients={:<4}  created={}{}",
            run.id,
            run.status,
            run.trigger_source,
            run.clients_processed,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.error_message
                .as_deref()
                .map(|m| format!("  error={m}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

pub(crate) async fn show_run(pool: &sqlx::PgPool, run_id: i64) -> anyhow::Result<()> {
    let run = bizpulse_db::get_pipeline_run(pool, run_id).await?;
    println!(
        "run {} ({}) status={} trigger={}",
        run.id, run.public_id, run.status, run.trigger_source
    );
    let clients = bizpulse_db::list_pipeline_run_clients(pool, run_id).await?;
    for client in &clients {
        match &client.message {
            Some(message) => println!("  client {:>6}  {:<8}  {message}", client.client_id, client.status),
            None => println!("  client {:>6}  {}", client.client_id, client.status),
        }
    }
    Ok(())
}
