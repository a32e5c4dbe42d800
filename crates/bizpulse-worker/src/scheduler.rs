//! Background job scheduler.
//!
//! Registers the recurring pipeline job. Each firing is recorded as a
//! `pipeline_runs` row with one `pipeline_run_clients` row per client.

use std::sync::Arc;

use bizpulse_engine::{Pipeline, PipelineReport};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

const TRIGGER_SOURCE: &str = "scheduler";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    pipeline: Arc<Pipeline>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_pipeline_job(&scheduler, pool, pipeline, cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the pipeline job on `cron`. A firing that overlaps a run still
/// in progress is skipped.
async fn register_pipeline_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    pipeline: Arc<Pipeline>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);
    let running = Arc::new(Mutex::new(()));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let pipeline = Arc::clone(&pipeline);
        let running = Arc::clone(&running);

        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                tracing::warn!("scheduler: previous pipeline run still in progress; skipping");
                return;
            };
            tracing::info!("scheduler: starting pipeline run");
            run_pipeline_job(&pool, &pipeline).await;
            tracing::info!("scheduler: pipeline run complete");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: registered pipeline job");
    Ok(())
}

/// Drive one pipeline run with bookkeeping. Errors are logged, never
/// propagated, so the scheduler keeps firing.
async fn run_pipeline_job(pool: &PgPool, pipeline: &Pipeline) {
    let run = match bizpulse_db::create_pipeline_run(pool, TRIGGER_SOURCE).await {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to create pipeline run");
            return;
        }
    };
    if let Err(e) = bizpulse_db::start_pipeline_run(pool, run.id).await {
        tracing::error!(run_id = run.id, error = %e, "scheduler: failed to start pipeline run");
        fail_run(pool, run.id, &format!("{e:#}")).await;
        return;
    }

    let report = match pipeline.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(run_id = run.id, error = %e, "scheduler: pipeline run aborted");
            fail_run(pool, run.id, &format!("{e:#}")).await;
            return;
        }
    };

    record_clients(pool, run.id, &report).await;

    if report.all_failed() {
        fail_run(pool, run.id, &format!("all {} clients failed", report.clients.len())).await;
        return;
    }

    let processed = i32::try_from(report.clients.len()).unwrap_or(i32::MAX);
    if let Err(e) = bizpulse_db::complete_pipeline_run(pool, run.id, processed).await {
        tracing::error!(run_id = run.id, error = %e, "scheduler: failed to complete pipeline run");
        fail_run(pool, run.id, &format!("{e:#}")).await;
    }
}

async fn record_clients(pool: &PgPool, run_id: i64, report: &PipelineReport) {
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
                "scheduler: failed to record client outcome"
            );
        }
    }
}

async fn fail_run(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(e) = bizpulse_db::fail_pipeline_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %e, "scheduler: failed to mark pipeline run as failed");
    }
}
