mod scheduler;

use std::sync::Arc;

use bizpulse_core::{RecordStore, SystemClock};
use bizpulse_engine::{Pipeline, PipelineConfig};
use bizpulse_sentiment::TextAnalyzer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(bizpulse_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = bizpulse_db::connect(&config).await?;
    let applied = bizpulse_db::run_migrations(&pool).await?;
    tracing::info!(applied, env = %config.env, "database ready");

    let store: Arc<dyn RecordStore> = Arc::new(bizpulse_db::PgStore::new(pool.clone()));
    let analyzer = Arc::new(TextAnalyzer::from_app_config(&config));
    let pipeline = Pipeline::new(
        store,
        Arc::new(SystemClock),
        analyzer,
        PipelineConfig::from_app_config(&config),
    );

    let mut scheduler =
        scheduler::build_scheduler(pool, Arc::new(pipeline), &config.pipeline_cron).await?;

    shutdown_signal().await;
    scheduler.shutdown().await?;
    tracing::info!("scheduler stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
