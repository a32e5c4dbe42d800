mod analysis;
mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;

use bizpulse_core::{AppConfig, Clock, RecordStore, SystemClock};
use bizpulse_engine::TrendConfig;
use bizpulse_sentiment::{TextAnalyzer, DEFAULT_MAX_KEYWORDS};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bizpulse-cli")]
#[command(about = "bizpulse analytics command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Run the full pipeline once and record it in `pipeline_runs`
    Run {
        /// Restrict the run to these client ids instead of all active clients
        #[arg(long = "client")]
        clients: Vec<i64>,
    },
    /// Compute KPIs for one client over the last N days
    Kpis {
        #[arg(long)]
        client: i64,

        /// Period length in days (defaults to `BIZPULSE_KPI_PERIOD_DAYS`)
        #[arg(long)]
        days: Option<i64>,

        /// Print the computed values without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Detect trends, for one sector or across every sector
    Trends {
        #[arg(long)]
        sector: Option<String>,

        #[arg(long)]
        short_days: Option<i64>,

        #[arg(long)]
        long_days: Option<i64>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Generate the insight for one client
    Insight {
        #[arg(long)]
        client: i64,

        #[arg(long)]
        days_back: Option<i64>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Score the sentiment of a piece of text
    Sentiment { text: String },
    /// Extract keywords from a piece of text
    Keywords {
        text: String,

        #[arg(long, default_value_t = DEFAULT_MAX_KEYWORDS)]
        max: usize,
    },
    /// Detect anomalies in a JSON array of objects
    Anomalies {
        file: PathBuf,

        /// Numeric columns to analyse, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// isolation_forest, multivariate, lof or ensemble
        #[arg(long, default_value = "isolation_forest")]
        method: String,

        #[arg(long, default_value_t = bizpulse_anomaly::DEFAULT_CONTAMINATION)]
        contamination: f64,
    },
    /// List recent pipeline runs, or the client outcomes of one run
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,

        #[arg(long)]
        run_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Migrate) => {
            let ctx = Context::connect().await?;
            let applied = bizpulse_db::run_migrations(&ctx.pool).await?;
            println!("applied {applied} migrations");
        }
        Some(Commands::Run { clients }) => {
            let ctx = Context::connect().await?;
            let analyzer = Arc::new(TextAnalyzer::from_app_config(&ctx.config));
            pipeline::run_pipeline(&ctx, analyzer, &clients).await?;
        }
        Some(Commands::Kpis {
            client,
            days,
            dry_run,
        }) => {
            let ctx = Context::connect().await?;
            let days = days.unwrap_or(ctx.config.kpi_period_days);
            analysis::run_kpis(&ctx, client, days, dry_run).await?;
        }
        Some(Commands::Trends {
            sector,
            short_days,
            long_days,
            dry_run,
        }) => {
            let ctx = Context::connect().await?;
            let mut trend_config = TrendConfig::from_app_config(&ctx.config);
            if let Some(short) = short_days {
                trend_config.window_short_days = short;
            }
            if let Some(long) = long_days {
                trend_config.window_long_days = long;
            }
            analysis::run_trends(&ctx, trend_config, sector.as_deref(), dry_run).await?;
        }
        Some(Commands::Insight {
            client,
            days_back,
            dry_run,
        }) => {
            let ctx = Context::connect().await?;
            let days_back = days_back.unwrap_or(ctx.config.insight_days_back);
            analysis::run_insight(&ctx, client, days_back, dry_run).await?;
        }
        Some(Commands::Sentiment { text }) => {
            let analyzer = analyzer_without_database();
            analysis::run_sentiment(&analyzer, &text).await?;
        }
        Some(Commands::Keywords { text, max }) => {
            let analyzer = analyzer_without_database();
            analysis::run_keywords(&analyzer, &text, max).await?;
        }
        Some(Commands::Anomalies {
            file,
            columns,
            method,
            contamination,
        }) => analysis::run_anomalies(&file, &columns, &method, contamination)?,
        Some(Commands::Runs { limit, run_id }) => {
            let ctx = Context::connect().await?;
            match run_id {
                Some(id) => pipeline::show_run(&ctx.pool, id).await?,
                None => pipeline::list_runs(&ctx.pool, limit).await?,
            }
        }
        None => println!("bizpulse-cli ready; see --help for commands"),
    }

    Ok(())
}

/// Configuration and store handles for commands that touch the database.
pub(crate) struct Context {
    pub config: AppConfig,
    pub pool: sqlx::PgPool,
    pub store: Arc<dyn RecordStore>,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    async fn connect() -> anyhow::Result<Self> {
        let config = bizpulse_core::load_app_config()?;
        let pool = bizpulse_db::connect(&config).await?;
        let store: Arc<dyn RecordStore> = Arc::new(bizpulse_db::PgStore::new(pool.clone()));
        Ok(Self {
            config,
            pool,
            store,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Text commands work without `DATABASE_URL`; model settings are picked up
/// when the full configuration loads.
fn analyzer_without_database() -> TextAnalyzer {
    match bizpulse_core::load_app_config() {
        Ok(config) => TextAnalyzer::from_app_config(&config),
        Err(e) => {
            tracing::debug!(error = %e, "configuration unavailable; using rule-based analysis");
            TextAnalyzer::rule_based()
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_log_level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_log_level() -> String {
    std::env::var("BIZPULSE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Mark a pipeline run as failed, logging (not propagating) any error from
/// the status update itself.
pub(crate) async fn fail_run_best_effort(pool: &sqlx::PgPool, run_id: i64, message: String) {
    if let Err(e) = bizpulse_db::fail_pipeline_run(pool, run_id, &message).await {
        tracing::error!(run_id, error = %e, "failed to mark pipeline run as failed");
    }
}

/// Shared by commands that print a result document.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
