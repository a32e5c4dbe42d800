//! Per-client orchestration of the analytical stages.
//!
//! A run has three stages:
//!
//! 1. Text processing for every client, fanned out with bounded parallelism.
//! 2. Market-wide trend detection over all text records.
//! 3. KPI computation followed by insight synthesis for every client.
//!
//! Stage 3 only starts once stage 2 has committed, because insights read
//! trend signals back from the store. A failing client is recorded in its
//! [`ClientOutcome`] and never stops the others.

use std::collections::HashMap;
use std::sync::Arc;

use bizpulse_core::{AppConfig, Clock, OpportunityLevel, RecordStore, RiskLevel};
use bizpulse_sentiment::TextAnalyzer;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::EngineError;
use crate::insight::InsightGenerator;
use crate::kpi::KpiEngine;
use crate::text::{TextBatchSummary, TextProcessor};
use crate::trend::{TrendConfig, TrendEngine, TrendSweep};
use crate::ClientStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Clients with records newer than this many hours are processed.
    pub active_client_hours: i64,
    /// KPI period, ending at the run's start.
    pub kpi_period_days: i64,
    pub trend: TrendConfig,
    pub insight_days_back: i64,
    /// Pending text records analysed per client per run.
    pub text_batch_limit: i64,
    pub max_concurrent_clients: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            active_client_hours: 168,
            kpi_period_days: 30,
            trend: TrendConfig::default(),
            insight_days_back: 7,
            text_batch_limit: 100,
            max_concurrent_clients: 4,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            active_client_hours: config.active_client_hours,
            kpi_period_days: config.kpi_period_days,
            trend: TrendConfig::from_app_config(config),
            insight_days_back: config.insight_days_back,
            text_batch_limit: config.text_batch_limit,
            max_concurrent_clients: config.max_concurrent_clients,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientOutcome {
    pub client_id: i64,
    pub status: ClientStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub texts_processed: usize,
    pub kpis_persisted: usize,
    pub insight_persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_level: Option<OpportunityLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ordered by client id.
    pub clients: Vec<ClientOutcome>,
    pub trends: TrendSweep,
}

impl PipelineReport {
    #[must_use]
    pub fn count(&self, status: ClientStatus) -> usize {
        self.clients.iter().filter(|c| c.status == status).count()
    }

    /// True when at least one client ran and none of them succeeded or
    /// ended without data.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.clients.is_empty() && self.count(ClientStatus::Error) == self.clients.len()
    }
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    text: TextProcessor,
    kpis: KpiEngine,
    trends: TrendEngine,
    insights: InsightGenerator,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        analyzer: Arc<TextAnalyzer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            text: TextProcessor::new(Arc::clone(&store), Arc::clone(&clock), analyzer),
            kpis: KpiEngine::new(Arc::clone(&store), Arc::clone(&clock)),
            trends: TrendEngine::new(Arc::clone(&store), Arc::clone(&clock), config.trend),
            insights: InsightGenerator::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    #[must_use]
    pub fn text_processor(&self) -> &TextProcessor {
        &self.text
    }

    #[must_use]
    pub fn kpi_engine(&self) -> &KpiEngine {
        &self.kpis
    }

    #[must_use]
    pub fn trend_engine(&self) -> &TrendEngine {
        &self.trends
    }

    #[must_use]
    pub fn insight_generator(&self) -> &InsightGenerator {
        &self.insights
    }

    /// Run every stage for all active clients.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the active clients cannot be listed.
    /// Per-client failures are reported in the outcome instead.
    pub async fn run(&self) -> Result<PipelineReport, EngineError> {
        let since = self.clock.now() - Duration::hours(self.config.active_client_hours);
        let clients = self.store.list_active_clients(since).await?;
        if clients.is_empty() {
            tracing::info!("no active clients");
        }
        Ok(self.run_clients(&clients).await)
    }

    /// Run every stage for the given clients.
    pub async fn run_clients(&self, clients: &[i64]) -> PipelineReport {
        let started_at = self.clock.now();
        let max_concurrent = self.config.max_concurrent_clients.max(1);
        tracing::info!(clients = clients.len(), max_concurrent, "pipeline started");

        // Stage 1: text processing.
        let limit = self.config.text_batch_limit;
        let text_results: HashMap<i64, Result<TextBatchSummary, EngineError>> =
            stream::iter(clients.iter().copied())
                .map(|client_id| async move {
                    (client_id, self.text.process_client(client_id, limit).await)
                })
                .buffer_unordered(max_concurrent)
                .collect()
                .await;

        // Stage 2: market-wide trends.
        let trends = match self.trends.detect_and_persist_all().await {
            Ok(sweep) => sweep,
            Err(e) => {
                tracing::error!(error = %e, "trend sweep failed");
                TrendSweep::failed(e.to_string())
            }
        };

        // Stage 3: KPIs then insight, per client.
        let period_end = self.clock.now();
        let period_start = period_end - Duration::days(self.config.kpi_period_days);
        let mut text_results = text_results;
        let jobs: Vec<(i64, Result<TextBatchSummary, EngineError>)> = clients
            .iter()
            .map(|id| {
                let text = text_results
                    .remove(id)
                    .unwrap_or_else(|| Ok(TextBatchSummary::default()));
                (*id, text)
            })
            .collect();

        let mut outcomes: Vec<ClientOutcome> = stream::iter(jobs)
            .map(|(client_id, text)| self.finish_client(client_id, text, period_start, period_end))
            .buffer_unordered(max_concurrent)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.client_id);

        let report = PipelineReport {
            started_at,
            finished_at: self.clock.now(),
            clients: outcomes,
            trends,
        };

        if report.count(ClientStatus::Error) > 0 {
            tracing::warn!(
                failed_clients = report.count(ClientStatus::Error),
                total_clients = report.clients.len(),
                "some clients failed"
            );
        }
        tracing::info!(
            succeeded = report.count(ClientStatus::Success),
            no_data = report.count(ClientStatus::NoData),
            failed = report.count(ClientStatus::Error),
            trends_persisted = report.trends.persisted(),
            "pipeline finished"
        );
        report
    }

    async fn finish_client(
        &self,
        client_id: i64,
        text: Result<TextBatchSummary, EngineError>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> ClientOutcome {
        let mut errors: Vec<String> = Vec::new();

        let texts_processed = match text {
            Ok(summary) => {
                if summary.failed > 0 {
                    errors.push(format!("text: {} records failed to store", summary.failed));
                }
                summary.processed
            }
            Err(e) => {
                tracing::error!(client_id, error = %e, "text processing failed");
                errors.push(format!("text: {e}"));
                0
            }
        };

        let kpis = self
            .kpis
            .compute_and_persist(client_id, period_start, period_end)
            .await;
        if let Some(e) = &kpis.error {
            errors.push(format!("kpis: {e}"));
        }

        let (insight_persisted, risk_level, opportunity_level) = match self
            .insights
            .generate(client_id, self.config.insight_days_back)
            .await
        {
            Ok(insight) => {
                let saved = self.insights.persist(&insight).await;
                if !saved {
                    errors.push("insight: failed to persist".to_string());
                }
                (saved, Some(insight.risk_level), Some(insight.opportunity_level))
            }
            Err(e) => {
                tracing::error!(client_id, error = %e, "insight generation failed");
                errors.push(format!("insight: {e}"));
                (false, None, None)
            }
        };

        let (status, message) = if !errors.is_empty() {
            (ClientStatus::Error, Some(errors.join("; ")))
        } else if kpis.status == ClientStatus::NoData && risk_level == Some(RiskLevel::Unknown) {
            (ClientStatus::NoData, Some("no data in period".to_string()))
        } else {
            (ClientStatus::Success, None)
        };

        ClientOutcome {
            client_id,
            status,
            message,
            texts_processed,
            kpis_persisted: kpis.kpis_persisted,
            insight_persisted,
            risk_level,
            opportunity_level,
        }
    }
}
