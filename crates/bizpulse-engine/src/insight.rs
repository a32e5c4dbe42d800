//! Per-client insight synthesis from text, KPI and trend artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use bizpulse_core::{
    Clock, Insight, InsightMetrics, KpiRecord, OpportunityLevel, RecordStore, RiskLevel,
    SentimentLabel, TextRecord, TrendSignal, TrendStatus,
};
use chrono::{DateTime, Duration, Utc};

use crate::error::EngineError;

/// Summary used when a client has no artifacts in the window.
pub const INSUFFICIENT_DATA_SUMMARY: &str = "Insufficient data to generate insights";

/// Most frequent trend signals considered per insight.
pub const TREND_SIGNAL_LIMIT: i64 = 20;

/// Relative KPI change, in percent, worth reporting.
const KPI_CHANGE_REPORTABLE: f64 = 20.0;
const KPI_CHANGE_STRONG: f64 = 50.0;

/// How a finding feeds the risk and opportunity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Neutral,
    /// Severity 2 or 3.
    Risk(u8),
    /// Strength 2 or 3.
    Opportunity(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub text: String,
    pub effect: Effect,
}

impl Finding {
    fn neutral(text: String) -> Self {
        Self {
            text,
            effect: Effect::Neutral,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, total: usize) -> f64 {
    part as f64 / total as f64 * 100.0
}

/// Sentiment mix of the client's text records.
#[must_use]
pub fn sentiment_finding(records: &[TextRecord]) -> Option<Finding> {
    if records.is_empty() {
        return None;
    }
    let total = records.len();
    let count = |label: SentimentLabel| records.iter().filter(|r| r.sentiment_label == label).count();
    let positive = percent(count(SentimentLabel::Positive), total);
    let negative = percent(count(SentimentLabel::Negative), total);

    let finding = if negative > 50.0 {
        Finding {
            text: format!("High share of negative sentiment ({negative:.0}% of mentions)"),
            effect: Effect::Risk(if negative > 70.0 { 3 } else { 2 }),
        }
    } else if positive > 60.0 {
        Finding {
            text: format!("Mostly positive sentiment ({positive:.0}% of mentions)"),
            effect: Effect::Opportunity(if positive > 80.0 { 3 } else { 2 }),
        }
    } else {
        Finding::neutral(format!(
            "Mixed sentiment: {positive:.0}% positive, {negative:.0}% negative"
        ))
    };
    Some(finding)
}

/// Latest value of the most-sampled KPI against its window mean.
///
/// `records` must be newest first. Ties on sample count go to the
/// lexicographically smallest name.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn kpi_finding(records: &[KpiRecord]) -> Option<Finding> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.kpi_name.as_str())
            .or_default()
            .push(record.kpi_value);
    }

    // Names iterate ascending, so only a strictly larger group replaces.
    let mut best: Option<(&str, Vec<f64>)> = None;
    for (name, values) in groups {
        if best
            .as_ref()
            .is_none_or(|(_, current)| values.len() > current.len())
        {
            best = Some((name, values));
        }
    }
    let (name, values) = best?;
    let latest = *values.first()?;

    if values.len() >= 2 {
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        let change = if avg.abs() > f64::EPSILON {
            (latest - avg) / avg * 100.0
        } else {
            0.0
        };
        let strength = if change.abs() > KPI_CHANGE_STRONG { 3 } else { 2 };

        if change > KPI_CHANGE_REPORTABLE {
            return Some(Finding {
                text: format!("{name} rose {change:.1}% above its average"),
                effect: Effect::Opportunity(strength),
            });
        }
        if change < -KPI_CHANGE_REPORTABLE {
            return Some(Finding {
                text: format!("{name} fell {:.1}% below its average", change.abs()),
                effect: Effect::Risk(strength),
            });
        }
    }

    Some(Finding::neutral(format!("Main KPI: {name} = {latest:.2}")))
}

/// Strongest emergent term, else the most frequent term.
///
/// `signals` must be most frequent first.
#[must_use]
pub fn trend_finding(signals: &[TrendSignal]) -> Option<Finding> {
    if let Some(top) = signals.iter().find(|s| s.status == TrendStatus::Emergent) {
        return Some(Finding {
            text: format!(
                "Emerging trend detected: '{}' ({} mentions)",
                top.term, top.frequency
            ),
            effect: Effect::Opportunity(if top.frequency > 5 { 3 } else { 2 }),
        });
    }
    signals.first().map(|top| {
        Finding::neutral(format!(
            "Most frequent term: '{}' ({} mentions)",
            top.term, top.frequency
        ))
    })
}

#[allow(clippy::cast_precision_loss)]
fn average(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|v| f64::from(*v)).sum::<f64>() / values.len() as f64)
}

/// Level from the average severity of risk findings.
#[must_use]
pub fn risk_level(severities: &[u8]) -> RiskLevel {
    match average(severities) {
        None => RiskLevel::Low,
        Some(avg) if avg >= 3.0 => RiskLevel::Critical,
        Some(avg) if avg >= 2.5 => RiskLevel::High,
        Some(avg) if avg >= 1.5 => RiskLevel::Medium,
        Some(_) => RiskLevel::Low,
    }
}

/// Level from the average strength of opportunity findings.
#[must_use]
pub fn opportunity_level(strengths: &[u8]) -> OpportunityLevel {
    match average(strengths) {
        None => OpportunityLevel::Low,
        Some(avg) if avg >= 3.0 => OpportunityLevel::High,
        Some(avg) if avg >= 2.0 => OpportunityLevel::Medium,
        Some(_) => OpportunityLevel::Low,
    }
}

fn executive_summary(
    client_id: i64,
    metrics: &InsightMetrics,
    risk: RiskLevel,
    opportunity: OpportunityLevel,
) -> String {
    let mut parts = vec![format!("Automated analysis for client #{client_id}.")];

    let mut processed = Vec::new();
    if metrics.text_records > 0 {
        processed.push(format!("{} text analyses", metrics.text_records));
    }
    if metrics.kpis_analyzed > 0 {
        processed.push(format!("{} KPIs", metrics.kpis_analyzed));
    }
    if metrics.trends_detected > 0 {
        processed.push(format!("{} trends", metrics.trends_detected));
    }
    if !processed.is_empty() {
        parts.push(format!("Processed: {}.", processed.join(", ")));
    }

    parts.push(format!("Risk level: {}.", risk.as_str().to_uppercase()));
    parts.push(format!(
        "Opportunity level: {}.",
        opportunity.as_str().to_uppercase()
    ));
    parts.join(" ")
}

/// Fuse already-loaded artifacts into an insight. Pure.
#[must_use]
pub fn synthesize(
    client_id: i64,
    days_back: i64,
    texts: &[TextRecord],
    kpis: &[KpiRecord],
    trends: &[TrendSignal],
    generated_at: DateTime<Utc>,
) -> Insight {
    let metrics = InsightMetrics {
        text_records: texts.len(),
        kpis_analyzed: kpis.len(),
        trends_detected: trends.len(),
        analysis_period_days: days_back,
    };

    if texts.is_empty() && kpis.is_empty() && trends.is_empty() {
        return Insight {
            id: None,
            client_id,
            summary_text: INSUFFICIENT_DATA_SUMMARY.to_string(),
            key_findings: Vec::new(),
            risk_level: RiskLevel::Unknown,
            opportunity_level: OpportunityLevel::Unknown,
            metrics,
            generated_at,
        };
    }

    let findings: Vec<Finding> = [
        sentiment_finding(texts),
        kpi_finding(kpis),
        trend_finding(trends),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut risks = Vec::new();
    let mut opportunities = Vec::new();
    for finding in &findings {
        match finding.effect {
            Effect::Risk(severity) => risks.push(severity),
            Effect::Opportunity(strength) => opportunities.push(strength),
            Effect::Neutral => {}
        }
    }

    let risk = risk_level(&risks);
    let opportunity = opportunity_level(&opportunities);

    Insight {
        id: None,
        client_id,
        summary_text: executive_summary(client_id, &metrics, risk, opportunity),
        key_findings: findings.into_iter().map(|f| f.text).collect(),
        risk_level: risk,
        opportunity_level: opportunity,
        metrics,
        generated_at,
    }
}

#[derive(Clone)]
pub struct InsightGenerator {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl InsightGenerator {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Build the insight for `client_id` over the last `days_back` days.
    /// Trend signals are market-wide and not filtered by client.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if `days_back` is not positive, or
    /// [`EngineError::Store`] if any artifact cannot be read.
    pub async fn generate(&self, client_id: i64, days_back: i64) -> Result<Insight, EngineError> {
        if days_back <= 0 {
            return Err(EngineError::Validation(format!(
                "days_back must be positive, got {days_back}"
            )));
        }

        let now = self.clock.now();
        let since = now - Duration::days(days_back);

        let texts = self.store.list_text_records(Some(client_id), None, since).await?;
        let kpis = self.store.list_kpis(client_id, since).await?;
        let trends = self
            .store
            .list_trend_signals(since, TREND_SIGNAL_LIMIT)
            .await?;

        let insight = synthesize(client_id, days_back, &texts, &kpis, &trends, now);
        if insight.risk_level == RiskLevel::Unknown {
            tracing::warn!(client_id, "not enough data for insights");
        } else {
            tracing::info!(
                client_id,
                findings = insight.key_findings.len(),
                risk = %insight.risk_level,
                opportunity = %insight.opportunity_level,
                "insight generated"
            );
        }
        Ok(insight)
    }

    /// Upsert keyed by (client, calendar day). Returns `false` after logging
    /// a store failure.
    pub async fn persist(&self, insight: &Insight) -> bool {
        match self.store.upsert_insight(insight).await {
            Ok((outcome, id)) => {
                tracing::debug!(client_id = insight.client_id, id, ?outcome, "insight persisted");
                true
            }
            Err(e) => {
                tracing::error!(
                    client_id = insight.client_id,
                    error = %e,
                    "failed to persist insight"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn texts(positive: usize, negative: usize, neutral: usize) -> Vec<TextRecord> {
        let labels = std::iter::repeat_n(SentimentLabel::Positive, positive)
            .chain(std::iter::repeat_n(SentimentLabel::Negative, negative))
            .chain(std::iter::repeat_n(SentimentLabel::Neutral, neutral));
        labels
            .zip(1..)
            .map(|(label, id)| TextRecord {
                id,
                client_id: 1,
                source_record_id: None,
                raw_text: String::new(),
                sentiment_label: label,
                polarity: 0.0,
                keywords: Vec::new(),
                sector: None,
                created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            })
            .collect()
    }

    fn kpi(name: &str, value: f64) -> KpiRecord {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        KpiRecord {
            id: 0,
            client_id: 1,
            kpi_name: name.to_string(),
            kpi_value: value,
            period_start: t,
            period_end: t,
            calculated_at: t,
        }
    }

    #[test]
    fn sentiment_bands() {
        assert_eq!(sentiment_finding(&texts(1, 8, 1)).unwrap().effect, Effect::Risk(3));
        assert_eq!(sentiment_finding(&texts(2, 6, 2)).unwrap().effect, Effect::Risk(2));
        assert_eq!(
            sentiment_finding(&texts(9, 1, 0)).unwrap().effect,
            Effect::Opportunity(3)
        );
        assert_eq!(
            sentiment_finding(&texts(7, 3, 0)).unwrap().effect,
            Effect::Opportunity(2)
        );
        assert_eq!(sentiment_finding(&texts(5, 5, 0)).unwrap().effect, Effect::Neutral);
        assert!(sentiment_finding(&[]).is_none());
    }

    #[test]
    fn most_sampled_kpi_ties_break_by_name() {
        let records = vec![kpi("visits", 200.0), kpi("visits", 100.0), kpi("orders", 10.0), kpi("orders", 10.0)];
        let finding = kpi_finding(&records).unwrap();
        assert!(finding.text.contains("orders"));
        assert_eq!(finding.effect, Effect::Neutral);
    }

    #[test]
    fn kpi_drop_is_a_risk() {
        let records: Vec<KpiRecord> = [50.0, 100.0, 100.0, 100.0, 100.0]
            .iter()
            .map(|v| kpi("ventas", *v))
            .collect();
        let finding = kpi_finding(&records).unwrap();
        assert_eq!(finding.effect, Effect::Risk(2));
        assert!(finding.text.contains("44.4"));

        let surge: Vec<KpiRecord> = [400.0, 100.0].iter().map(|v| kpi("ventas", *v)).collect();
        assert_eq!(kpi_finding(&surge).unwrap().effect, Effect::Opportunity(3));
    }

    #[test]
    fn single_kpi_sample_is_neutral() {
        let finding = kpi_finding(&[kpi("ventas", 12.5)]).unwrap();
        assert_eq!(finding.effect, Effect::Neutral);
        assert!(finding.text.contains("12.50"));
    }

    #[test]
    fn levels_follow_average() {
        assert_eq!(risk_level(&[]), RiskLevel::Low);
        assert_eq!(risk_level(&[2]), RiskLevel::Medium);
        assert_eq!(risk_level(&[2, 3]), RiskLevel::High);
        assert_eq!(risk_level(&[3, 3]), RiskLevel::Critical);
        assert_eq!(opportunity_level(&[]), OpportunityLevel::Low);
        assert_eq!(opportunity_level(&[2]), OpportunityLevel::Medium);
        assert_eq!(opportunity_level(&[3]), OpportunityLevel::High);
    }

    #[test]
    fn risk_never_drops_as_negative_share_grows() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let mut previous = RiskLevel::Unknown;
        for negative in 4..=8 {
            let records = texts(10 - negative, negative, 0);
            let insight = synthesize(1, 7, &records, &[], &[], now);
            assert!(insight.risk_level >= previous);
            previous = insight.risk_level;
        }
        assert_eq!(previous, RiskLevel::Critical);
    }

    #[test]
    fn no_artifacts_gives_unknown_levels() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let insight = synthesize(3, 7, &[], &[], &[], now);
        assert_eq!(insight.risk_level, RiskLevel::Unknown);
        assert_eq!(insight.opportunity_level, OpportunityLevel::Unknown);
        assert!(insight.key_findings.is_empty());
        assert_eq!(insight.summary_text, INSUFFICIENT_DATA_SUMMARY);
    }
}
