//! Artifact and input record types shared by every pipeline stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// Polarity above this is labelled positive.
pub const POSITIVE_THRESHOLD: f64 = 0.2;
/// Polarity below this is labelled negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.2;

/// Fields of a raw record that may carry free text, tried in order.
pub const TEXT_FIELD_CANDIDATES: &[&str] = &["text", "comment", "description", "review"];

// ---------------------------------------------------------------------------
// Sentiment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Label a polarity using the fixed ±0.2 thresholds.
    #[must_use]
    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > POSITIVE_THRESHOLD {
            Self::Positive
        } else if polarity < NEGATIVE_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(CoreError::InvalidSentimentLabel(other.to_string())),
        }
    }
}

/// Result of scoring one text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    /// Always within `[-1.0, 1.0]`.
    pub polarity: f64,
}

impl SentimentResult {
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            polarity: 0.0,
        }
    }

    /// Clamp `polarity` into `[-1.0, 1.0]` and derive the label from it.
    ///
    /// Non-finite input is treated as `0.0`.
    #[must_use]
    pub fn from_polarity(polarity: f64) -> Self {
        let polarity = if polarity.is_finite() {
            polarity.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Self {
            label: SentimentLabel::from_polarity(polarity),
            polarity,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw input records
// ---------------------------------------------------------------------------

/// A generic tabular record ingested for a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub client_id: i64,
    pub source_type: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl RawRecord {
    /// First non-blank text field, checked in [`TEXT_FIELD_CANDIDATES`] order.
    #[must_use]
    pub fn text_field(&self) -> Option<&str> {
        TEXT_FIELD_CANDIDATES.iter().find_map(|key| {
            self.data
                .get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
    }

    #[must_use]
    pub fn sector(&self) -> Option<&str> {
        self.data
            .get("sector")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Text records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub id: i64,
    pub client_id: i64,
    pub source_record_id: Option<i64>,
    pub raw_text: String,
    pub sentiment_label: SentimentLabel,
    pub polarity: f64,
    /// Frequency-ranked, at most ten entries.
    pub keywords: Vec<String>,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTextRecord {
    pub client_id: i64,
    pub source_record_id: Option<i64>,
    pub raw_text: String,
    pub sentiment: SentimentResult,
    pub keywords: Vec<String>,
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// KPIs
// ---------------------------------------------------------------------------

/// Identity key: (`client_id`, `kpi_name`, `period_start`, `period_end`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub id: i64,
    pub client_id: i64,
    pub kpi_name: String,
    pub kpi_value: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewKpi {
    pub client_id: i64,
    pub kpi_name: String,
    pub kpi_value: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStatus {
    /// Rising momentum (`delta_pct >= +50`).
    Emergent,
    Stable,
    /// Falling momentum (`delta_pct <= -30`).
    Declining,
}

impl TrendStatus {
    pub const RISING_THRESHOLD: f64 = 50.0;
    pub const FALLING_THRESHOLD: f64 = -30.0;

    #[must_use]
    pub fn classify(delta_pct: f64) -> Self {
        if delta_pct >= Self::RISING_THRESHOLD {
            Self::Emergent
        } else if delta_pct <= Self::FALLING_THRESHOLD {
            Self::Declining
        } else {
            Self::Stable
        }
    }

    #[must_use]
    pub fn is_significant(self) -> bool {
        !matches!(self, Self::Stable)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergent => "emergent",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emergent" | "rising" => Ok(Self::Emergent),
            "stable" => Ok(Self::Stable),
            "declining" | "falling" => Ok(Self::Declining),
            other => Err(CoreError::InvalidTrendStatus(other.to_string())),
        }
    }
}

/// A trend row computed by detection, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendCandidate {
    pub sector: String,
    pub term: String,
    /// Mentions across the long window.
    pub frequency: i64,
    pub freq_short: i64,
    pub freq_long: i64,
    pub delta_pct: f64,
    pub status: TrendStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub id: i64,
    pub sector: String,
    pub term: String,
    pub frequency: i64,
    pub delta_pct: f64,
    pub status: TrendStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metadata: Value,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

/// Ordered so that a larger value is never a lesser risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Only produced when there is no data to judge.
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(CoreError::InvalidRiskLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityLevel {
    /// Only produced when there is no data to judge.
    Unknown,
    Low,
    Medium,
    High,
}

impl OpportunityLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for OpportunityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpportunityLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(CoreError::InvalidOpportunityLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightMetrics {
    pub text_records: usize,
    pub kpis_analyzed: usize,
    pub trends_detected: usize,
    pub analysis_period_days: i64,
}

/// Identity key: (`client_id`, calendar day of `generated_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// `None` until persisted.
    pub id: Option<i64>,
    pub client_id: i64,
    pub summary_text: String,
    pub key_findings: Vec<String>,
    pub risk_level: RiskLevel,
    pub opportunity_level: OpportunityLevel,
    pub metrics: InsightMetrics,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_label_thresholds_are_exclusive() {
        assert_eq!(SentimentLabel::from_polarity(0.2), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_polarity(0.21), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_polarity(-0.2), SentimentLabel::Neutral);
        assert_eq!(
            SentimentLabel::from_polarity(-0.21),
            SentimentLabel::Negative
        );
    }

    #[test]
    fn sentiment_result_clamps_polarity() {
        assert_eq!(SentimentResult::from_polarity(3.0).polarity, 1.0);
        assert_eq!(SentimentResult::from_polarity(-3.0).polarity, -1.0);
        assert_eq!(SentimentResult::from_polarity(f64::NAN), SentimentResult::neutral());
    }

    #[test]
    fn trend_status_boundaries() {
        assert_eq!(TrendStatus::classify(50.0), TrendStatus::Emergent);
        assert_eq!(TrendStatus::classify(49.9), TrendStatus::Stable);
        assert_eq!(TrendStatus::classify(-30.0), TrendStatus::Declining);
        assert_eq!(TrendStatus::classify(-29.9), TrendStatus::Stable);
    }

    #[test]
    fn trend_status_accepts_rising_and_falling_aliases() {
        assert_eq!("rising".parse::<TrendStatus>().unwrap(), TrendStatus::Emergent);
        assert_eq!("falling".parse::<TrendStatus>().unwrap(), TrendStatus::Declining);
        assert!("sideways".parse::<TrendStatus>().is_err());
    }

    #[test]
    fn risk_levels_are_ordered_by_severity() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn raw_record_text_field_prefers_candidates_in_order() {
        let mut data = Map::new();
        data.insert("description".into(), Value::from("from description"));
        data.insert("text".into(), Value::from("   "));
        data.insert("comment".into(), Value::from("from comment"));
        let record = RawRecord {
            id: 1,
            client_id: 1,
            source_type: "review".into(),
            data,
            created_at: Utc::now(),
        };
        assert_eq!(record.text_field(), Some("from comment"));
    }

    #[test]
    fn raw_record_sector_ignores_blank_values() {
        let mut data = Map::new();
        data.insert("sector".into(), Value::from("  "));
        let record = RawRecord {
            id: 1,
            client_id: 1,
            source_type: "sales".into(),
            data,
            created_at: Utc::now(),
        };
        assert_eq!(record.sector(), None);
    }
}
