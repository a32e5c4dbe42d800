//! Strategy selection with bounded external calls and rule-based fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bizpulse_core::{AppConfig, SentimentResult};

use crate::error::SentimentError;
use crate::keywords::{extract_keywords, filter_candidates};
use crate::model::{OllamaClient, TextModel};
use crate::scorer::rule_based_sentiment;
use crate::types::ModelConfig;

/// Default hard bound on one external-model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(15);

/// Sentiment and keyword analysis behind one contract.
///
/// With a model configured, each call goes to the model first and falls back
/// to the rule-based strategy on error or timeout. Without one, only the
/// rule-based strategy runs.
#[derive(Clone)]
pub struct TextAnalyzer {
    model: Option<Arc<dyn TextModel>>,
    timeout: Duration,
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl std::fmt::Debug for TextAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextAnalyzer")
            .field("model", &self.model.as_ref().map(|_| "configured"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TextAnalyzer {
    #[must_use]
    pub fn rule_based() -> Self {
        Self {
            model: None,
            timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_model(model: Arc<dyn TextModel>, timeout: Duration) -> Self {
        Self {
            model: Some(model),
            timeout,
        }
    }

    /// Uses an [`OllamaClient`] when `BIZPULSE_MODEL_URL` is configured.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        match ModelConfig::from_app_config(config) {
            Some(model_config) => {
                let timeout = model_config.timeout;
                Self::with_model(Arc::new(OllamaClient::new(model_config)), timeout)
            }
            None => Self::rule_based(),
        }
    }

    #[must_use]
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, SentimentError>
    where
        F: Future<Output = Result<T, SentimentError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| Err(SentimentError::Timeout(self.timeout.as_millis())))
    }

    /// Score `text`. Empty or whitespace-only text is neutral.
    pub async fn analyze(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return SentimentResult::neutral();
        }

        if let Some(model) = &self.model {
            match self.bounded(model.classify_sentiment(text)).await {
                Ok(result) => return SentimentResult::from_polarity(result.polarity),
                Err(e) => {
                    tracing::warn!(error = %e, "model sentiment failed, using rule-based scorer");
                }
            }
        }

        rule_based_sentiment(text)
    }

    /// Extract at most `max_k` keywords from `text`.
    pub async fn keywords(&self, text: &str, max_k: usize) -> Vec<String> {
        if max_k == 0 || text.trim().is_empty() {
            return Vec::new();
        }

        if let Some(model) = &self.model {
            match self.bounded(model.extract_terms(text, max_k)).await {
                Ok(terms) => {
                    let terms = filter_candidates(terms, max_k);
                    if !terms.is_empty() {
                        return terms;
                    }
                    tracing::debug!("model returned no usable keywords, using frequency ranking");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "model keyword extraction failed, using frequency ranking");
                }
            }
        }

        extract_keywords(text, max_k)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bizpulse_core::SentimentLabel;

    use super::*;

    struct FixedModel;

    #[async_trait]
    impl TextModel for FixedModel {
        async fn classify_sentiment(&self, _text: &str) -> Result<SentimentResult, SentimentError> {
            Ok(SentimentResult::from_polarity(-0.7))
        }

        async fn extract_terms(
            &self,
            _text: &str,
            _max_k: usize,
        ) -> Result<Vec<String>, SentimentError> {
            Ok(vec!["Shipping".to_string(), "the".to_string(), "warranty".to_string()])
        }
    }

    struct FailingModel;

    #[async_trait]
    impl TextModel for FailingModel {
        async fn classify_sentiment(&self, _text: &str) -> Result<SentimentResult, SentimentError> {
            Err(SentimentError::Model("unavailable".to_string()))
        }

        async fn extract_terms(
            &self,
            _text: &str,
            _max_k: usize,
        ) -> Result<Vec<String>, SentimentError> {
            Err(SentimentError::Model("unavailable".to_string()))
        }
    }

    struct StalledModel;

    #[async_trait]
    impl TextModel for StalledModel {
        async fn classify_sentiment(&self, _text: &str) -> Result<SentimentResult, SentimentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(SentimentResult::from_polarity(-1.0))
        }

        async fn extract_terms(
            &self,
            _text: &str,
            _max_k: usize,
        ) -> Result<Vec<String>, SentimentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec!["never".to_string()])
        }
    }

    #[tokio::test]
    async fn rule_based_analyzer_scores_text() {
        let analyzer = TextAnalyzer::rule_based();
        assert!(!analyzer.has_model());
        let result = analyzer.analyze("excellent and fast service").await;
        assert_eq!(result.label, SentimentLabel::Positive);
    }

    #[tokio::test]
    async fn blank_text_skips_the_model() {
        let analyzer = TextAnalyzer::with_model(Arc::new(FixedModel), Duration::from_secs(1));
        assert_eq!(analyzer.analyze("  ").await, SentimentResult::neutral());
        assert!(analyzer.keywords(" ", 10).await.is_empty());
    }

    #[tokio::test]
    async fn model_result_is_used_when_available() {
        let analyzer = TextAnalyzer::with_model(Arc::new(FixedModel), Duration::from_secs(1));
        let result = analyzer.analyze("excellent").await;
        assert_eq!(result.label, SentimentLabel::Negative);

        let keywords = analyzer.keywords("anything at all", 10).await;
        assert_eq!(keywords, vec!["shipping", "warranty"]);
    }

    #[tokio::test]
    async fn failing_model_falls_back_to_rules() {
        let analyzer = TextAnalyzer::with_model(Arc::new(FailingModel), Duration::from_secs(1));
        let result = analyzer.analyze("excellent").await;
        assert_eq!(result.label, SentimentLabel::Positive);

        let keywords = analyzer.keywords("refund refund delay", 10).await;
        assert_eq!(keywords, vec!["refund", "delay"]);
    }

    #[tokio::test]
    async fn stalled_model_is_bounded_by_timeout() {
        let analyzer =
            TextAnalyzer::with_model(Arc::new(StalledModel), Duration::from_millis(20));
        let started = std::time::Instant::now();
        let result = analyzer.analyze("excellent").await;
        let keywords = analyzer.keywords("refund refund delay", 10).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.label, SentimentLabel::Positive);
        assert_eq!(keywords, vec!["refund", "delay"]);
    }
}
