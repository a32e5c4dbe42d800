use thiserror::Error;

/// Failures of the external-model strategy.
///
/// None of these reach callers of [`crate::TextAnalyzer`]; they trigger the
/// rule-based fallback.
#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model call timed out after {0} ms")]
    Timeout(u128),

    #[error("model error: {0}")]
    Model(String),
}
