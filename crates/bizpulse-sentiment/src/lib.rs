//! Sentiment scoring and keyword extraction for short business texts.
//!
//! Two strategies share one contract: a bilingual lexicon scorer with
//! frequency-ranked keywords, and an optional Ollama-compatible model whose
//! calls are time-bounded and fall back to the lexicon path on failure.

pub mod analyzer;
pub mod error;
pub mod keywords;
pub mod model;
pub mod scorer;
pub mod types;

pub use analyzer::{TextAnalyzer, DEFAULT_MODEL_TIMEOUT};
pub use error::SentimentError;
pub use keywords::{extract_keywords, filter_candidates, is_stopword, DEFAULT_MAX_KEYWORDS};
pub use model::{OllamaClient, TextModel};
pub use scorer::rule_based_sentiment;
pub use types::ModelConfig;
