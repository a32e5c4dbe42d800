//! External-model strategy over the Ollama `/api/generate` protocol.

use async_trait::async_trait;
use bizpulse_core::SentimentResult;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::SentimentError;
use crate::keywords::filter_candidates;
use crate::types::ModelConfig;

/// Characters of input text included in a prompt.
const PROMPT_TEXT_CHARS: usize = 500;

/// Polarity assigned to a "positive" model reply; negated for "negative".
pub const MODEL_POLARITY: f64 = 0.7;

/// A text model that can replace the rule-based strategy.
///
/// Implementations may fail or stall; [`crate::TextAnalyzer`] bounds every
/// call and falls back on error.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn classify_sentiment(&self, text: &str) -> Result<SentimentResult, SentimentError>;

    async fn extract_terms(&self, text: &str, max_k: usize) -> Result<Vec<String>, SentimentError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for an Ollama-compatible service.
///
/// The underlying `reqwest::Client` is built on first use.
pub struct OllamaClient {
    config: ModelConfig,
    client: OnceCell<reqwest::Client>,
}

impl OllamaClient {
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, SentimentError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .timeout(self.config.timeout)
                    .build()
                    .map_err(SentimentError::from)
            })
            .await
    }

    async fn generate(&self, prompt: &str) -> Result<String, SentimentError> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response = self.client().await?.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(SentimentError::Model(format!(
                "model service returned status {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }
}

fn prompt_excerpt(text: &str) -> String {
    text.chars().take(PROMPT_TEXT_CHARS).collect()
}

/// Map a free-form sentiment reply onto a polarity.
///
/// The first sentiment word decides. A negated one ("not positive") reads as
/// neutral.
#[must_use]
pub fn polarity_from_reply(reply: &str) -> f64 {
    let reply = reply.to_lowercase();
    let mut negated = false;
    for word in reply.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
        let polarity = match word {
            "not" | "no" | "isn" | "t" | "neither" | "nor" => {
                negated = true;
                continue;
            }
            "positive" => MODEL_POLARITY,
            "negative" => -MODEL_POLARITY,
            "neutral" => return 0.0,
            _ => {
                negated = false;
                continue;
            }
        };
        return if negated { 0.0 } else { polarity };
    }
    0.0
}

#[async_trait]
impl TextModel for OllamaClient {
    async fn classify_sentiment(&self, text: &str) -> Result<SentimentResult, SentimentError> {
        let prompt = format!(
            "Analyze the sentiment of this text and respond ONLY with one word: \
             positive, negative, or neutral.\nText: {}\nSentiment:",
            prompt_excerpt(text)
        );
        let reply = self.generate(&prompt).await?;
        Ok(SentimentResult::from_polarity(polarity_from_reply(&reply)))
    }

    async fn extract_terms(&self, text: &str, max_k: usize) -> Result<Vec<String>, SentimentError> {
        let prompt = format!(
            "Extract at most {max_k} keywords (nouns or named entities) from this text. \
             Respond ONLY with a comma-separated list.\nText: {}\nKeywords:",
            prompt_excerpt(text)
        );
        let reply = self.generate(&prompt).await?;
        Ok(filter_candidates(reply.split([',', '\n']), max_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_mapping() {
        assert!((polarity_from_reply("Positive.") - 0.7).abs() < f64::EPSILON);
        assert!((polarity_from_reply(" negative\n") + 0.7).abs() < f64::EPSILON);
        assert!(polarity_from_reply("neutral").abs() < f64::EPSILON);
        assert!(polarity_from_reply("I cannot tell").abs() < f64::EPSILON);
    }

    #[test]
    fn negated_sentiment_word_is_neutral() {
        assert!(polarity_from_reply("not positive").abs() < f64::EPSILON);
        assert!(polarity_from_reply("It isn't negative.").abs() < f64::EPSILON);
        assert!(polarity_from_reply("neither positive nor negative").abs() < f64::EPSILON);
    }

    #[test]
    fn first_sentiment_word_wins() {
        assert!((polarity_from_reply("Sentiment: negative, not positive") + 0.7).abs() < f64::EPSILON);
        assert!(polarity_from_reply("neutral (slightly positive)").abs() < f64::EPSILON);
        assert!((polarity_from_reply("positives outweigh; positive") - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn prompt_excerpt_is_char_bounded() {
        let text = "ñ".repeat(600);
        assert_eq!(prompt_excerpt(&text).chars().count(), PROMPT_TEXT_CHARS);
    }
}
