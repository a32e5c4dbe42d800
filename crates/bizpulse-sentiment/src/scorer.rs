//! Rule-based bilingual (English/Spanish) sentiment scorer.

use std::sync::LazyLock;

use bizpulse_core::SentimentResult;
use regex::Regex;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{L}+").expect("valid regex"));

/// Weight applied to a sentiment word preceded by an intensifier.
pub const INTENSIFIER_WEIGHT: f64 = 1.5;

pub(crate) const POSITIVE_WORDS: &[&str] = &[
    // English
    "excellent", "good", "great", "fantastic", "amazing", "perfect", "better", "best",
    "positive", "success", "successful", "win", "benefit", "advantage", "love", "loved",
    "happy", "satisfied", "recommend", "friendly", "fast", "helpful", "awesome",
    "wonderful", "pleasant", "quality", "growth",
    // Spanish
    "excelente", "bueno", "buena", "buenos", "buenas", "genial", "fantástico",
    "fantástica", "increíble", "perfecto", "perfecta", "mejor", "positivo", "positiva",
    "éxito", "ganar", "beneficio", "ventaja", "encanta", "feliz", "satisfecho",
    "satisfecha", "recomiendo", "rápido", "rápida", "amable", "calidad", "crecimiento",
];

pub(crate) const NEGATIVE_WORDS: &[&str] = &[
    // English
    "bad", "terrible", "horrible", "awful", "problem", "error", "worse", "worst",
    "negative", "failure", "fail", "failed", "lose", "loss", "risk", "disadvantage",
    "hate", "slow", "broken", "rude", "angry", "disappointed", "disappointing",
    "complaint", "poor", "expensive", "late",
    // Spanish
    "malo", "mala", "malos", "malas", "pésimo", "pésima", "problema", "peor",
    "negativo", "negativa", "fracaso", "perder", "pérdida", "riesgo", "desventaja",
    "odio", "lento", "lenta", "roto", "grosero", "enojado", "decepcionado",
    "decepcionante", "queja", "caro", "cara", "tarde",
];

pub(crate) const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nor", "without", "isn", "wasn", "didn", "doesn", "dont",
    "nunca", "jamás", "tampoco", "sin", "ni",
];

pub(crate) const INTENSIFIERS: &[&str] = &[
    "very", "really", "extremely", "so", "super", "highly", "too", "incredibly",
    "absolutely", "muy", "realmente", "súper", "demasiado", "tan", "bastante",
    "extremadamente", "sumamente",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Positive,
    Negative,
}

fn tone_of(word: &str) -> Option<Tone> {
    if POSITIVE_WORDS.contains(&word) {
        Some(Tone::Positive)
    } else if NEGATIVE_WORDS.contains(&word) {
        Some(Tone::Negative)
    } else {
        None
    }
}

/// Lowercased letter runs of `text`.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Score `text` against the bilingual lexicons.
///
/// A sentiment word directly preceded by an intensifier counts
/// [`INTENSIFIER_WEIGHT`] times. A negation directly before the word (or
/// before its intensifier) flips its tone. The polarity is
/// `(pos - neg) / (pos + neg)`, or `0.0` when no sentiment word matched.
#[must_use]
pub fn rule_based_sentiment(text: &str) -> SentimentResult {
    if text.trim().is_empty() {
        return SentimentResult::neutral();
    }

    let tokens = tokenize(text);
    let mut positive = 0.0_f64;
    let mut negative = 0.0_f64;

    for (i, token) in tokens.iter().enumerate() {
        let Some(tone) = tone_of(token) else {
            continue;
        };

        let prev = i.checked_sub(1).map(|j| tokens[j].as_str());
        let intensified = prev.is_some_and(|p| INTENSIFIERS.contains(&p));
        let negation_at = if intensified { i.checked_sub(2) } else { i.checked_sub(1) };
        let negated = negation_at.is_some_and(|j| NEGATIONS.contains(&tokens[j].as_str()));

        let weight = if intensified { INTENSIFIER_WEIGHT } else { 1.0 };
        let tone = match (tone, negated) {
            (Tone::Positive, true) => Tone::Negative,
            (Tone::Negative, true) => Tone::Positive,
            (tone, false) => tone,
        };
        match tone {
            Tone::Positive => positive += weight,
            Tone::Negative => negative += weight,
        }
    }

    let total = positive + negative;
    if total <= 0.0 {
        return SentimentResult::neutral();
    }
    SentimentResult::from_polarity((positive - negative) / total)
}

#[cfg(test)]
mod tests {
    use bizpulse_core::SentimentLabel;

    use super::*;

    #[test]
    fn empty_and_whitespace_are_neutral() {
        assert_eq!(rule_based_sentiment(""), SentimentResult::neutral());
        assert_eq!(rule_based_sentiment("   \n\t"), SentimentResult::neutral());
    }

    #[test]
    fn unknown_words_are_neutral() {
        let result = rule_based_sentiment("the invoice was sent on tuesday");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert!(result.polarity.abs() < f64::EPSILON);
    }

    #[test]
    fn english_positive_text() {
        let result = rule_based_sentiment("Great service and excellent food!");
        assert_eq!(result.label, SentimentLabel::Positive);
        assert!((result.polarity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn spanish_negative_text() {
        let result = rule_based_sentiment("Servicio pésimo, muy lento y caro");
        assert_eq!(result.label, SentimentLabel::Negative);
        assert!((result.polarity + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn negation_flips_the_next_word() {
        let result = rule_based_sentiment("the food was not good");
        assert_eq!(result.label, SentimentLabel::Negative);
    }

    #[test]
    fn negation_reaches_through_an_intensifier() {
        let result = rule_based_sentiment("no muy bueno");
        assert_eq!(result.label, SentimentLabel::Negative);
    }

    #[test]
    fn intensifier_tips_a_balanced_text() {
        // 1.5 positive vs 1.0 negative -> 0.5 / 2.5 = 0.2, which stays neutral.
        let result = rule_based_sentiment("very good but slow");
        assert!((result.polarity - 0.2).abs() < 1e-9);
        assert_eq!(result.label, SentimentLabel::Neutral);

        // 3.0 positive vs 1.0 negative -> 0.5
        let result = rule_based_sentiment("very good, really fast, but slow");
        assert!((result.polarity - 0.5).abs() < 1e-9);
        assert_eq!(result.label, SentimentLabel::Positive);
    }

    #[test]
    fn mixed_text_is_neutral() {
        let result = rule_based_sentiment("good food, bad parking");
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert!(result.polarity.abs() < f64::EPSILON);
    }

    #[test]
    fn polarity_and_label_stay_consistent() {
        let samples = [
            "excelente",
            "not bad at all",
            "terrible terrible good",
            "muy muy bueno pero tarde",
            "never late, never rude, always friendly",
            "¡Increíble! pero el precio es caro y la entrega tarde",
            "🙂 ok",
            "no no no no",
        ];
        for text in samples {
            let result = rule_based_sentiment(text);
            assert!((-1.0..=1.0).contains(&result.polarity), "{text}");
            let expected = if result.polarity > 0.2 {
                SentimentLabel::Positive
            } else if result.polarity < -0.2 {
                SentimentLabel::Negative
            } else {
                SentimentLabel::Neutral
            };
            assert_eq!(result.label, expected, "{text}");
        }
    }
}
