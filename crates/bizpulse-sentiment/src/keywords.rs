//! Frequency-ranked keyword extraction.

use std::collections::HashMap;

use crate::scorer::tokenize;

/// Default number of keywords kept per text record.
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

/// Minimum keyword length, in characters.
pub const MIN_KEYWORD_CHARS: usize = 3;

/// English and Spanish function words never reported as keywords.
pub const STOPWORDS: &[&str] = &[
    // English
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "can", "this",
    "that", "these", "those", "not", "very", "our", "your", "their", "they", "them",
    "there", "here", "what", "when", "which", "who", "how", "all", "any", "some", "just",
    "also", "than", "then", "too", "its", "you", "she", "his", "her", "him",
    "about", "into", "over", "after", "before", "again", "only", "more", "most", "such",
    // Spanish
    "el", "la", "los", "las", "un", "una", "unos", "unas", "y", "o", "pero", "en", "de",
    "del", "al", "para", "con", "por", "que", "es", "son", "está", "están", "ser", "muy",
    "sin", "sobre", "entre", "como", "más", "menos", "este", "esta", "estos", "estas",
    "ese", "esa", "esos", "esas", "fue", "era", "hay", "sus", "nos", "les", "todo",
    "todos", "también", "cuando", "donde", "porque", "pues", "ya", "nada", "algo",
];

/// Whether `word` (lowercase) is a stopword.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Extract up to `max_k` keywords from `text`.
///
/// Keywords are lowercase letter runs of at least [`MIN_KEYWORD_CHARS`]
/// characters that are not stopwords, ranked by frequency with ties broken
/// by first occurrence.
#[must_use]
pub fn extract_keywords(text: &str, max_k: usize) -> Vec<String> {
    if max_k == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let candidates = tokenize(text)
        .into_iter()
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS && !is_stopword(w));
    for (position, word) in candidates.enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(max_k);
    ranked.into_iter().map(|(word, _, _)| word).collect()
}

/// Normalise keyword candidates produced by an external model.
///
/// Trims surrounding punctuation, lowercases, drops stopwords and short
/// entries, removes duplicates, and keeps at most `max_k`.
#[must_use]
pub fn filter_candidates<I, S>(candidates: I, max_k: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        let term = candidate
            .as_ref()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if term.chars().count() < MIN_KEYWORD_CHARS || is_stopword(&term) {
            continue;
        }
        if !out.contains(&term) {
            out.push(term);
        }
        if out.len() == max_k {
            break;
        }
    }
    out.truncate(max_k);
    out
}
