//! Turns pending raw text into analysed text records.

use std::sync::Arc;

use bizpulse_core::{Clock, NewTextRecord, RawRecord, RecordStore};
use bizpulse_sentiment::{TextAnalyzer, DEFAULT_MAX_KEYWORDS};
use serde::Serialize;

use crate::error::EngineError;

/// Stored text is cut to this many characters.
pub const MAX_STORED_TEXT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextBatchSummary {
    pub processed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct TextProcessor {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    analyzer: Arc<TextAnalyzer>,
}

impl TextProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        analyzer: Arc<TextAnalyzer>,
    ) -> Self {
        Self {
            store,
            clock,
            analyzer,
        }
    }

    /// Analyse up to `limit` of the client's unprocessed text records.
    ///
    /// A record that fails to store is logged and counted; the batch goes on.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the pending records cannot be read.
    pub async fn process_client(
        &self,
        client_id: i64,
        limit: i64,
    ) -> Result<TextBatchSummary, EngineError> {
        let pending = self
            .store
            .list_pending_text_sources(client_id, limit)
            .await?;
        if pending.is_empty() {
            tracing::debug!(client_id, "no pending text records");
            return Ok(TextBatchSummary::default());
        }

        let mut summary = TextBatchSummary::default();
        for raw in &pending {
            let Some(record) = self.analyse(raw).await else {
                continue;
            };
            match self.store.insert_text_record(&record).await {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        client_id,
                        raw_record_id = raw.id,
                        error = %e,
                        "failed to store text record"
                    );
                }
            }
        }

        tracing::info!(
            client_id,
            processed = summary.processed,
            failed = summary.failed,
            model = self.analyzer.has_model(),
            "text records analysed"
        );
        Ok(summary)
    }

    async fn analyse(&self, raw: &RawRecord) -> Option<NewTextRecord> {
        let text = raw.text_field()?;
        let sentiment = self.analyzer.analyze(text).await;
        let keywords = self.analyzer.keywords(text, DEFAULT_MAX_KEYWORDS).await;

        Some(NewTextRecord {
            client_id: raw.client_id,
            source_record_id: Some(raw.id),
            raw_text: truncate_chars(text, MAX_STORED_TEXT_CHARS),
            sentiment,
            keywords,
            sector: raw.sector().map(str::to_string),
            created_at: self.clock.now(),
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
