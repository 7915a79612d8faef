//! Hierarchical summarization.
//!
//! Level-1 summaries condense batches of fragments; each higher level
//! condenses the summaries one level below it, building a tree whose
//! height is capped by config. Summaries are embedded synchronously at
//! creation, unlike fragments, because an unembedded summary would be
//! invisible to abstractive retrieval.

use crate::cypher;
use chrono::Utc;
use magpie_types::error::EngineResult;
use magpie_types::model::SummaryId;
use serde_json::json;
use tracing::{debug, info, warn};

/// Deterministic stand-in when generation fails or returns nothing.
pub(crate) fn fallback_summary(joined: &str) -> String {
    let head: String = joined.chars().take(200).collect();
    format!("Summary: {head}...")
}

fn summary_prompt(texts: &[String]) -> String {
    let mut prompt = String::from(
        "Condense the following notes into one short paragraph that keeps \
         every concrete fact:\n\n",
    );
    for text in texts {
        prompt.push_str("- ");
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt
}

impl crate::MemoryEngine {
    /// Condense one batch of nodes at `level` into a summary one level
    /// above: level 0 selects fragments and produces a level-1 summary.
    /// Returns None when the un-summarized backlog is below the minimum
    /// batch size.
    ///
    /// Generation failures degrade to a truncation fallback, but an
    /// embedding failure is returned as an error and leaves the batch
    /// untouched for the next pass.
    pub async fn summarize_once(&self, level: u32) -> EngineResult<Option<SummaryId>> {
        let limit = self.config.summarizer.batch_limit as i64;
        let rows = if level == 0 {
            self.store
                .run(cypher::SELECT_UNSUMMARIZED_FRAGMENTS, &json!({"limit": limit}))
                .await?
        } else {
            self.store
                .run(
                    cypher::SELECT_UNSUMMARIZED_SUMMARIES,
                    &json!({"level": level, "limit": limit}),
                )
                .await?
        };

        if rows.len() < self.config.summarizer.min_batch {
            debug!(level, backlog = rows.len(), "Backlog below batch minimum");
            return Ok(None);
        }

        let mut child_ids = Vec::with_capacity(rows.len());
        let mut texts = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            child_ids.push(rows.str_val(i, "id")?);
            texts.push(rows.str_val(i, "text")?);
        }

        let text = match self.generator.generate(&summary_prompt(&texts)).await {
            Ok(response) if !response.trim().is_empty() => response.trim().to_string(),
            Ok(_) => {
                warn!(level, "Generator returned an empty summary, using fallback");
                fallback_summary(&texts.join(" "))
            }
            Err(e) => {
                warn!(error = %e, level, "Generation failed, using fallback summary");
                fallback_summary(&texts.join(" "))
            }
        };

        let embedding = self.embedder.embed(&text).await?;

        let id = SummaryId::new();
        let statement = if level == 0 {
            cypher::CREATE_SUMMARY_OVER_FRAGMENTS
        } else {
            cypher::CREATE_SUMMARY_OVER_SUMMARIES
        };
        self.store
            .run(
                statement,
                &json!({
                    "id": id.to_string(),
                    "text": text,
                    "embedding": embedding,
                    "level": level + 1,
                    "created_at": Utc::now().to_rfc3339(),
                    "child_ids": child_ids,
                }),
            )
            .await?;

        info!(summary = %id, level = level + 1, children = child_ids.len(), "Created summary");
        Ok(Some(id))
    }

    /// Drive every summary level once, bottom-up. Returns the number of
    /// summaries created.
    pub async fn run_summarizer(&self) -> EngineResult<usize> {
        let mut created = 0;
        for level in 0..self.config.summarizer.max_level {
            if self.summarize_once(level).await?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }
}
