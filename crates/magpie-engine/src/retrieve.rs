//! Fusion retrieval across episodic, abstractive, and relational memory.

use crate::cypher;
use crate::extract;
use magpie_types::error::EngineResult;
use magpie_types::model::RecallBundle;
use serde_json::json;
use tracing::debug;

/// Abstractive strategy depth. Summaries already compress many fragments,
/// so two is plenty next to the episodic hits.
const SUMMARY_TOP_K: usize = 2;

impl crate::MemoryEngine {
    /// Recall memories relevant to a query.
    ///
    /// Full mode fuses three strategies: vector search over fragments
    /// (episodic), vector search over summaries (abstractive), and one-hop
    /// entity neighbors (relational). Fast mode skips the embedding call
    /// entirely and returns relational facts only. The three lists stay
    /// separate in the bundle; ranking across strategies is the caller's
    /// decision.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        fast: bool,
    ) -> EngineResult<RecallBundle> {
        let mut bundle = RecallBundle::default();

        if !fast {
            let embedding = self.embedder.embed(query).await?;

            let rows = self
                .store
                .run(
                    cypher::EPISODIC_SEARCH,
                    &json!({"k": top_k, "embedding": embedding}),
                )
                .await?;
            for i in 0..rows.len() {
                bundle.episodic.push(rows.str_val(i, "text")?);
            }

            let rows = self
                .store
                .run(
                    cypher::ABSTRACTIVE_SEARCH,
                    &json!({"k": SUMMARY_TOP_K, "embedding": embedding}),
                )
                .await?;
            for i in 0..rows.len() {
                bundle.abstractive.push(rows.str_val(i, "text")?);
            }
        }

        let names = extract::extract_entities(query);
        if !names.is_empty() {
            let rows = self
                .store
                .run(
                    cypher::RELATIONAL_FACTS,
                    &json!({"names": names, "limit": self.config.relational_cap}),
                )
                .await?;
            for i in 0..rows.len() {
                let source = rows.str_val(i, "source")?;
                let target = rows.str_val(i, "target")?;
                bundle
                    .relational
                    .push(format!("{source} is related to {target}"));
            }
        }

        debug!(
            episodic = bundle.episodic.len(),
            abstractive = bundle.abstractive.len(),
            relational = bundle.relational.len(),
            fast,
            "Recall bundle assembled"
        );
        Ok(bundle)
    }
}
