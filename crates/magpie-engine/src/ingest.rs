//! Ingestion: fragment creation, entity linking, and the deferred
//! embedding queue.

use crate::cypher;
use crate::extract;
use chrono::Utc;
use magpie_types::error::{EngineError, EngineResult};
use magpie_types::model::{FragmentId, Role};
use serde_json::json;
use tracing::{debug, info, warn};

fn normalize_names(provided: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = provided
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

impl crate::MemoryEngine {
    /// Store a fragment and link its entities into the graph.
    ///
    /// The embedding is deferred: the fragment is created with
    /// `embedding_pending` set and picked up later by the metabolism loop,
    /// so ingestion itself never calls a model service. Explicitly provided
    /// entities win over the extraction heuristic. Every ingest ends with a
    /// prune pass so the graph never accumulates weak edges between writes.
    pub async fn ingest(
        &self,
        text: &str,
        role: &Role,
        entities: Option<Vec<String>>,
    ) -> EngineResult<FragmentId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput("empty fragment text".to_string()));
        }

        let id = FragmentId::new();
        self.store
            .run(
                cypher::CREATE_FRAGMENT,
                &json!({
                    "id": id.to_string(),
                    "text": text,
                    "role": role.as_str(),
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        let names = match entities {
            Some(provided) => normalize_names(provided),
            None => extract::extract_entities(text),
        };

        for name in &names {
            self.store
                .run(
                    cypher::MERGE_ENTITY_MENTION,
                    &json!({"fragment_id": id.to_string(), "name": name}),
                )
                .await?;
        }

        for (a, b) in extract::entity_pairs(&names) {
            self.store
                .run(
                    cypher::MERGE_RELATED_PAIR,
                    &json!({
                        "a": a,
                        "b": b,
                        "initial": self.config.initial_weight,
                        "increment": self.config.weight_increment,
                    }),
                )
                .await?;
        }

        let report = self.prune(None).await?;

        info!(
            fragment = %id,
            entities = names.len(),
            edges_removed = report.edges_removed,
            "Ingested fragment"
        );
        Ok(id)
    }

    /// Delete a fragment and its relationships, then drop any entities the
    /// deletion left without a single edge.
    pub async fn forget(&self, id: &FragmentId) -> EngineResult<()> {
        let rows = self
            .store
            .run(cypher::FORGET_FRAGMENT, &json!({"id": id.to_string()}))
            .await?;
        if rows.single_i64("removed")? == 0 {
            return Err(EngineError::FragmentNotFound(id.to_string()));
        }

        let rows = self
            .store
            .run(cypher::PRUNE_ORPHAN_ENTITIES, &json!({}))
            .await?;
        let orphans = rows.single_i64("removed")?;
        if orphans > 0 {
            debug!(orphans, "Removed entities orphaned by forget");
        }

        info!(fragment = %id, "Forgot fragment");
        Ok(())
    }

    /// Rewrite a fragment's text. Every derived field resets so the
    /// metabolism loop re-embeds and re-checks the new text from scratch.
    pub async fn update(&self, id: &FragmentId, text: &str) -> EngineResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput("empty fragment text".to_string()));
        }

        let rows = self
            .store
            .run(
                cypher::UPDATE_FRAGMENT,
                &json!({"id": id.to_string(), "text": text}),
            )
            .await?;
        if rows.single_i64("updated")? == 0 {
            return Err(EngineError::FragmentNotFound(id.to_string()));
        }

        info!(fragment = %id, "Updated fragment");
        Ok(())
    }

    /// Process one fragment from the embedding queue. Returns true when a
    /// pending fragment existed, whether or not embedding succeeded; false
    /// means the queue is empty.
    pub async fn embed_one_pending(&self) -> EngineResult<bool> {
        let rows = self
            .store
            .run(cypher::SELECT_PENDING_EMBEDDING, &json!({}))
            .await?;
        if rows.is_empty() {
            return Ok(false);
        }
        let id = rows.str_val(0, "id")?;
        let text = rows.str_val(0, "text")?;

        match self.embedder.embed(&text).await {
            Ok(embedding) => {
                self.store
                    .run(
                        cypher::STORE_EMBEDDING,
                        &json!({"id": id, "embedding": embedding}),
                    )
                    .await?;
                debug!(fragment = %id, "Stored embedding");
            }
            Err(e) => {
                let rows = self
                    .store
                    .run(cypher::RECORD_EMBED_FAILURE, &json!({"id": id}))
                    .await?;
                let attempts = rows.single_i64("fail_count")?;
                warn!(error = %e, fragment = %id, attempts, "Embedding failed");
                if attempts >= i64::from(self.config.embed_fail_cap) {
                    warn!(fragment = %id, "Abandoning fragment embedding");
                    self.store
                        .run(cypher::ABANDON_EMBEDDING, &json!({"id": id}))
                        .await?;
                }
            }
        }
        Ok(true)
    }
}
