//! Dissonance detection and resolution.
//!
//! Newly embedded fragments are compared against their nearest stored
//! memories by the generation service acting as a consistency judge. The
//! judge clears a fragment only by answering with the single word
//! CONSISTENT; any other answer flags the fragment and keeps the verbatim
//! answer as the report. Resolution is always an explicit caller decision,
//! never automatic.

use crate::cypher;
use magpie_types::error::{EngineError, EngineResult, GraphError};
use magpie_types::model::{DissonanceAction, DissonanceCase, FragmentId};
use serde_json::json;
use tracing::{debug, info, warn};

/// Stored memories consulted as context for one check.
const CONTEXT_K: usize = 3;

/// True only for an exact affirmation. A substring check would read the
/// CONSISTENT inside "INCONSISTENT" as a pass.
fn is_affirmation(response: &str) -> bool {
    response
        .trim()
        .trim_end_matches('.')
        .eq_ignore_ascii_case("CONSISTENT")
}

fn judge_prompt(text: &str, context: &[String]) -> String {
    let mut prompt = String::from(
        "You are a consistency judge. Compare the new memory against the \
         established memories. If the new memory contradicts none of them, \
         answer with the single word CONSISTENT. Otherwise describe the \
         contradiction in one sentence.\n\nEstablished memories:\n",
    );
    for item in context {
        prompt.push_str("- ");
        prompt.push_str(item);
        prompt.push('\n');
    }
    prompt.push_str("\nNew memory:\n");
    prompt.push_str(text);
    prompt
}

impl crate::MemoryEngine {
    /// Check one fragment from the dissonance queue. Returns true when the
    /// queue had a fragment to work on, false when it was empty.
    ///
    /// A model service failure mid-check follows the configured policy:
    /// mark the fragment checked and unflagged so the queue keeps
    /// draining, or leave it queued for a retry next cycle.
    pub async fn check_one(&self) -> EngineResult<bool> {
        let rows = self.store.run(cypher::SELECT_UNCHECKED, &json!({})).await?;
        if rows.is_empty() {
            return Ok(false);
        }
        let id = rows.str_val(0, "id")?;
        let text = rows.str_val(0, "text")?;

        match self.judge(&id, &text).await {
            Ok(report) => {
                let flagged = report.is_some();
                self.store
                    .run(
                        cypher::MARK_CHECKED,
                        &json!({"id": id, "flagged": flagged, "report": report}),
                    )
                    .await?;
                if flagged {
                    info!(fragment = %id, "Flagged dissonant fragment");
                }
                Ok(true)
            }
            Err(EngineError::Service(e)) => {
                if self.config.dissonance.mark_checked_on_failure {
                    warn!(error = %e, fragment = %id, "Check failed, marking checked unflagged");
                    self.store
                        .run(
                            cypher::MARK_CHECKED,
                            &json!({"id": id, "flagged": false, "report": Option::<String>::None}),
                        )
                        .await?;
                } else {
                    warn!(error = %e, fragment = %id, "Check failed, leaving fragment queued");
                }
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Judge one fragment against its nearest neighbors. None means
    /// consistent; Some carries the judge's contradiction report.
    async fn judge(&self, id: &str, text: &str) -> EngineResult<Option<String>> {
        let embedding = self.embedder.embed(text).await?;
        let rows = self
            .store
            .run(
                cypher::EPISODIC_CONTEXT,
                &json!({"k": CONTEXT_K, "embedding": embedding, "exclude": id}),
            )
            .await?;

        let mut context = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            context.push(rows.str_val(i, "text")?);
        }
        if context.is_empty() {
            // First memory of its kind has nothing to contradict.
            debug!(fragment = %id, "No stored context, vacuously consistent");
            return Ok(None);
        }

        let response = self.generator.generate(&judge_prompt(text, &context)).await?;
        if is_affirmation(&response) {
            Ok(None)
        } else {
            Ok(Some(response.trim().to_string()))
        }
    }

    /// Apply a reviewer's decision to a flagged fragment.
    pub async fn resolve_dissonance(
        &self,
        id: &FragmentId,
        action: &DissonanceAction,
    ) -> EngineResult<()> {
        match action {
            DissonanceAction::Accept => {
                let rows = self
                    .store
                    .run(cypher::ACCEPT_DISSONANCE, &json!({"id": id.to_string()}))
                    .await?;
                if rows.single_i64("updated")? == 0 {
                    return Err(EngineError::FragmentNotFound(id.to_string()));
                }
                info!(fragment = %id, "Accepted flagged fragment");
                Ok(())
            }
            DissonanceAction::Reject => self.forget(id).await,
            DissonanceAction::Update { text } => self.update(id, text).await,
        }
    }

    /// All fragments currently flagged for review, oldest first.
    pub async fn list_dissonance(&self) -> EngineResult<Vec<DissonanceCase>> {
        let rows = self.store.run(cypher::LIST_FLAGGED, &json!({})).await?;
        let mut cases = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            let fragment_id: FragmentId = rows
                .str_val(i, "id")?
                .parse()
                .map_err(|e| GraphError::Decode(format!("bad fragment id: {e}")))?;
            cases.push(DissonanceCase {
                fragment_id,
                text: rows.str_val(i, "text")?,
                report: rows.opt_str_val(i, "report")?,
            });
        }
        Ok(cases)
    }
}
