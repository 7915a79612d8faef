//! Session recording: append-only per-session message logs, kept apart
//! from the fragment graph until a session digest is explicitly ingested.

use crate::cypher;
use chrono::Utc;
use magpie_types::error::{EngineError, EngineResult};
use magpie_types::model::{FragmentId, LoggedMessage, Role, SessionId};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

fn digest_prompt(transcript: &str) -> String {
    format!(
        "Summarize this conversation in one short paragraph that keeps every \
         concrete fact and decision:\n\n{transcript}"
    )
}

impl crate::MemoryEngine {
    /// Open a named recording session.
    pub async fn session_start(&self, name: &str) -> EngineResult<SessionId> {
        let id = SessionId::new();
        self.store
            .run(
                cypher::SESSION_START,
                &json!({
                    "id": id.to_string(),
                    "name": name,
                    "now": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        info!(session = %id, name, "Started session");
        Ok(id)
    }

    /// Append one turn to an active session.
    pub async fn session_append(
        &self,
        session: &SessionId,
        role: &Role,
        text: &str,
    ) -> EngineResult<()> {
        let rows = self
            .store
            .run(
                cypher::SESSION_APPEND,
                &json!({
                    "session_id": session.to_string(),
                    "id": Uuid::new_v4().to_string(),
                    "role": role.as_str(),
                    "text": text,
                    "now": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        if rows.is_empty() {
            return Err(EngineError::SessionNotFound(session.to_string()));
        }
        Ok(())
    }

    /// Close a session. With `ingest_digest` the transcript is condensed
    /// and stored as a system fragment, so the conversation survives in
    /// long-term memory; without it the raw log simply stops growing.
    pub async fn session_end(
        &self,
        session: &SessionId,
        ingest_digest: bool,
    ) -> EngineResult<Option<FragmentId>> {
        let messages = self.session_log(session).await?;

        let rows = self
            .store
            .run(
                cypher::SESSION_END,
                &json!({
                    "id": session.to_string(),
                    "now": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        if rows.single_i64("updated")? == 0 {
            return Err(EngineError::SessionNotFound(session.to_string()));
        }

        if !ingest_digest || messages.is_empty() {
            info!(session = %session, messages = messages.len(), "Ended session");
            return Ok(None);
        }

        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n");

        let digest = match self.generator.generate(&digest_prompt(&transcript)).await {
            Ok(response) if !response.trim().is_empty() => response.trim().to_string(),
            Ok(_) => crate::summarize::fallback_summary(&transcript),
            Err(e) => {
                warn!(error = %e, session = %session, "Digest generation failed, using fallback");
                crate::summarize::fallback_summary(&transcript)
            }
        };

        let fragment = self.ingest(&digest, &Role::System, None).await?;
        info!(session = %session, fragment = %fragment, "Ended session with digest");
        Ok(Some(fragment))
    }

    /// Full message log of a session, oldest first.
    pub async fn session_log(&self, session: &SessionId) -> EngineResult<Vec<LoggedMessage>> {
        let rows = self
            .store
            .run(cypher::SESSION_LOG, &json!({"id": session.to_string()}))
            .await?;
        let mut messages = Vec::with_capacity(rows.len());
        for i in 0..rows.len() {
            messages.push(LoggedMessage {
                role: rows.str_val(i, "role")?.parse()?,
                text: rows.str_val(i, "text")?,
                created_at: rows.str_val(i, "created_at")?,
            });
        }
        Ok(messages)
    }
}
