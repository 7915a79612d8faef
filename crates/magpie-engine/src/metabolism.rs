//! Background maintenance loop.
//!
//! One cycle performs the single most urgent piece of work it can find:
//! pending embeddings starve retrieval directly so they come first,
//! dissonance checks second, and only an otherwise-idle cycle spends time
//! on summarization. The outcome decides the sleep before the next cycle,
//! so a busy queue is drained at the short interval while an idle engine
//! settles into the long one.

use crate::cypher;
use chrono::Utc;
use magpie_types::error::EngineResult;
use magpie_types::model::{ConsolidationReport, HeartbeatRecord, QueueDepths};
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// What one metabolism cycle accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A pending embedding was processed or abandoned.
    Embedded,
    /// A fragment went through a dissonance check.
    Checked,
    /// No queued work existed; summarization had its turn.
    Idle,
}

impl crate::MemoryEngine {
    /// Run one prioritized metabolism cycle.
    ///
    /// The idle branch also merges the heartbeat record, so a quiet loop
    /// still proves its liveness once per long interval.
    pub async fn metabolize_once(&self) -> EngineResult<CycleOutcome> {
        if self.embed_one_pending().await? {
            return Ok(CycleOutcome::Embedded);
        }
        if self.check_one().await? {
            return Ok(CycleOutcome::Checked);
        }
        let summaries = self.run_summarizer().await?;
        self.heartbeat("active").await?;
        debug!(summaries, "Idle cycle complete");
        Ok(CycleOutcome::Idle)
    }

    /// Foreground consolidation: drain one embedding, one dissonance
    /// check, and one full summarizer pass, without waiting for the loop.
    pub async fn consolidate_once(&self) -> EngineResult<ConsolidationReport> {
        let embedded = self.embed_one_pending().await?;
        let checked = self.check_one().await?;
        let summaries_created = self.run_summarizer().await?;
        Ok(ConsolidationReport {
            embedded,
            checked,
            summaries_created,
        })
    }

    /// Merge the singleton liveness record.
    pub async fn heartbeat(&self, status: &str) -> EngineResult<()> {
        self.store
            .run(
                cypher::HEARTBEAT_MERGE,
                &json!({"now": Utc::now().to_rfc3339(), "status": status}),
            )
            .await?;
        Ok(())
    }

    /// Read the liveness record, if any loop has ever written one.
    pub async fn read_heartbeat(&self) -> EngineResult<Option<HeartbeatRecord>> {
        let rows = self.store.run(cypher::HEARTBEAT_READ, &json!({})).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(HeartbeatRecord {
            last_seen: rows.str_val(0, "last_seen")?,
            status: rows.str_val(0, "status")?,
        }))
    }

    /// Depth of every work queue, for status reporting.
    pub async fn queue_depths(&self) -> EngineResult<QueueDepths> {
        let pending_embeddings = self
            .store
            .run(cypher::COUNT_PENDING, &json!({}))
            .await?
            .single_i64("n")? as u64;
        let unchecked = self
            .store
            .run(cypher::COUNT_UNCHECKED, &json!({}))
            .await?
            .single_i64("n")? as u64;
        let unsummarized = self
            .store
            .run(cypher::COUNT_UNSUMMARIZED, &json!({}))
            .await?
            .single_i64("n")? as u64;
        let flagged = self
            .store
            .run(cypher::COUNT_FLAGGED, &json!({}))
            .await?
            .single_i64("n")? as u64;
        Ok(QueueDepths {
            pending_embeddings,
            unchecked,
            unsummarized,
            flagged,
        })
    }
}

/// The background loop. Owns an engine handle and runs cycles until the
/// shutdown channel flips.
pub struct Metabolism {
    engine: crate::MemoryEngine,
    shutdown: watch::Receiver<bool>,
    short: Duration,
    medium: Duration,
    long: Duration,
}

impl Metabolism {
    /// Bind a loop to an engine and a shutdown signal. Intervals come from
    /// the engine's configuration.
    pub fn new(engine: crate::MemoryEngine, shutdown: watch::Receiver<bool>) -> Self {
        let intervals = &engine.config.metabolism;
        let short = Duration::from_secs(intervals.short_interval_secs);
        let medium = Duration::from_secs(intervals.medium_interval_secs);
        let long = Duration::from_secs(intervals.long_interval_secs);
        Self {
            engine,
            shutdown,
            short,
            medium,
            long,
        }
    }

    /// Run until shutdown. A failed cycle logs and backs off for a full
    /// long interval; the loop never exits on a transient failure.
    pub async fn run(mut self) {
        info!("Metabolism loop started");
        loop {
            let sleep = match self.engine.metabolize_once().await {
                Ok(CycleOutcome::Embedded) => self.short,
                Ok(CycleOutcome::Checked) => self.medium,
                Ok(CycleOutcome::Idle) => self.long,
                Err(e) => {
                    error!(error = %e, "Metabolism cycle failed");
                    self.long
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = self.shutdown.changed() => {
                    info!("Metabolism loop stopping");
                    break;
                }
            }
        }
    }

    /// Spawn the loop onto the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{setup, setup_with};
    use magpie_types::config::EngineConfig;
    use magpie_types::model::Role;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_cycle_priority_order() {
        let h = setup();
        h.embedder.learn("first note", vec![1.0, 0.0]);
        h.embedder.learn("second note", vec![0.0, 1.0]);
        h.engine.ingest("first note", &Role::User, None).await.unwrap();
        h.engine.ingest("second note", &Role::User, None).await.unwrap();

        let mut outcomes = Vec::new();
        for _ in 0..5 {
            outcomes.push(h.engine.metabolize_once().await.unwrap());
        }

        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::Embedded,
                CycleOutcome::Embedded,
                CycleOutcome::Checked,
                CycleOutcome::Checked,
                CycleOutcome::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_idle_cycle_merges_heartbeat() {
        let h = setup();
        assert!(h.engine.read_heartbeat().await.unwrap().is_none());

        assert_eq!(h.engine.metabolize_once().await.unwrap(), CycleOutcome::Idle);

        let beat = h.engine.read_heartbeat().await.unwrap().unwrap();
        assert_eq!(beat.status, "active");
        assert!(!beat.last_seen.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_surfaces_store_failure() {
        let h = setup();
        h.graph.fail.store(true, Ordering::SeqCst);
        assert!(h.engine.metabolize_once().await.is_err());
    }

    #[tokio::test]
    async fn test_consolidate_once_reports_each_stage() {
        let h = setup();
        for text in ["alpha note", "beta note", "gamma note"] {
            h.engine.ingest(text, &Role::User, None).await.unwrap();
        }

        let report = h.engine.consolidate_once().await.unwrap();

        assert!(report.embedded);
        assert!(report.checked);
        assert_eq!(report.summaries_created, 1);
    }

    #[tokio::test]
    async fn test_queue_depths() {
        let h = setup();
        for text in ["alpha note", "beta note", "gamma note"] {
            h.engine.ingest(text, &Role::User, None).await.unwrap();
        }
        h.engine.embed_one_pending().await.unwrap();
        h.engine.embed_one_pending().await.unwrap();
        {
            let mut state = h.graph.state.lock().unwrap();
            state.fragments[0].dissonance_checked = Some(true);
            state.fragments[0].dissonance_flagged = Some(true);
        }

        let depths = h.engine.queue_depths().await.unwrap();

        assert_eq!(depths.pending_embeddings, 1);
        assert_eq!(depths.unchecked, 1);
        assert_eq!(depths.unsummarized, 3);
        assert_eq!(depths.flagged, 1);
    }

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.metabolism.short_interval_secs = 1;
        config.metabolism.medium_interval_secs = 1;
        config.metabolism.long_interval_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_loop_runs_a_cycle_then_stops_on_shutdown() {
        let h = setup_with(fast_config());
        h.embedder.learn("first note", vec![1.0, 0.0]);
        h.engine.ingest("first note", &Role::User, None).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Metabolism::new(h.engine.clone(), shutdown_rx).spawn();

        // Let the first cycle run, then signal shutdown during its sleep
        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let state = h.graph.state.lock().unwrap();
            assert!(!state.fragments[0].embedding_pending);
        }
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_survives_store_failure() {
        let h = setup_with(fast_config());
        h.graph.fail.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Metabolism::new(h.engine.clone(), shutdown_rx).spawn();

        // The failing cycle must back off and keep the loop alive
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop on shutdown")
            .unwrap();
    }
}
