//! Relationship decay.
//!
//! Edge weights never decay in place; an edge keeps the weight
//! reinforcement gave it until a prune pass finds it at or below the
//! threshold and cuts it. Entities that lose their last edge go with it.

use crate::cypher;
use magpie_types::error::EngineResult;
use magpie_types::model::PruneReport;
use serde_json::json;
use tracing::{debug, info};

impl crate::MemoryEngine {
    /// Remove weak relationships, then any entities left fully
    /// disconnected. `threshold` of None uses the configured default.
    pub async fn prune(&self, threshold: Option<f64>) -> EngineResult<PruneReport> {
        let threshold = threshold.unwrap_or(self.config.prune_threshold);

        let rows = self
            .store
            .run(cypher::PRUNE_WEAK_EDGES, &json!({"threshold": threshold}))
            .await?;
        let edges_removed = rows.single_i64("removed")? as u64;

        let rows = self
            .store
            .run(cypher::PRUNE_ORPHAN_ENTITIES, &json!({}))
            .await?;
        let entities_removed = rows.single_i64("removed")? as u64;

        if edges_removed > 0 || entities_removed > 0 {
            info!(edges_removed, entities_removed, threshold, "Pruned graph");
        } else {
            debug!(threshold, "Nothing to prune");
        }

        Ok(PruneReport {
            edges_removed,
            entities_removed,
        })
    }
}
