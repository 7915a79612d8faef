//! Memory orchestration engine.
//!
//! `MemoryEngine` ties a graph store to the model services and carries all
//! memory semantics: ingestion and linking, relationship decay, hierarchical
//! summarization, dissonance detection, fusion retrieval, and session
//! recording. The background half lives in [`metabolism`].
//!
//! The engine holds no locks and no in-process queues. All coordination
//! happens through the store: writes are idempotent and queued work is
//! selected by flag columns, so any number of engine handles (or separate
//! processes) can run against one database.

pub mod drivers;
pub mod extract;
pub mod metabolism;

mod dissonance;
mod ingest;
mod prune;
mod retrieve;
mod session;
mod summarize;

pub(crate) mod cypher;

#[cfg(test)]
pub(crate) mod testing;

pub use drivers::{EmbeddingDriver, GenerationDriver, OllamaDriver};
pub use metabolism::{CycleOutcome, Metabolism};

use magpie_graph::GraphStore;
use magpie_types::config::{EngineConfig, GraphProfile, ModelConfig};
use magpie_types::error::EngineResult;
use std::sync::Arc;

/// Handle to one memory graph plus the model services that feed it.
///
/// Cloning is cheap; clones share the store transport and drivers.
#[derive(Clone)]
pub struct MemoryEngine {
    pub(crate) store: GraphStore,
    pub(crate) embedder: Arc<dyn EmbeddingDriver>,
    pub(crate) generator: Arc<dyn GenerationDriver>,
    pub(crate) config: EngineConfig,
}

impl MemoryEngine {
    /// Connect to a graph profile and model host.
    pub fn connect(
        profile: &GraphProfile,
        models: &ModelConfig,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let store = GraphStore::connect(profile)?;
        let driver = Arc::new(OllamaDriver::new(models)?);
        Ok(Self::new(store, driver.clone(), driver, config))
    }

    /// Assemble an engine from parts.
    pub fn new(
        store: GraphStore,
        embedder: Arc<dyn EmbeddingDriver>,
        generator: Arc<dyn GenerationDriver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            config,
        }
    }

    /// The underlying graph store, for schema setup and raw queries.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Engine configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
