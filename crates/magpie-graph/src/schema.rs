//! Store-side schema: vector indexes and the entity uniqueness constraint.

use crate::GraphStore;
use serde_json::json;
use tracing::{info, warn};

/// Vector index over fragment embeddings, queried by episodic retrieval.
pub const FRAGMENT_INDEX: &str = "fragment_embeddings";

/// Vector index over summary embeddings, queried by abstractive retrieval.
pub const SUMMARY_INDEX: &str = "summary_embeddings";

// Entity nodes are addressed by name everywhere, so the name is the identity.
const ENTITY_NAME_CONSTRAINT: &str =
    "CREATE CONSTRAINT entity_name_unique IF NOT EXISTS FOR (e:Entity) REQUIRE e.name IS UNIQUE";

// Index DDL does not accept query parameters, so dimensions go inline.
fn vector_index_statement(name: &str, label: &str, dims: usize) -> String {
    format!(
        "CREATE VECTOR INDEX {name} IF NOT EXISTS FOR (n:{label}) ON (n.embedding) \
         OPTIONS {{indexConfig: {{`vector.dimensions`: {dims}, \
         `vector.similarity_function`: 'cosine'}}}}"
    )
}

/// Apply all schema statements, warning on failures instead of aborting.
///
/// Every statement is `IF NOT EXISTS`, so re-running against an initialized
/// store is a no-op. Returns true when every statement succeeded; a false
/// return leaves the engine usable for everything except vector search.
pub async fn init_schema(store: &GraphStore, dims: usize) -> bool {
    let statements = [
        vector_index_statement(FRAGMENT_INDEX, "Fragment", dims),
        vector_index_statement(SUMMARY_INDEX, "Summary", dims),
        ENTITY_NAME_CONSTRAINT.to_string(),
    ];

    let mut ok = true;
    for statement in &statements {
        if let Err(e) = store.run(statement, &json!({})).await {
            warn!(error = %e, "Schema statement failed");
            ok = false;
        }
    }

    if ok {
        info!(dims, "Graph schema ready");
    }
    ok
}
