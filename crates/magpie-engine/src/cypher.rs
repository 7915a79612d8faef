//! Cypher statements used by the engine.
//!
//! Every statement is parameterized and safe to retry: writes are idempotent
//! MERGEs or are gated on a flag column that the write itself clears, so two
//! processes running the same statement converge instead of conflicting.

// --- ingestion ---

/// Create a fragment with its embedding deferred to the metabolism loop.
pub const CREATE_FRAGMENT: &str = "CREATE (f:Fragment {id: $id, text: $text, role: $role, \
     created_at: datetime($created_at), embedding_pending: true, embedding_fail_count: 0})";

/// Attach one mentioned entity to a fragment, creating the entity if new.
pub const MERGE_ENTITY_MENTION: &str = "MATCH (f:Fragment {id: $fragment_id}) \
     MERGE (e:Entity {name: $name}) MERGE (f)-[:MENTIONS]->(e)";

/// Reinforce a co-occurrence edge. First sighting seeds the initial weight;
/// every repeat adds the increment. The undirected MERGE keeps one edge per
/// pair regardless of mention order.
pub const MERGE_RELATED_PAIR: &str = "MATCH (a:Entity {name: $a}), (b:Entity {name: $b}) \
     MERGE (a)-[r:RELATED_TO]-(b) \
     ON CREATE SET r.weight = $initial \
     ON MATCH SET r.weight = r.weight + $increment";

// --- decay ---

/// Delete edges at or below the weight threshold. The directed match visits
/// each edge exactly once, so the returned count is accurate.
pub const PRUNE_WEAK_EDGES: &str = "MATCH ()-[r:RELATED_TO]->() WHERE r.weight <= $threshold \
     DELETE r RETURN count(r) AS removed";

/// Delete entities left with no mentions and no relations.
pub const PRUNE_ORPHAN_ENTITIES: &str = "MATCH (e:Entity) \
     WHERE NOT (e)<-[:MENTIONS]-() AND NOT (e)-[:RELATED_TO]-() \
     DETACH DELETE e RETURN count(e) AS removed";

// --- embedding queue ---

pub const SELECT_PENDING_EMBEDDING: &str = "MATCH (f:Fragment) WHERE f.embedding_pending = true \
     RETURN f.id AS id, f.text AS text LIMIT 1";

/// Store an embedding and clear the pending flag in one write.
pub const STORE_EMBEDDING: &str = "MATCH (f:Fragment {id: $id}) \
     SET f.embedding = $embedding, f.embedding_pending = false, f.embedding_fail_count = 0";

pub const RECORD_EMBED_FAILURE: &str = "MATCH (f:Fragment {id: $id}) \
     SET f.embedding_fail_count = coalesce(f.embedding_fail_count, 0) + 1 \
     RETURN f.embedding_fail_count AS fail_count";

/// Give up on a fragment: clearing the flag without an embedding removes it
/// from both the embedding queue and, because the dissonance selector
/// requires an embedding, the dissonance queue.
pub const ABANDON_EMBEDDING: &str = "MATCH (f:Fragment {id: $id}) SET f.embedding_pending = false";

// --- dissonance queue ---

/// Next unchecked fragment. Requires a stored embedding so abandoned
/// fragments never enter the queue.
pub const SELECT_UNCHECKED: &str = "MATCH (f:Fragment) \
     WHERE f.dissonance_checked IS NULL AND f.embedding_pending = false \
     AND f.embedding IS NOT NULL \
     RETURN f.id AS id, f.text AS text LIMIT 1";

pub const MARK_CHECKED: &str = "MATCH (f:Fragment {id: $id}) \
     SET f.dissonance_checked = true, f.dissonance_flagged = $flagged, \
     f.dissonance_report = $report";

pub const ACCEPT_DISSONANCE: &str = "MATCH (f:Fragment {id: $id}) \
     SET f.dissonance_flagged = false, f.dissonance_report = null \
     RETURN count(f) AS updated";

pub const LIST_FLAGGED: &str = "MATCH (f:Fragment) WHERE f.dissonance_flagged = true \
     RETURN f.id AS id, f.text AS text, f.dissonance_report AS report \
     ORDER BY f.created_at";

// --- summarization ---

/// Fragments not yet covered by any summary.
pub const SELECT_UNSUMMARIZED_FRAGMENTS: &str = "MATCH (f:Fragment) WHERE NOT (f)<-[:SUMMARIZES]-() \
     RETURN f.id AS id, f.text AS text LIMIT $limit";

/// Summaries at one level not yet covered by a higher-level summary.
pub const SELECT_UNSUMMARIZED_SUMMARIES: &str = "MATCH (s:Summary {level: $level}) \
     WHERE NOT (s)<-[:SUMMARIZES]-() \
     RETURN s.id AS id, s.text AS text LIMIT $limit";

/// Create a summary node then link it to its children. The CREATE runs
/// before the child MATCH so exactly one summary exists however many
/// children match.
pub const CREATE_SUMMARY_OVER_FRAGMENTS: &str = "CREATE (s:Summary {id: $id, text: $text, embedding: $embedding, level: $level, \
     created_at: datetime($created_at)}) \
     WITH s MATCH (f:Fragment) WHERE f.id IN $child_ids MERGE (s)-[:SUMMARIZES]->(f)";

pub const CREATE_SUMMARY_OVER_SUMMARIES: &str = "CREATE (s:Summary {id: $id, text: $text, embedding: $embedding, level: $level, \
     created_at: datetime($created_at)}) \
     WITH s MATCH (c:Summary) WHERE c.id IN $child_ids MERGE (s)-[:SUMMARIZES]->(c)";

// --- retrieval ---

pub const EPISODIC_SEARCH: &str = "CALL db.index.vector.queryNodes('fragment_embeddings', $k, $embedding) \
     YIELD node, score RETURN node.text AS text, score ORDER BY score DESC";

/// Episodic search that excludes one fragment, used to gather context
/// around a fragment without matching the fragment itself.
pub const EPISODIC_CONTEXT: &str = "CALL db.index.vector.queryNodes('fragment_embeddings', $k, $embedding) \
     YIELD node, score WHERE node.id <> $exclude \
     RETURN node.text AS text, score ORDER BY score DESC";

pub const ABSTRACTIVE_SEARCH: &str = "CALL db.index.vector.queryNodes('summary_embeddings', $k, $embedding) \
     YIELD node, score RETURN node.text AS text, score ORDER BY score DESC";

/// One-hop neighbors of the named entities.
pub const RELATIONAL_FACTS: &str = "MATCH (e:Entity)-[:RELATED_TO]-(n:Entity) WHERE e.name IN $names \
     RETURN DISTINCT e.name AS source, n.name AS target LIMIT $limit";

// --- fragment maintenance ---

pub const FORGET_FRAGMENT: &str = "MATCH (f:Fragment {id: $id}) DETACH DELETE f RETURN count(f) AS removed";

/// Rewrite a fragment's text and reset every derived field so the
/// metabolism loop re-embeds and re-checks it from scratch.
pub const UPDATE_FRAGMENT: &str = "MATCH (f:Fragment {id: $id}) \
     SET f.text = $text, f.embedding = null, f.embedding_pending = true, \
     f.embedding_fail_count = 0, f.dissonance_checked = null, \
     f.dissonance_flagged = null, f.dissonance_report = null \
     RETURN count(f) AS updated";

// --- queue depths ---

pub const COUNT_PENDING: &str = "MATCH (f:Fragment) WHERE f.embedding_pending = true RETURN count(f) AS n";

pub const COUNT_UNCHECKED: &str = "MATCH (f:Fragment) \
     WHERE f.dissonance_checked IS NULL AND f.embedding_pending = false \
     AND f.embedding IS NOT NULL \
     RETURN count(f) AS n";

pub const COUNT_UNSUMMARIZED: &str = "MATCH (f:Fragment) WHERE NOT (f)<-[:SUMMARIZES]-() RETURN count(f) AS n";

pub const COUNT_FLAGGED: &str = "MATCH (f:Fragment) WHERE f.dissonance_flagged = true RETURN count(f) AS n";

// --- heartbeat ---

/// Singleton liveness record for the metabolism loop.
pub const HEARTBEAT_MERGE: &str = "MERGE (h:Heartbeat {id: 'metabolism'}) \
     SET h.last_seen = datetime($now), h.status = $status";

pub const HEARTBEAT_READ: &str = "MATCH (h:Heartbeat {id: 'metabolism'}) \
     RETURN toString(h.last_seen) AS last_seen, h.status AS status";

// --- sessions ---

pub const SESSION_START: &str = "CREATE (s:Session {id: $id, name: $name, started_at: datetime($now), active: true})";

/// Append a message to an active session and chain it to the previous tail.
/// Matching on `active = true` makes appends to ended sessions return no
/// rows, which the caller surfaces as an error.
pub const SESSION_APPEND: &str = "MATCH (s:Session {id: $session_id}) WHERE s.active = true \
     CREATE (m:MessageLog {id: $id, role: $role, text: $text, created_at: datetime($now)}) \
     CREATE (s)-[:LOGGED]->(m) \
     WITH s, m \
     OPTIONAL MATCH (s)-[:LOGGED]->(prev:MessageLog) \
     WHERE prev.id <> m.id AND NOT (prev)-[:NEXT_MESSAGE]->() \
     FOREACH (p IN CASE WHEN prev IS NULL THEN [] ELSE [prev] END | \
     CREATE (p)-[:NEXT_MESSAGE]->(m)) \
     RETURN m.id AS id";

pub const SESSION_END: &str = "MATCH (s:Session {id: $id}) WHERE s.active = true \
     SET s.active = false, s.ended_at = datetime($now) RETURN count(s) AS updated";

pub const SESSION_LOG: &str = "MATCH (s:Session {id: $id})-[:LOGGED]->(m:MessageLog) \
     RETURN m.role AS role, m.text AS text, toString(m.created_at) AS created_at \
     ORDER BY m.created_at, m.id";
