//! Data model for memory fragments, summaries, sessions, and retrieval results.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a memory fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId(pub Uuid);

impl FragmentId {
    /// Create a new random FragmentId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FragmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for an abstract summary node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryId(pub Uuid);

impl SummaryId {
    /// Create a new random SummaryId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SummaryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SummaryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Who produced a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human turn.
    User,
    /// An agent turn.
    Assistant,
    /// A system-injected turn (digests, corrections).
    System,
}

impl Role {
    /// Stable lowercase name, as stored in the graph.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(EngineError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// Result of fusion retrieval. The three sets are independent and unranked
/// against each other; weighting across strategies is left to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallBundle {
    /// Nearest raw fragments by cosine similarity.
    pub episodic: Vec<String>,
    /// Nearest abstract summaries by cosine similarity.
    pub abstractive: Vec<String>,
    /// One-hop relationship facts rendered as "X is related to Y".
    pub relational: Vec<String>,
}

impl RecallBundle {
    /// True when all three strategies came back empty.
    pub fn is_empty(&self) -> bool {
        self.episodic.is_empty() && self.abstractive.is_empty() && self.relational.is_empty()
    }
}

/// A fragment flagged by the dissonance detector, awaiting resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DissonanceCase {
    /// The flagged fragment.
    pub fragment_id: FragmentId,
    /// Its current text.
    pub text: String,
    /// The raw judgment produced by the generation service.
    pub report: Option<String>,
}

/// How to resolve a flagged dissonance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DissonanceAction {
    /// Keep the fragment and clear the flag.
    Accept,
    /// Delete the fragment.
    Reject,
    /// Replace the fragment text; it re-enters both queues.
    Update {
        /// Replacement text.
        text: String,
    },
}

/// Counts from one decay-and-pruning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    /// RELATED_TO edges deleted at or below the weight threshold.
    pub edges_removed: u64,
    /// Entities deleted for having no remaining edge.
    pub entities_removed: u64,
}

/// Report from one foreground consolidation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Whether a pending embedding was processed.
    pub embedded: bool,
    /// Whether a dissonance check was performed.
    pub checked: bool,
    /// Number of summary nodes created.
    pub summaries_created: usize,
}

/// Snapshot of outstanding background work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueDepths {
    /// Fragments waiting for an embedding.
    pub pending_embeddings: u64,
    /// Embedded fragments not yet checked for dissonance.
    pub unchecked: u64,
    /// Fragments not yet covered by a summary.
    pub unsummarized: u64,
    /// Fragments currently flagged as dissonant.
    pub flagged: u64,
}

/// Liveness record written by the metabolism loop's idle pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// When the loop last completed an idle pass (store-rendered timestamp).
    pub last_seen: String,
    /// Loop status string, normally "active".
    pub status: String,
}

/// One raw turn read back from a recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedMessage {
    /// Who produced the turn.
    pub role: Role,
    /// Turn text.
    pub text: String,
    /// Store-rendered timestamp.
    pub created_at: String,
}
