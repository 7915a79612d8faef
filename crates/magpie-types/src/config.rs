//! Configuration loading from `~/.magpie/config.toml` with defaults.
//!
//! Environment variables (`MAGPIE_*`) override the file for the default
//! graph profile and the model endpoints. Passwords and API keys support
//! file indirection (`password_file`, `api_key_file`) so secrets can live
//! outside the config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default weight given to a RELATED_TO edge on first co-occurrence.
const DEFAULT_INITIAL_WEIGHT: f64 = 2.0;

/// Default weight added per repeat co-occurrence.
const DEFAULT_WEIGHT_INCREMENT: f64 = 1.0;

/// Edges at or below this weight are pruned.
const DEFAULT_PRUNE_THRESHOLD: f64 = 0.5;

/// Maximum relational facts returned by fusion retrieval.
const DEFAULT_RELATIONAL_CAP: usize = 8;

/// Embedding attempts before a fragment is abandoned.
const DEFAULT_EMBED_FAIL_CAP: u32 = 3;

/// Minimum un-summarized batch before a summary is built.
const DEFAULT_MIN_BATCH: usize = 3;

/// Maximum fragments folded into one summary.
const DEFAULT_BATCH_LIMIT: usize = 5;

/// Summary tree depth exercised by the base cycle.
const DEFAULT_MAX_LEVEL: u32 = 1;

/// Sleep after processing a pending embedding (seconds).
const DEFAULT_SHORT_INTERVAL_SECS: u64 = 15;

/// Sleep after a dissonance check (seconds).
const DEFAULT_MEDIUM_INTERVAL_SECS: u64 = 20;

/// Sleep after an idle summarization pass, and after any cycle error (seconds).
const DEFAULT_LONG_INTERVAL_SECS: u64 = 60;

/// Timeout for embedding and generation calls (seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Embedding dimensionality; must match the store-side vector indexes.
const DEFAULT_VECTOR_DIMENSIONS: usize = 768;

const DEFAULT_GRAPH_URI: &str = "http://localhost:7474";
const DEFAULT_GRAPH_DATABASE: &str = "neo4j";
const DEFAULT_GRAPH_USER: &str = "neo4j";
const DEFAULT_MODEL_HOST: &str = "http://localhost:11434";
const DEFAULT_EMBED_MODEL: &str = "embeddinggemma:latest";
const DEFAULT_GENERATE_MODEL: &str = "gemma:2b";

/// Root configuration for the Magpie memory engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MagpieConfig {
    /// Graph store profiles.
    pub graph: GraphConfig,
    /// Embedding and generation endpoints.
    pub models: ModelConfig,
    /// Engine tuning knobs.
    pub engine: EngineConfig,
}

/// Graph store connection profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name of the profile used when the caller does not pick one.
    pub default_profile: String,
    /// All configured profiles.
    pub profiles: Vec<GraphProfile>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_profile: "default".to_string(),
            profiles: vec![GraphProfile::default()],
        }
    }
}

/// One named graph store connection. Switching profiles means constructing
/// a new store handle from another profile value, never mutating a shared
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphProfile {
    /// Profile name, referenced by tools and `--profile`.
    pub name: String,
    /// Base URI of the store's HTTP endpoint.
    pub uri: String,
    /// Database name within the store.
    pub database: String,
    /// Basic-auth user; empty disables auth.
    pub user: String,
    /// Basic-auth password.
    pub password: String,
    /// Read the password from this file when `password` is empty.
    pub password_file: Option<PathBuf>,
}

impl Default for GraphProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            uri: DEFAULT_GRAPH_URI.to_string(),
            database: DEFAULT_GRAPH_DATABASE.to_string(),
            user: DEFAULT_GRAPH_USER.to_string(),
            password: String::new(),
            password_file: None,
        }
    }
}

/// Embedding and generation service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the model host.
    pub host: String,
    /// Optional API key sent as `X-Api-Key`.
    pub api_key: Option<String>,
    /// Read the API key from this file when `api_key` is unset.
    pub api_key_file: Option<PathBuf>,
    /// Embedding model name.
    pub embed_model: String,
    /// Generation model name.
    pub generate_model: String,
    /// Embedding dimensionality; must match the vector indexes.
    pub vector_dimensions: usize,
    /// Per-request timeout for model calls (seconds).
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MODEL_HOST.to_string(),
            api_key: None,
            api_key_file: None,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            vector_dimensions: DEFAULT_VECTOR_DIMENSIONS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Weight of a RELATED_TO edge on first co-occurrence.
    pub initial_weight: f64,
    /// Weight added per repeat co-occurrence.
    pub weight_increment: f64,
    /// Edges at or below this weight are pruned.
    pub prune_threshold: f64,
    /// Maximum relational facts returned by fusion retrieval.
    pub relational_cap: usize,
    /// Embedding attempts before a fragment is abandoned.
    pub embed_fail_cap: u32,
    /// Hierarchical summarizer settings.
    pub summarizer: SummarizerConfig,
    /// Dissonance detector settings.
    pub dissonance: DissonanceConfig,
    /// Background loop intervals.
    pub metabolism: MetabolismConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_weight: DEFAULT_INITIAL_WEIGHT,
            weight_increment: DEFAULT_WEIGHT_INCREMENT,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            relational_cap: DEFAULT_RELATIONAL_CAP,
            embed_fail_cap: DEFAULT_EMBED_FAIL_CAP,
            summarizer: SummarizerConfig::default(),
            dissonance: DissonanceConfig::default(),
            metabolism: MetabolismConfig::default(),
        }
    }
}

/// Hierarchical summarizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Minimum un-summarized batch before a summary is built.
    pub min_batch: usize,
    /// Maximum nodes folded into one summary.
    pub batch_limit: usize,
    /// Summary tree height; 1 builds only first-order summaries over fragments.
    pub max_level: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            min_batch: DEFAULT_MIN_BATCH,
            batch_limit: DEFAULT_BATCH_LIMIT,
            max_level: DEFAULT_MAX_LEVEL,
        }
    }
}

/// Dissonance detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DissonanceConfig {
    /// When a service call fails mid-check, still mark the fragment checked.
    /// True keeps the queue draining; false retries the fragment next cycle.
    pub mark_checked_on_failure: bool,
}

impl Default for DissonanceConfig {
    fn default() -> Self {
        Self {
            mark_checked_on_failure: true,
        }
    }
}

/// Background loop intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetabolismConfig {
    /// Sleep after processing a pending embedding (seconds).
    pub short_interval_secs: u64,
    /// Sleep after a dissonance check (seconds).
    pub medium_interval_secs: u64,
    /// Sleep after an idle pass or a cycle error (seconds).
    pub long_interval_secs: u64,
}

impl Default for MetabolismConfig {
    fn default() -> Self {
        Self {
            short_interval_secs: DEFAULT_SHORT_INTERVAL_SECS,
            medium_interval_secs: DEFAULT_MEDIUM_INTERVAL_SECS,
            long_interval_secs: DEFAULT_LONG_INTERVAL_SECS,
        }
    }
}

impl MagpieConfig {
    /// Load configuration from a TOML file, with defaults, then apply
    /// environment overrides and resolve secret files.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_config_path);

        let mut config = if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str::<MagpieConfig>(&contents) {
                    Ok(config) => {
                        info!(path = %config_path.display(), "Loaded configuration");
                        config
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            path = %config_path.display(),
                            "Failed to parse config, using defaults"
                        );
                        MagpieConfig::default()
                    }
                },
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to read config file, using defaults"
                    );
                    MagpieConfig::default()
                }
            }
        } else {
            info!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            MagpieConfig::default()
        };

        config.apply_env_overrides();
        config.resolve_secrets();
        config
    }

    /// Look up a profile by name, falling back to the configured default.
    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&GraphProfile> {
        let wanted = name.unwrap_or(&self.graph.default_profile);
        self.graph.profiles.iter().find(|p| p.name == wanted)
    }

    /// Apply `MAGPIE_*` environment overrides. Graph overrides target the
    /// default profile.
    fn apply_env_overrides(&mut self) {
        let default_name = self.graph.default_profile.clone();
        if let Some(profile) = self
            .graph
            .profiles
            .iter_mut()
            .find(|p| p.name == default_name)
        {
            if let Ok(uri) = std::env::var("MAGPIE_GRAPH_URI") {
                profile.uri = uri;
            }
            if let Ok(database) = std::env::var("MAGPIE_GRAPH_DATABASE") {
                profile.database = database;
            }
            if let Ok(user) = std::env::var("MAGPIE_GRAPH_USER") {
                profile.user = user;
            }
            if let Ok(password) = std::env::var("MAGPIE_GRAPH_PASSWORD") {
                profile.password = password;
            }
            if let Ok(file) = std::env::var("MAGPIE_GRAPH_PASSWORD_FILE") {
                profile.password_file = Some(PathBuf::from(file));
            }
        }

        if let Ok(host) = std::env::var("MAGPIE_MODEL_HOST") {
            self.models.host = host;
        }
        if let Ok(key) = std::env::var("MAGPIE_API_KEY") {
            self.models.api_key = Some(key);
        }
        if let Ok(file) = std::env::var("MAGPIE_API_KEY_FILE") {
            self.models.api_key_file = Some(PathBuf::from(file));
        }
        if let Ok(model) = std::env::var("MAGPIE_EMBED_MODEL") {
            self.models.embed_model = model;
        }
        if let Ok(model) = std::env::var("MAGPIE_GENERATE_MODEL") {
            self.models.generate_model = model;
        }
        if let Ok(dims) = std::env::var("MAGPIE_VECTOR_DIMENSIONS") {
            match dims.parse::<usize>() {
                Ok(d) if d > 0 => self.models.vector_dimensions = d,
                _ => warn!(value = %dims, "Ignoring invalid MAGPIE_VECTOR_DIMENSIONS"),
            }
        }
    }

    /// Fill in passwords and API keys from their secret files.
    fn resolve_secrets(&mut self) {
        for profile in &mut self.graph.profiles {
            if profile.password.is_empty() {
                if let Some(ref file) = profile.password_file {
                    if let Some(secret) = read_secret(file) {
                        profile.password = secret;
                    }
                }
            }
        }
        if self.models.api_key.is_none() {
            if let Some(ref file) = self.models.api_key_file {
                self.models.api_key = read_secret(file);
            }
        }
    }
}

/// Read a secret file, trimming surrounding whitespace.
fn read_secret(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let secret = contents.trim().to_string();
            if secret.is_empty() {
                warn!(path = %path.display(), "Secret file is empty");
                None
            } else {
                Some(secret)
            }
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read secret file");
            None
        }
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".magpie")
        .join("config.toml")
}
