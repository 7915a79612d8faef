//! Command implementations by domain.

pub mod memory;
pub mod system;

use anyhow::{anyhow, Context, Result};
use magpie_engine::MemoryEngine;
use magpie_types::config::{GraphProfile, MagpieConfig};
use std::path::Path;

/// Resolve a named (or the default) graph profile from config.
pub(crate) fn resolve_profile<'a>(
    config: &'a MagpieConfig,
    name: Option<&str>,
) -> Result<&'a GraphProfile> {
    match config.resolve_profile(name) {
        Some(profile) => Ok(profile),
        None => match name {
            Some(name) => Err(anyhow!("no graph profile named '{name}'")),
            None => Err(anyhow!("no graph profiles configured")),
        },
    }
}

/// Load config and connect an engine for the selected profile.
pub(crate) fn build_engine(
    config_path: Option<&Path>,
    profile_name: Option<&str>,
) -> Result<(MagpieConfig, MemoryEngine)> {
    let config = MagpieConfig::load(config_path);
    let profile = resolve_profile(&config, profile_name)?;
    let engine = MemoryEngine::connect(profile, &config.models, config.engine.clone())
        .context("failed to connect memory engine")?;
    Ok((config, engine))
}

/// Multi-threaded runtime; background work must progress while the main
/// thread blocks on stdio.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
