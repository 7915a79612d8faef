//! One-shot memory commands: ingest, retrieve, forget, prune.

use crate::cmd::{build_engine, runtime};
use crate::ui;
use anyhow::{Context, Result};
use magpie_types::model::{FragmentId, Role};
use std::path::PathBuf;

pub fn cmd_ingest(
    config: Option<PathBuf>,
    profile: Option<String>,
    text: &str,
    role: &str,
    entities: Vec<String>,
) -> Result<()> {
    let role: Role = role.parse()?;
    let entities = if entities.is_empty() {
        None
    } else {
        Some(entities)
    };

    let (_, engine) = build_engine(config.as_deref(), profile.as_deref())?;
    let rt = runtime()?;
    let id = rt.block_on(engine.ingest(text, &role, entities))?;
    ui::success(&format!("Stored fragment {id}"));
    Ok(())
}

pub fn cmd_retrieve(
    config: Option<PathBuf>,
    profile: Option<String>,
    query: &str,
    top_k: usize,
    fast: bool,
    json: bool,
) -> Result<()> {
    let (_, engine) = build_engine(config.as_deref(), profile.as_deref())?;
    let rt = runtime()?;
    let bundle = rt.block_on(engine.retrieve(query, top_k, fast))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }
    if bundle.is_empty() {
        println!("  (no matching memories)");
        return Ok(());
    }
    if !bundle.episodic.is_empty() {
        ui::section("Episodic");
        for text in &bundle.episodic {
            println!("    - {text}");
        }
    }
    if !bundle.abstractive.is_empty() {
        ui::section("Abstractive");
        for text in &bundle.abstractive {
            println!("    - {text}");
        }
    }
    if !bundle.relational.is_empty() {
        ui::section("Relational");
        for fact in &bundle.relational {
            println!("    - {fact}");
        }
    }
    Ok(())
}

pub fn cmd_forget(config: Option<PathBuf>, profile: Option<String>, id: &str) -> Result<()> {
    let id: FragmentId = id.parse().context("invalid fragment id")?;
    let (_, engine) = build_engine(config.as_deref(), profile.as_deref())?;
    let rt = runtime()?;
    rt.block_on(engine.forget(&id))?;
    ui::success(&format!("Forgot fragment {id}"));
    Ok(())
}

pub fn cmd_prune(
    config: Option<PathBuf>,
    profile: Option<String>,
    threshold: Option<f64>,
) -> Result<()> {
    let (_, engine) = build_engine(config.as_deref(), profile.as_deref())?;
    let rt = runtime()?;
    let report = rt.block_on(engine.prune(threshold))?;
    ui::success(&format!(
        "Pruned {} weak edges and {} orphaned entities",
        report.edges_removed, report.entities_removed
    ));
    Ok(())
}
