//! Long-running and maintenance commands: serve, metabolism, init-schema,
//! status.

use crate::cmd::{build_engine, resolve_profile, runtime};
use crate::tools::{run_tool_server, ToolHost};
use crate::ui;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use magpie_engine::Metabolism;
use magpie_graph::{schema, GraphStore};
use magpie_types::config::MagpieConfig;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

/// Stdio tool server with the metabolism loop in the background.
///
/// Tools may address any configured profile; the metabolism loop runs
/// against the selected (or default) one. Exits when stdin closes.
pub fn cmd_serve(config: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = MagpieConfig::load(config.as_deref());
    let rt = runtime()?;

    let host = ToolHost::new(&config).context("failed to connect graph profiles")?;
    let engine = host.engine(profile.as_deref()).map_err(|e| anyhow!(e))?.clone();

    rt.block_on(schema::init_schema(
        engine.store(),
        config.models.vector_dimensions,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = rt.spawn(Metabolism::new(engine, shutdown_rx).run());

    info!("Tool server on stdio; metabolism running in the background");
    run_tool_server(&host, &rt);

    // stdin closed: stop the metabolism loop before exiting.
    let _ = shutdown_tx.send(true);
    let _ = rt.block_on(worker);
    Ok(())
}

/// Metabolism loop only, until interrupted.
pub fn cmd_metabolism(config: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let (config, engine) = build_engine(config.as_deref(), profile.as_deref())?;
    let rt = runtime()?;

    rt.block_on(async {
        schema::init_schema(engine.store(), config.models.vector_dimensions).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Metabolism::new(engine, shutdown_rx).spawn();

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received; stopping metabolism"),
            Err(e) => warn!(error = %e, "Signal handler failed; stopping metabolism"),
        }
        let _ = shutdown_tx.send(true);
        let _ = worker.await;
    });
    Ok(())
}

pub fn cmd_init_schema(config: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = MagpieConfig::load(config.as_deref());
    let profile = resolve_profile(&config, profile.as_deref())?;
    let store = GraphStore::connect(profile)?;
    let rt = runtime()?;

    if rt.block_on(schema::init_schema(
        &store,
        config.models.vector_dimensions,
    )) {
        ui::success("Graph schema ready (vector indexes + entity constraint)");
        Ok(())
    } else {
        anyhow::bail!("schema initialization failed; is the graph store reachable?")
    }
}

pub fn cmd_status(config: Option<PathBuf>, profile: Option<String>, json: bool) -> Result<()> {
    let (config, engine) = build_engine(config.as_deref(), profile.as_deref())?;
    let profile = resolve_profile(&config, profile.as_deref())?;
    let rt = runtime()?;

    let depths = rt.block_on(engine.queue_depths())?;
    let heartbeat = rt.block_on(engine.read_heartbeat())?;

    // Stale when the loop has missed two long intervals.
    let stale_after = 2 * config.engine.metabolism.long_interval_secs as i64;
    let fresh = heartbeat.as_ref().is_some_and(|hb| {
        match chrono::DateTime::parse_from_rfc3339(&hb.last_seen) {
            Ok(ts) => (Utc::now() - ts.with_timezone(&Utc)).num_seconds() <= stale_after,
            Err(_) => false,
        }
    });

    if json {
        let body = serde_json::json!({
            "profile": profile.name,
            "uri": profile.uri,
            "database": profile.database,
            "heartbeat": heartbeat.as_ref().map(|hb| serde_json::json!({
                "last_seen": hb.last_seen,
                "status": hb.status,
                "fresh": fresh,
            })),
            "queues": depths,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    ui::section("Magpie Status");
    ui::blank();
    ui::kv("Profile", &profile.name);
    ui::kv("Graph", &format!("{} ({})", profile.uri, profile.database));
    match &heartbeat {
        Some(hb) if fresh => {
            ui::kv_ok(
                "Metabolism",
                &format!("{} (last seen {})", hb.status, hb.last_seen),
            );
        }
        Some(hb) => {
            ui::kv_warn("Metabolism", &format!("stale (last seen {})", hb.last_seen));
        }
        None => {
            ui::kv_warn("Metabolism", "no heartbeat");
            ui::hint("run `magpie metabolism` or `magpie serve` to start the loop");
        }
    }
    ui::blank();
    ui::section("Queue Depths");
    ui::kv("Embed queue", &depths.pending_embeddings.to_string());
    ui::kv("Check queue", &depths.unchecked.to_string());
    ui::kv("Summary queue", &depths.unsummarized.to_string());
    ui::kv("Flagged", &depths.flagged.to_string());
    Ok(())
}
