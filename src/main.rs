//! viewsync - scripted synchronization scenarios
//!
//! Builds entities, renders them into sessions and notebook outputs and
//! drives simulated client traffic, printing what travels over each channel.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use serde_json::json;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viewsync::{
    Channel, Document, ParamSpec, PropertyMap, Reactive, RenameTable, SyncConfig, ViewManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Session-backed view: next-tick pushes and a debounced client burst
    Session,
    /// Message-based view: comm traffic, echo suppression and cleanup
    Notebook,
    /// Two entities linked in both directions
    Link,
    All,
}

/// viewsync - keep entity state and its rendered views in step
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "all")]
    scenario: Scenario,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            SyncConfig::load(path).await?
        }
        None => SyncConfig::default(),
    };
    info!(
        debounce_ms = config.debounce_ms,
        timeout_ms = config.timeout_ms,
        "Configuration loaded"
    );

    let manager = ViewManager::new(config);

    if matches!(args.scenario, Scenario::Session | Scenario::All) {
        run_session(&manager).await?;
    }
    if matches!(args.scenario, Scenario::Notebook | Scenario::All) {
        run_notebook(&manager).await?;
    }
    if matches!(args.scenario, Scenario::Link | Scenario::All) {
        run_link(&manager)?;
    }

    info!("viewsync done");
    Ok(())
}

fn slider(manager: &ViewManager) -> Reactive {
    Reactive::builder("slider")
        .param(ParamSpec::number("value", 0.5))
        .param(ParamSpec::string("name", "Volume"))
        .rename(RenameTable::new([("name", "title")]))
        .options(manager.entity_options())
        .build()
}

async fn run_session(manager: &ViewManager) -> Result<()> {
    println!("\n{}", "=== Session-backed view ===".bold().cyan());

    let entity = slider(manager);
    let doc = Document::session("session-1");
    let mut binding = manager
        .server_doc(&entity, &doc)
        .context("Failed to render slider")?;
    println!(
        "  Rendered {} with {}",
        binding.view.ref_id().to_string().yellow(),
        format_map(&binding.view.properties())
    );

    entity.set("name", "Master")?;
    entity.set("value", 0.8)?;
    doc.sync().await;
    while let Ok(msg) = binding.outbound.try_recv() {
        println!("  {} {}", "OUT".green(), format_map(&msg));
    }

    for value in [0.1, 0.2, 0.3] {
        println!("  {} value = {}", "IN ".magenta(), value);
        binding.channel.receive("value", json!(value));
    }
    println!("  pending: {}", format_map(&entity.pending()));

    tokio::time::sleep(entity.options().debounce * 2).await;
    doc.sync().await;
    println!(
        "  after debounce: value = {}",
        entity
            .get("value")
            .map(|v| v.to_string())
            .unwrap_or_default()
            .bold()
    );

    doc.destroy().await;
    println!(
        "  session destroyed, live views: {}",
        manager.views_for(&entity).len().to_string().green()
    );
    Ok(())
}

async fn run_notebook(manager: &ViewManager) -> Result<()> {
    println!("\n{}", "=== Message-based view ===".bold().cyan());

    let entity = Reactive::builder("toggle")
        .param(ParamSpec::boolean("a", false))
        .options(manager.entity_options())
        .build();
    let doc = Document::notebook("notebook-1");
    let mut bundle = manager
        .render_notebook(&entity, &doc)
        .context("Failed to render toggle")?;
    println!(
        "  Rendered {} on comm {}",
        bundle.ref_id().to_string().yellow(),
        bundle.comm.id().yellow()
    );
    for (property, code) in &bundle.forwarding {
        println!(
            "  forwarding for {} ({} bytes)",
            property.yellow(),
            code.len()
        );
    }

    entity.set("a", true)?;
    while let Ok(raw) = bundle.outbound.try_recv() {
        println!("  {} {}", "OUT".green(), raw);
    }
    println!("  expecting: {:?}", entity.expecting());

    let client = bundle
        .client_comm_id
        .as_deref()
        .and_then(|id| manager.comms().get(id))
        .context("Client comm missing")?;

    println!("  {} {}", "IN ".magenta(), r#"{"a": true}"#);
    client.receive_raw(r#"{"a": true}"#)?;
    println!("  expecting after echo: {:?}", entity.expecting());

    println!("  {} {}", "IN ".magenta(), r#"{"a": false}"#);
    client.receive_raw(r#"{"a": false}"#)?;
    tokio::time::sleep(entity.options().debounce + Duration::from_millis(10)).await;
    doc.sync().await;
    println!(
        "  after debounce: a = {}",
        entity
            .get("a")
            .map(|v| v.to_string())
            .unwrap_or_default()
            .bold()
    );

    let released = manager.cleanup(&entity, Some(bundle.ref_id()), true);
    println!(
        "  cleanup released {} watcher(s), open comms: {}",
        released.to_string().green(),
        manager.comms().open_count().to_string().green()
    );
    Ok(())
}

fn run_link(manager: &ViewManager) -> Result<()> {
    println!("\n{}", "=== Linked entities ===".bold().cyan());

    let left = slider(manager);
    let right = slider(manager);
    left.link(&right, &[("value", "value")])?;
    right.link(&left, &[("value", "value")])?;

    left.set("value", 0.25)?;
    println!(
        "  left.value = 0.25 -> right.value = {}",
        right
            .get("value")
            .map(|v| v.to_string())
            .unwrap_or_default()
            .bold()
    );
    right.set("value", 0.75)?;
    println!(
        "  right.value = 0.75 -> left.value = {}",
        left.get("value")
            .map(|v| v.to_string())
            .unwrap_or_default()
            .bold()
    );

    left.cleanup(None, true);
    right.cleanup(None, true);
    Ok(())
}

fn format_map(msg: &PropertyMap) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
