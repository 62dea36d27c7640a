//! `trellisd` — the Trellis daemon.
//!
//! Boot order: config, telemetry, plugin scan, capability registry,
//! project store, runtime manager, scheduler, autostart, HTTP gateway.
//! Shutdown reverses it: drain HTTP, halt the scheduler, stop every
//! instance, then let plugins run their shutdown exports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{info, warn};

use trellis_config::Config;
use trellis_gateway::{AppState, build_router};
use trellis_modules::ModuleRegistry;
use trellis_plugins::{PluginLimits, PluginRegistry};
use trellis_runtime::{RuntimeManager, RuntimeOptions, WasmEngineFactory};
use trellis_storage::kv::MemoryKvStore;
use trellis_storage::projects::{MemoryProjectStore, ProjectRecord};
use trellis_telemetry::{LogConfig, LogFormat, setup_logging};

#[derive(Debug, Parser)]
#[command(name = "trellisd", version, about = "Runs uploaded scripts as managed services")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "TRELLIS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = trellis_config::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(&config)?;

    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!("creating data directory {}", config.storage.data_dir.display())
    })?;

    let plugin_limits = PluginLimits {
        require_hash: config.plugins.require_hash,
        ..PluginLimits::default()
    };
    let plugins = Arc::new(PluginRegistry::load_from_dir(
        &config.plugins.dir,
        &plugin_limits,
    ));

    let modules = ModuleRegistry::new(
        Arc::new(MemoryKvStore::new()),
        &config.storage.data_dir,
        plugins.clone(),
    )
    .context("building the capability registry")?;

    let store = Arc::new(MemoryProjectStore::new());
    seed_projects(&store, &config.storage.data_dir).await?;

    let manager = Arc::new(RuntimeManager::new(
        store,
        modules,
        Box::new(WasmEngineFactory),
        RuntimeOptions::from_config(&config),
    ));
    let scheduler = manager.spawn_scheduler();
    let started = manager.autostart().await;
    info!(count = started, "autostart finished");

    let app = build_router(AppState {
        manager: manager.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.gateway.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.gateway.listen_addr))?;
    info!(addr = %config.gateway.listen_addr, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!("shutting down");
    manager.halt_scheduler();
    for (project, result) in manager.stop_all().await {
        if let Err(e) = result {
            warn!(project = %project, error = %e, "stop failed during shutdown");
        }
    }
    let _ = scheduler.await;
    plugins.shutdown_all();
    Ok(())
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let format = match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        "compact" => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };
    let mut log = LogConfig::new(config.logging.level.clone()).with_format(format);
    for directive in &config.logging.directives {
        log = log.with_directive(directive.clone());
    }
    setup_logging(&log).context("installing the tracing subscriber")
}

/// Load seed project records from `data_dir/projects.json`, if present.
async fn seed_projects(store: &MemoryProjectStore, data_dir: &Path) -> anyhow::Result<()> {
    let path = data_dir.join("projects.json");
    if !path.is_file() {
        return Ok(());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<ProjectRecord> = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    info!(count = records.len(), path = %path.display(), "loaded project records");
    for record in records {
        store.upsert(record).await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not install the shutdown signal handler");
    }
}
