//! tidescaled — the tidescale daemon.
//!
//! # Usage
//!
//! ```text
//! tidescaled run --config /etc/tidescale/tidescale.toml --variant adaptive
//! tidescaled capacity --config /etc/tidescale/tidescale.toml
//! tidescaled limit --node tikv-0=40 --node tikv-1=40
//! tidescaled config --variant adaptive
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use tidescale_autoscale::{Runner, build_engine};
use tidescale_core::{BandwidthLimit, ResourceLedger};
use tidescale_ledger::LedgerStore;
use tidescaled::cli::{Cli, Command, RunArgs, load_config};
use tidescaled::{build_status_router, logging, wiring};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Capacity { config } => capacity(config).await,
        Command::Limit { config, nodes } => limit(config, nodes).await,
        Command::Config(args) => {
            let config = args.load()?;
            // Validate before printing so a bad file fails here too.
            config.engine_config()?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.load()?;
    let engine_config = config.engine_config()?;
    info!(
        variant = %engine_config.variant(),
        replicas = engine_config.initial_replicas,
        ceiling = engine_config.initial_ceiling,
        "tidescale daemon starting"
    );

    let ledger = open_ledger(Path::new(&config.ledger.path))?;
    let collaborators = wiring::collaborators(&config)?;
    let runner = Arc::new(Runner::new(build_engine(engine_config, collaborators), ledger));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner_handle = tokio::spawn({
        let runner = runner.clone();
        let shutdown = shutdown_rx.clone();
        async move { runner.run(shutdown).await }
    });

    let status_handle = if config.status.enabled {
        let addr: SocketAddr = config
            .status
            .listen
            .parse()
            .with_context(|| format!("invalid status.listen {:?}", config.status.listen))?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "status server listening");

        let router = build_status_router(runner.subscribe());
        let mut shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "status server failed");
            }
        }))
    } else {
        None
    };

    wait_for_shutdown(shutdown_tx).await;

    let _ = runner_handle.await;
    if let Some(handle) = status_handle {
        let _ = handle.await;
    }
    info!("tidescale daemon stopped");
    Ok(())
}

async fn capacity(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(path.as_deref())?;
    let (planner, interval) = wiring::capacity_planner(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move { planner.run(interval, shutdown_rx).await });

    wait_for_shutdown(shutdown_tx).await;
    let _ = handle.await;
    info!("capacity planner stopped");
    Ok(())
}

async fn limit(path: Option<PathBuf>, nodes: Vec<(String, f64)>) -> anyhow::Result<()> {
    let config = load_config(path.as_deref())?;
    let coordinator = wiring::coordinator_client(&config)?;
    let limits: BTreeMap<String, BandwidthLimit> = nodes
        .into_iter()
        .map(|(node, mbps)| (node, BandwidthLimit::from_mbps(mbps)))
        .collect();

    coordinator
        .set_node_limits(&config.cluster.namespace, &limits)
        .await
        .context("set per-node limits")?;
    for (node, limit) in &limits {
        println!("{node}\tread={}\twrite={}", limit.read, limit.write);
    }
    Ok(())
}

fn open_ledger(path: &Path) -> anyhow::Result<Arc<dyn ResourceLedger>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create ledger directory {}", parent.display()))?;
    }
    let store = LedgerStore::open(path)?;
    info!(path = %path.display(), "ledger opened");
    Ok(Arc::new(store))
}

/// Block until Ctrl-C, then flip the shutdown channel.
async fn wait_for_shutdown(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
