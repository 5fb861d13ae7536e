//! Command line surface.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use tidescale_core::{TidescaleConfig, Variant};

#[derive(Parser)]
#[command(name = "tidescaled", about = "Throughput autoscaler for a sharded storage cluster")]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the autoscale engine.
    Run(RunArgs),

    /// Run the storage capacity planner.
    Capacity {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Set per-node bandwidth limits once and exit.
    Limit {
        #[arg(long)]
        config: Option<PathBuf>,

        /// `node=mbps`, repeatable.
        #[arg(long = "node", value_parser = parse_node_limit, required = true)]
        nodes: Vec<(String, f64)>,
    },

    /// Print the effective configuration as TOML.
    Config(RunArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Path to tidescale.toml; defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Algorithm variant: basic or adaptive.
    #[arg(long)]
    pub variant: Option<Variant>,

    /// Decision period, e.g. "10s".
    #[arg(long)]
    pub epoch: Option<String>,

    /// Initial replica count.
    #[arg(long)]
    pub replicas: Option<u32>,

    /// Replicas added per scale-out.
    #[arg(long)]
    pub step: Option<u32>,
}

impl RunArgs {
    /// Load the configuration file (or defaults) and apply flag overrides.
    pub fn load(&self) -> anyhow::Result<TidescaleConfig> {
        let mut config = load_config(self.config.as_deref())?;
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut TidescaleConfig) {
        if let Some(variant) = self.variant {
            config.engine.variant = variant;
        }
        if let Some(epoch) = &self.epoch {
            config.engine.epoch = epoch.clone();
        }
        if let Some(replicas) = self.replicas {
            config.engine.initial_replicas = replicas;
        }
        if let Some(step) = self.step {
            config.engine.step = step;
        }
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<TidescaleConfig> {
    match path {
        Some(path) => TidescaleConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("load {}: {e}", path.display())),
        None => Ok(TidescaleConfig::default()),
    }
}

/// Parse `node=mbps`.
pub fn parse_node_limit(s: &str) -> Result<(String, f64), String> {
    let (node, mbps) = s
        .split_once('=')
        .ok_or_else(|| format!("expected node=mbps, got {s:?}"))?;
    if node.is_empty() {
        return Err(format!("missing node name in {s:?}"));
    }
    let mbps: f64 = mbps
        .parse()
        .map_err(|_| format!("invalid bandwidth {mbps:?} for {node}"))?;
    if !mbps.is_finite() || mbps < 0.0 {
        return Err(format!("bandwidth for {node} must be a non-negative number"));
    }
    Ok((node.to_string(), mbps))
}
