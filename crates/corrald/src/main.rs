//! `corrald` — the Corral cluster routing daemon.
//!
//! Binary entrypoint that ties peer discovery, the claim registry and the
//! claim cache together into a running node.
//!
//! # Usage
//!
//! ```text
//! corrald start                    # start with defaults
//! corrald start -c corral.toml     # start with a config file
//! corrald start -n gs2             # override the node name
//! corrald check-config -c corral.toml
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use corral_claims::{ClaimBackend, ClaimCache, ClaimRegistry, spawn_keep_alive};
use corral_cluster::{Cluster, DiscoveryConfig, DnsResolver, discovery};
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "corrald", version, about = "Corral cluster routing daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node.
    Start {
        /// Override the node name (useful for running multiple instances).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Validate the configuration and exit.
    CheckConfig,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Start { name } => {
            // CLI args override config file values.
            if let Some(n) = name {
                config.node.name = n;
            }
            cmd_start(config).await
        }
        Commands::CheckConfig => cmd_check_config(&config),
    }
}

async fn cmd_start(config: CliConfig) -> Result<()> {
    validate(&config)?;

    if config.cluster.targets.is_empty() {
        warn!("no discovery targets configured, this node will see no peers");
    }

    let resolver = Arc::new(DnsResolver::from_system_conf().context("failed to build resolver")?);

    let backend = ClaimBackend::from_config(&config.claims.backend, &config.claims.redis_url)?;
    let registry = backend
        .connect(&config.node.name)
        .await
        .context("failed to connect claim backend")?;
    let claims: Arc<dyn ClaimRegistry> = Arc::new(ClaimCache::new(
        registry,
        config.claims.cache_size,
        config.cache_ttl(),
    ));

    let cluster = Cluster::with_claims(claims.clone());
    let discovery_config = DiscoveryConfig {
        targets: config.discovery_targets(),
        interval: config.discovery_interval(),
        grace: config.discovery_grace(),
        tls: config.cluster.tls,
    };
    let discovery = discovery::join(discovery_config, resolver, cluster).await;

    let keep_alive = spawn_keep_alive(claims, config.claim_ttl());

    info!(name = %config.node.name, "node started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    keep_alive.stop().await;
    discovery.leave().await;

    Ok(())
}

fn cmd_check_config(config: &CliConfig) -> Result<()> {
    validate(config)?;
    ClaimBackend::from_config(&config.claims.backend, &config.claims.redis_url)?;

    for target in &config.cluster.targets {
        if target.roles.is_empty() {
            bail!("discovery target {} has no roles", target.address);
        }
    }

    info!(
        targets = config.cluster.targets.len(),
        backend = %config.claims.backend,
        "configuration is valid"
    );
    Ok(())
}

fn validate(config: &CliConfig) -> Result<()> {
    if config.cluster.discovery != "dns" {
        bail!(
            "unsupported discovery mode {:?}, only \"dns\" is supported",
            config.cluster.discovery
        );
    }
    if config.node.name.is_empty() {
        bail!("node name must not be empty");
    }
    // The background loops tick at these periods; a zero period would
    // panic inside a detached task instead of failing here.
    for (name, secs) in [
        ("cluster.interval_secs", config.cluster.interval_secs),
        ("cluster.grace_secs", config.cluster.grace_secs),
        ("claims.ttl_secs", config.claims.ttl_secs),
        ("claims.cache_ttl_secs", config.claims.cache_ttl_secs),
    ] {
        if secs == 0 {
            bail!("{name} must be greater than zero");
        }
    }
    Ok(())
}
