//! Periodic DNS-based peer discovery.
//!
//! The engine resolves the configured target addresses into a candidate
//! peer set on every pass, reuses unchanged peers from the previous
//! snapshot, dials new ones, schedules a grace-delayed drain for peers
//! that disappeared, and swaps in a freshly built [`Snapshot`].
//!
//! [`join`] performs the first pass synchronously and then spawns the
//! periodic loop; the returned [`DiscoveryHandle`] stops it. Individual
//! lookup and dial failures are logged and isolated to the affected
//! target — the previous snapshot for unaffected roles stays valid until
//! the next tick.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use corral_types::Role;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cluster::Cluster;
use crate::error::ClusterError;
use crate::peer::Peer;
use crate::resolver::Resolver;
use crate::snapshot::Snapshot;

/// One configured discovery target: an address and the roles served there.
#[derive(Debug, Clone)]
pub struct DiscoveryTarget {
    /// `host:port` for a fixed endpoint, or a bare service name for SRV
    /// discovery.
    pub address: String,
    /// Roles advertised by every peer resolved from this address.
    pub roles: Vec<Role>,
}

/// Configuration for the discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Addresses to resolve on every pass.
    pub targets: Vec<DiscoveryTarget>,
    /// Interval between discovery passes.
    pub interval: Duration,
    /// Delay between a peer disappearing and its connection being closed,
    /// so in-flight calls can drain.
    pub grace: Duration,
    /// Whether peer connections use TLS.
    pub tls: bool,
}

impl DiscoveryConfig {
    /// Create a default config for production use.
    pub fn default_config(targets: Vec<DiscoveryTarget>) -> Self {
        Self {
            targets,
            interval: Duration::from_secs(10),
            grace: Duration::from_secs(10),
            tls: false,
        }
    }

    /// Create a config suitable for fast test execution.
    pub fn test_config(targets: Vec<DiscoveryTarget>) -> Self {
        Self {
            targets,
            interval: Duration::from_millis(50),
            grace: Duration::from_millis(100),
            tls: false,
        }
    }
}

/// A candidate peer produced by resolving one target address.
struct Candidate {
    name: String,
    target: String,
    roles: Vec<Role>,
}

struct DnsDiscovery {
    config: DiscoveryConfig,
    resolver: Arc<dyn Resolver>,
    cluster: Arc<Cluster>,
}

impl DnsDiscovery {
    /// Run the periodic discovery loop until shutdown.
    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("discovery started");

        let mut interval = tokio::time::interval(self.config.interval);
        // The first pass already ran in join(); skip the immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.discover_once().await;
                }
                _ = shutdown_rx.changed() => {
                    info!("discovery shutting down");
                    break;
                }
            }
        }
    }

    /// One discovery pass: resolve, reconcile, drain, swap.
    async fn discover_once(&self) {
        let mut candidates: Vec<Candidate> = Vec::new();
        for target in &self.config.targets {
            if let Err(e) = self.resolve_target(target, &mut candidates).await {
                warn!(address = %target.address, error = %e, "cluster target resolution failed");
            }
        }

        // Collapse duplicate names, merging role sets (the same address may
        // be listed under several targets).
        let mut merged: HashMap<String, Candidate> = HashMap::with_capacity(candidates.len());
        for cand in candidates {
            match merged.get_mut(&cand.name) {
                Some(existing) => {
                    if existing.target != cand.target {
                        warn!(
                            name = %cand.name,
                            kept = %existing.target,
                            ignored = %cand.target,
                            "duplicate peer name resolved to conflicting targets"
                        );
                    }
                    for role in cand.roles {
                        if !existing.roles.contains(&role) {
                            existing.roles.push(role);
                        }
                    }
                }
                None => {
                    merged.insert(cand.name.clone(), cand);
                }
            }
        }

        let prev = self.cluster.snapshot();
        let mut peers: HashMap<String, Arc<Peer>> = HashMap::with_capacity(merged.len());
        for (name, mut cand) in merged {
            cand.roles.sort();
            match prev.peers.get(&name) {
                // Unchanged peer: keep the same handle, no reconnect.
                Some(existing) if existing.target() == cand.target => {
                    peers.insert(name, existing.clone());
                }
                _ => {
                    debug!(name = %name, target = %cand.target, "connecting to new peer");
                    let peer = Peer::dial(name.clone(), cand.roles, cand.target, self.config.tls);
                    if let Err(e) = peer.conn() {
                        warn!(name = %name, error = %e, "peer dial failed");
                    }
                    peers.insert(name, Arc::new(peer));
                }
            }
        }

        // Drain peers that disappeared, without blocking this pass.
        for (name, peer) in &prev.peers {
            if !peers.contains_key(name) {
                info!(name = %name, grace = ?self.config.grace, "peer disappeared, draining");
                schedule_drain(peer.clone(), self.config.grace);
            }
        }

        self.cluster.swap(Snapshot::build(peers));
    }

    /// Resolve one target address into candidate peers.
    ///
    /// An address with an explicit port expands its host's address
    /// records directly; anything else goes through an SRV lookup first.
    /// Per-host address failures on the SRV path are isolated.
    async fn resolve_target(
        &self,
        target: &DiscoveryTarget,
        out: &mut Vec<Candidate>,
    ) -> Result<(), ClusterError> {
        match split_host_port(&target.address) {
            Some((host, port)) => {
                for ip in self.resolve_host(host).await? {
                    let addr = SocketAddr::new(ip, port).to_string();
                    out.push(Candidate {
                        name: addr.clone(),
                        target: addr,
                        roles: target.roles.clone(),
                    });
                }
            }
            None => {
                for srv in self.resolver.lookup_srv(&target.address).await? {
                    // SRV peers are named by the instance label of the
                    // target host (`gs1.cluster.local` -> `gs1`).
                    let name = srv
                        .host
                        .split('.')
                        .next()
                        .unwrap_or(srv.host.as_str())
                        .to_string();
                    let ips = match self.resolve_host(&srv.host).await {
                        Ok(ips) => ips,
                        Err(e) => {
                            warn!(host = %srv.host, error = %e, "address lookup failed");
                            continue;
                        }
                    };
                    for ip in ips {
                        out.push(Candidate {
                            name: name.clone(),
                            target: SocketAddr::new(ip, srv.port).to_string(),
                            roles: target.roles.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Expand a hostname to addresses; IP literals skip the lookup.
    async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>, ClusterError> {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        self.resolver.lookup_ip(host).await
    }
}

/// Close a stale peer's connection after the grace delay.
fn schedule_drain(peer: Arc<Peer>, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        debug!(name = %peer.name(), "closing connection to stale peer");
        peer.close();
    });
}

/// Split `host:port` into its parts; `None` if there is no valid port.
fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

/// Join the cluster: one synchronous discovery pass, then the periodic
/// loop in the background.
///
/// The first pass completing does not mean every lookup succeeded —
/// failures are logged and retried on the next tick.
pub async fn join(
    config: DiscoveryConfig,
    resolver: Arc<dyn Resolver>,
    cluster: Arc<Cluster>,
) -> DiscoveryHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine = DnsDiscovery {
        config,
        resolver,
        cluster: cluster.clone(),
    };

    engine.discover_once().await;

    let task = tokio::spawn(async move {
        engine.run(shutdown_rx).await;
    });

    DiscoveryHandle {
        cluster,
        shutdown_tx,
        task,
    }
}

/// Handle to a running discovery engine.
///
/// [`DiscoveryHandle::leave`] consumes the handle, so the engine cannot
/// be stopped twice.
pub struct DiscoveryHandle {
    cluster: Arc<Cluster>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Leave the cluster: stop the discovery loop, close every known
    /// peer's connection and clear the snapshot.
    pub async fn leave(self) {
        info!("leaving cluster");
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;

        let snapshot = self.cluster.snapshot();
        for peer in snapshot.peers.values() {
            peer.close();
        }
        self.cluster.swap(Snapshot::empty());
    }
}
