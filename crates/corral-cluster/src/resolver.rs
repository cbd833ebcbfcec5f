//! The name-resolution seam for peer discovery.
//!
//! Discovery only needs two operations: "resolve SRV records for a
//! service name" and "resolve address records for a hostname". The
//! [`Resolver`] trait captures those so the engine can run against real
//! DNS ([`DnsResolver`], backed by hickory) or a fixed record table
//! ([`StaticResolver`]) in tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

use hickory_resolver::TokioAsyncResolver;

use crate::error::ClusterError;

/// One SRV record target: where a service instance can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    /// Target hostname, without the trailing root dot.
    pub host: String,
    /// Target port.
    pub port: u16,
}

/// Name resolution used by the discovery engine.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve SRV records for a service name.
    async fn lookup_srv(&self, service: &str) -> Result<Vec<SrvTarget>, ClusterError>;

    /// Resolve address (A/AAAA) records for a hostname.
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ClusterError>;
}

/// Real DNS resolution via hickory, using the system resolver config.
pub struct DnsResolver {
    inner: TokioAsyncResolver,
}

impl DnsResolver {
    /// Create a resolver from the system configuration (`/etc/resolv.conf`).
    pub fn from_system_conf() -> Result<Self, ClusterError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| ClusterError::Resolve(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[async_trait::async_trait]
impl Resolver for DnsResolver {
    async fn lookup_srv(&self, service: &str) -> Result<Vec<SrvTarget>, ClusterError> {
        let lookup = self
            .inner
            .srv_lookup(service)
            .await
            .map_err(|e| ClusterError::Resolve(e.to_string()))?;

        // Sort by priority, then weight, for stable candidate ordering.
        let mut records: Vec<_> = lookup.iter().collect();
        records.sort_by_key(|srv| (srv.priority(), std::cmp::Reverse(srv.weight())));

        Ok(records
            .into_iter()
            .map(|srv| SrvTarget {
                host: srv.target().to_utf8().trim_end_matches('.').to_string(),
                port: srv.port(),
            })
            .collect())
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ClusterError> {
        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| ClusterError::Resolve(e.to_string()))?;
        Ok(lookup.iter().collect())
    }
}

/// A resolver answering from fixed record tables.
///
/// Records can be replaced at any time, so tests can simulate scale-out
/// and scale-in between discovery passes. Unknown names resolve to an
/// error, like NXDOMAIN would.
#[derive(Default)]
pub struct StaticResolver {
    srv: RwLock<HashMap<String, Vec<SrvTarget>>>,
    ips: RwLock<HashMap<String, Vec<IpAddr>>>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the SRV records for a service name.
    pub fn set_srv(&self, service: impl Into<String>, targets: Vec<SrvTarget>) {
        self.srv
            .write()
            .expect("srv table lock poisoned")
            .insert(service.into(), targets);
    }

    /// Replace the address records for a hostname.
    pub fn set_ips(&self, host: impl Into<String>, ips: Vec<IpAddr>) {
        self.ips
            .write()
            .expect("ip table lock poisoned")
            .insert(host.into(), ips);
    }

    /// Remove all records for a hostname.
    pub fn remove_host(&self, host: &str) {
        self.ips.write().expect("ip table lock poisoned").remove(host);
        self.srv.write().expect("srv table lock poisoned").remove(host);
    }
}

#[async_trait::async_trait]
impl Resolver for StaticResolver {
    async fn lookup_srv(&self, service: &str) -> Result<Vec<SrvTarget>, ClusterError> {
        self.srv
            .read()
            .expect("srv table lock poisoned")
            .get(service)
            .cloned()
            .ok_or_else(|| ClusterError::Resolve(format!("no SRV records for {service:?}")))
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ClusterError> {
        self.ips
            .read()
            .expect("ip table lock poisoned")
            .get(host)
            .cloned()
            .ok_or_else(|| ClusterError::Resolve(format!("no address records for {host:?}")))
    }
}
