//! TOML configuration for the Corral daemon.

use std::path::Path;
use std::time::Duration;

use corral_cluster::DiscoveryTarget;
use corral_types::Role;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity.
    pub node: NodeSection,
    /// Peer discovery.
    pub cluster: ClusterSection,
    /// Claim registry backend and cache.
    pub claims: ClaimsSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Name this node claims entities under. Defaults to the hostname.
    pub name: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: hostname(),
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Discovery mode. Only `"dns"` is supported.
    pub discovery: String,
    /// Seconds between discovery passes.
    pub interval_secs: u64,
    /// Seconds a removed peer stays connectable so in-flight calls drain.
    pub grace_secs: u64,
    /// Whether peer connections use TLS.
    pub tls: bool,
    /// Addresses to resolve, each tagged with the roles served there.
    pub targets: Vec<TargetSection>,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            discovery: "dns".to_string(),
            interval_secs: 10,
            grace_secs: 10,
            tls: false,
            targets: Vec::new(),
        }
    }
}

/// One `[[cluster.targets]]` entry.
#[derive(Debug, Deserialize)]
pub struct TargetSection {
    /// `"host:port"` for A/AAAA resolution, bare `"host"` for SRV.
    pub address: String,
    /// Roles served by the peers behind this address.
    pub roles: Vec<Role>,
}

/// `[claims]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClaimsSection {
    /// Backend type: `"redis"` or `"memory"`.
    pub backend: String,
    /// Redis connection URL (redis backend only).
    pub redis_url: String,
    /// Seconds a node's claim sets live without a keep-alive refresh.
    pub ttl_secs: u64,
    /// Maximum number of cached claim lookups.
    pub cache_size: u64,
    /// Seconds a cached claim lookup stays valid.
    pub cache_ttl_secs: u64,
}

impl Default for ClaimsSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            ttl_secs: corral_claims::DEFAULT_CLAIM_TTL.as_secs(),
            cache_size: corral_claims::DEFAULT_CACHE_SIZE,
            cache_ttl_secs: corral_claims::DEFAULT_CACHE_TTL.as_secs(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.cluster.interval_secs)
    }

    pub fn discovery_grace(&self) -> Duration {
        Duration::from_secs(self.cluster.grace_secs)
    }

    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claims.ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.claims.cache_ttl_secs)
    }

    /// Discovery targets in the form the cluster layer expects.
    pub fn discovery_targets(&self) -> Vec<DiscoveryTarget> {
        self.cluster
            .targets
            .iter()
            .map(|t| DiscoveryTarget {
                address: t.address.clone(),
                roles: t.roles.clone(),
            })
            .collect()
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "corral-node".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.cluster.discovery, "dns");
        assert_eq!(config.cluster.interval_secs, 10);
        assert_eq!(config.claims.backend, "memory");
        assert_eq!(config.log.level, "info");
        assert!(config.cluster.targets.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = CliConfig::from_toml(
            r#"
            [node]
            name = "gs1"

            [cluster]
            interval_secs = 5
            grace_secs = 15
            tls = true

            [[cluster.targets]]
            address = "is.cluster.local:1885"
            roles = ["entity-registry", "access"]

            [[cluster.targets]]
            address = "gs.cluster.local"
            roles = ["gateway-server"]

            [claims]
            backend = "redis"
            redis_url = "redis://redis.cluster.local:6379"
            ttl_secs = 20

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.name, "gs1");
        assert_eq!(config.cluster.interval_secs, 5);
        assert!(config.cluster.tls);
        assert_eq!(config.cluster.targets.len(), 2);
        assert_eq!(
            config.cluster.targets[0].roles,
            [Role::EntityRegistry, Role::Access]
        );
        assert_eq!(config.cluster.targets[1].address, "gs.cluster.local");
        assert_eq!(config.claims.backend, "redis");
        assert_eq!(config.claim_ttl(), Duration::from_secs(20));
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = CliConfig::from_toml(
            r#"
            [[cluster.targets]]
            address = "x.cluster.local:1885"
            roles = ["not-a-role"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_sections_fall_back_to_defaults() {
        let config = CliConfig::from_toml(
            r#"
            [claims]
            backend = "redis"
            "#,
        )
        .unwrap();
        assert_eq!(config.claims.backend, "redis");
        assert_eq!(config.claims.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.claims.cache_size, corral_claims::DEFAULT_CACHE_SIZE);
    }
}
