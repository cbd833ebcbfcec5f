//! Shared types and identifiers for Corral.
//!
//! This crate defines the core types used across the Corral workspace:
//! cluster roles ([`Role`]), entity identification ([`EntityKind`],
//! [`EntityIds`], [`Eui64`]), and the parse errors that come with them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cluster roles
// ---------------------------------------------------------------------------

/// Logical service a cluster peer provides.
///
/// A single peer process may advertise several roles (e.g. a monolithic
/// deployment advertises all of them); discovery groups peers by role so
/// that callers can ask "give me a peer for role R".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Entity registry: the store of record for applications, gateways,
    /// devices, users and organizations.
    EntityRegistry,
    /// Access control endpoints (rights and API key checks).
    ///
    /// Served by the same process as the entity registry; the cluster
    /// façade remaps it before resolution.
    Access,
    /// Gateway server: terminates gateway connections and owns gateway
    /// session state. The sharded, claim-owning role.
    GatewayServer,
    /// Network server: MAC-layer handling and device session state.
    NetworkServer,
    /// Application server: payload handling and integrations.
    ApplicationServer,
    /// Join server: over-the-air activation.
    JoinServer,
    /// Crypto server: key operations backing the join server.
    CryptoServer,
}

impl Role {
    /// All known roles, in stable order.
    pub const ALL: [Role; 7] = [
        Role::EntityRegistry,
        Role::Access,
        Role::GatewayServer,
        Role::NetworkServer,
        Role::ApplicationServer,
        Role::JoinServer,
        Role::CryptoServer,
    ];

    /// The kebab-case name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::EntityRegistry => "entity-registry",
            Role::Access => "access",
            Role::GatewayServer => "gateway-server",
            Role::NetworkServer => "network-server",
            Role::ApplicationServer => "application-server",
            Role::JoinServer => "join-server",
            Role::CryptoServer => "crypto-server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseError::UnknownRole(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Entity identification
// ---------------------------------------------------------------------------

/// Kind of entity addressed by a routing or claim lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    /// An application (collection of end devices).
    Application,
    /// An OAuth client.
    Client,
    /// An end device (sensor/actuator).
    EndDevice,
    /// A gateway.
    Gateway,
    /// An organization.
    Organization,
    /// A user account.
    User,
}

impl EntityKind {
    /// The lowercase name used in routing keys and claim storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Client => "client",
            EntityKind::EndDevice => "end-device",
            EntityKind::Gateway => "gateway",
            EntityKind::Organization => "organization",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 64-bit extended unique identifier, as carried by gateways and devices.
///
/// Displayed and parsed in dash-separated hex: `01-02-03-04-05-06-07-08`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Eui64([u8; 8]);

impl Eui64 {
    /// Return the raw 8-byte representation.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<[u8; 8]> for Eui64 {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui64({self})")
    }
}

impl FromStr for Eui64 {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        let mut parts = s.split('-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseError::InvalidEui(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseError::InvalidEui(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseError::InvalidEui(s.to_string()));
        }
        Ok(Self(bytes))
    }
}

/// Identifiers of a single entity, as passed to routing and claim lookups.
///
/// The unique ID is stable and sufficient on its own; gateways may
/// additionally carry an EUI, which claim lookups prefer when present
/// (gateway traffic usually arrives addressed by EUI).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityIds {
    /// Kind of the identified entity.
    pub kind: EntityKind,
    /// The entity's unique ID within its kind.
    pub unique_id: String,
    /// Extended unique identifier, if the entity has one (gateways).
    pub eui: Option<Eui64>,
}

impl EntityIds {
    /// Identifiers for an entity of the given kind.
    pub fn new(kind: EntityKind, unique_id: impl Into<String>) -> Self {
        Self {
            kind,
            unique_id: unique_id.into(),
            eui: None,
        }
    }

    /// Identifiers for a gateway without a known EUI.
    pub fn gateway(unique_id: impl Into<String>) -> Self {
        Self::new(EntityKind::Gateway, unique_id)
    }

    /// Identifiers for a gateway with an EUI.
    pub fn gateway_with_eui(unique_id: impl Into<String>, eui: Eui64) -> Self {
        Self {
            kind: EntityKind::Gateway,
            unique_id: unique_id.into(),
            eui: Some(eui),
        }
    }

    /// Identifiers for an end device.
    pub fn end_device(unique_id: impl Into<String>) -> Self {
        Self::new(EntityKind::EndDevice, unique_id)
    }

    /// The key used to place this entity on a role's hash ring.
    pub fn routing_key(&self) -> String {
        format!("{}:{}", self.kind, self.unique_id)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing Corral identifiers out of text.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The string does not name a known cluster role.
    #[error("unknown cluster role: {0:?}")]
    UnknownRole(String),

    /// The string is not a dash-separated 8-byte hex EUI.
    #[error("invalid EUI-64: {0:?}")]
    InvalidEui(String),
}
