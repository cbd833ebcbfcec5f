//! A handle to a single cluster member.

use std::sync::Mutex;

use corral_types::Role;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::ClusterError;

/// Outbound connection state of a peer.
enum ConnState {
    /// Channel handle exists; the transport connects on first use.
    Open(Channel),
    /// The endpoint could not be constructed when the peer was discovered.
    Failed(String),
    /// The peer was drained and its channel dropped.
    Closed,
}

/// A single cluster member: name, advertised roles, dial target and an
/// owned outbound gRPC channel.
///
/// Peers are created by the discovery engine and shared as `Arc<Peer>`
/// through cluster snapshots; the same `Arc` is reused across discovery
/// passes as long as the name and dial target are unchanged, so callers
/// keep their established connection.
pub struct Peer {
    name: String,
    roles: Vec<Role>,
    target: String,
    conn: Mutex<ConnState>,
}

impl Peer {
    /// Create a peer and dial its target.
    ///
    /// The channel is built with a lazy connect: the handle exists
    /// immediately and the transport connects on first use. Endpoint
    /// construction errors are recorded on the peer rather than failing
    /// discovery.
    pub(crate) fn dial(name: String, roles: Vec<Role>, target: String, tls: bool) -> Self {
        let conn = match dial_channel(&target, tls) {
            Ok(channel) => ConnState::Open(channel),
            Err(e) => ConnState::Failed(e),
        };
        Self {
            name,
            roles,
            target,
            conn: Mutex::new(conn),
        }
    }

    /// The peer's name, unique within a snapshot.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The roles this peer advertises.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Whether this peer advertises the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// The address the peer's channel dials.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// A clone of the peer's channel.
    ///
    /// Returns the recorded dial error if the channel could not be built,
    /// or [`ClusterError::ConnectionClosed`] once the peer has been drained.
    pub fn conn(&self) -> Result<Channel, ClusterError> {
        match &*self.conn.lock().expect("peer conn lock poisoned") {
            ConnState::Open(channel) => Ok(channel.clone()),
            ConnState::Failed(e) => Err(ClusterError::Dial(e.clone())),
            ConnState::Closed => Err(ClusterError::ConnectionClosed),
        }
    }

    /// Drop the peer's channel. Called when the peer is drained after
    /// disappearing from discovery, and on cluster leave.
    pub(crate) fn close(&self) {
        *self.conn.lock().expect("peer conn lock poisoned") = ConnState::Closed;
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Build a lazily connecting channel to `target` (a host:port address).
fn dial_channel(target: &str, tls: bool) -> Result<Channel, String> {
    let scheme = if tls { "https" } else { "http" };
    let mut endpoint =
        Endpoint::from_shared(format!("{scheme}://{target}")).map_err(|e| e.to_string())?;
    if tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new())
            .map_err(|e| e.to_string())?;
    }
    Ok(endpoint.connect_lazy())
}
