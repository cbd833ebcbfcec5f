//! Scenario tests for discovery and peer resolution.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use corral_claims::{ClaimRegistry, MemoryClaimRegistry, MemoryStore};
use corral_types::{EntityIds, Eui64, Role};

use crate::discovery::{self, DiscoveryConfig, DiscoveryHandle, DiscoveryTarget};
use crate::error::ClusterError;
use crate::resolver::{SrvTarget, StaticResolver};
use crate::Cluster;

// -----------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------

fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

fn target(address: &str, roles: &[Role]) -> DiscoveryTarget {
    DiscoveryTarget {
        address: address.to_string(),
        roles: roles.to_vec(),
    }
}

/// Join a cluster over a static resolver with fast test timings.
async fn join(
    resolver: Arc<StaticResolver>,
    cluster: Arc<Cluster>,
    targets: Vec<DiscoveryTarget>,
) -> DiscoveryHandle {
    discovery::join(DiscoveryConfig::test_config(targets), resolver, cluster).await
}

/// Wait long enough for at least one periodic pass to run.
async fn next_pass() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

fn peer_names(cluster: &Cluster, role: Role) -> Vec<String> {
    cluster
        .get_peers(role)
        .iter()
        .map(|p| p.name().to_string())
        .collect()
}

// -----------------------------------------------------------------------
// Discovery scenarios
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_explicit_port_discovery_and_scale_out() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver.clone(),
        cluster.clone(),
        vec![target("is.cluster.local:1885", &[Role::EntityRegistry])],
    )
    .await;

    assert_eq!(
        peer_names(&cluster, Role::EntityRegistry),
        ["10.0.0.1:1885"]
    );

    // A second replica appears in DNS; the next pass picks it up.
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1), ip(10, 0, 0, 2)]);
    next_pass().await;

    assert_eq!(
        peer_names(&cluster, Role::EntityRegistry),
        ["10.0.0.1:1885", "10.0.0.2:1885"]
    );

    handle.leave().await;
}

#[tokio::test]
async fn test_srv_discovery_names_peers_by_host_label() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_srv(
        "gs.cluster.local",
        vec![
            SrvTarget {
                host: "gs1.cluster.local".into(),
                port: 1885,
            },
            SrvTarget {
                host: "gs2.cluster.local".into(),
                port: 1885,
            },
        ],
    );
    resolver.set_ips("gs1.cluster.local", vec![ip(10, 0, 1, 1)]);
    resolver.set_ips("gs2.cluster.local", vec![ip(10, 0, 1, 2)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("gs.cluster.local", &[Role::GatewayServer])],
    )
    .await;

    assert_eq!(peer_names(&cluster, Role::GatewayServer), ["gs1", "gs2"]);

    let gs1 = cluster.get_peers(Role::GatewayServer)[0].clone();
    assert_eq!(gs1.target(), "10.0.1.1:1885");

    handle.leave().await;
}

#[tokio::test]
async fn test_unchanged_peer_reused_across_passes() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver.clone(),
        cluster.clone(),
        vec![target("is.cluster.local:1885", &[Role::EntityRegistry])],
    )
    .await;

    let before = cluster.get_peers(Role::EntityRegistry)[0].clone();

    // Scale out; the existing peer must keep its identity (and thus its
    // established connection) while the new one is dialed.
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1), ip(10, 0, 0, 2)]);
    next_pass().await;

    let after = cluster
        .get_peers(Role::EntityRegistry)
        .into_iter()
        .find(|p| p.name() == "10.0.0.1:1885")
        .unwrap();
    assert!(Arc::ptr_eq(&before, &after), "peer must be reused, not redialed");

    handle.leave().await;
}

#[tokio::test]
async fn test_removed_peer_drains_after_grace() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1), ip(10, 0, 0, 2)]);

    // A grace delay well past the pass interval, so the draining and
    // closed states are observable without racing the drain timer.
    let config = DiscoveryConfig {
        grace: Duration::from_millis(500),
        ..DiscoveryConfig::test_config(vec![target(
            "is.cluster.local:1885",
            &[Role::EntityRegistry],
        )])
    };
    let cluster = Cluster::new();
    let handle = discovery::join(config, resolver.clone(), cluster.clone()).await;

    let removed = cluster
        .get_peers(Role::EntityRegistry)
        .into_iter()
        .find(|p| p.name() == "10.0.0.2:1885")
        .unwrap();

    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1)]);
    next_pass().await;

    // Gone from the snapshot, but still connectable during the grace
    // delay so in-flight calls can finish.
    assert_eq!(
        peer_names(&cluster, Role::EntityRegistry),
        ["10.0.0.1:1885"]
    );
    assert!(removed.conn().is_ok(), "still draining");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(
        matches!(removed.conn(), Err(ClusterError::ConnectionClosed)),
        "drained peer must be closed after the grace delay"
    );

    handle.leave().await;
}

#[tokio::test]
async fn test_duplicate_name_keeps_first_target_and_merges_roles() {
    let resolver = Arc::new(StaticResolver::new());
    // Two services resolve to hosts sharing the instance label "gs1"
    // but pointing at different endpoints.
    resolver.set_srv(
        "gs.cluster.local",
        vec![SrvTarget {
            host: "gs1.cluster.local".into(),
            port: 1885,
        }],
    );
    resolver.set_srv(
        "gs.other.local",
        vec![SrvTarget {
            host: "gs1.other.local".into(),
            port: 1886,
        }],
    );
    resolver.set_ips("gs1.cluster.local", vec![ip(10, 0, 1, 1)]);
    resolver.set_ips("gs1.other.local", vec![ip(10, 0, 2, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![
            target("gs.cluster.local", &[Role::GatewayServer]),
            target("gs.other.local", &[Role::NetworkServer]),
        ],
    )
    .await;

    // One peer under the shared name, first target wins, roles merged.
    let gs = cluster.get_peers(Role::GatewayServer);
    let ns = cluster.get_peers(Role::NetworkServer);
    assert_eq!(gs.len(), 1);
    assert_eq!(gs[0].name(), "gs1");
    assert_eq!(gs[0].target(), "10.0.1.1:1885");
    assert_eq!(ns.len(), 1);
    assert!(Arc::ptr_eq(&gs[0], &ns[0]));

    handle.leave().await;
}

#[tokio::test]
async fn test_lookup_failure_isolated_to_target() {
    let resolver = Arc::new(StaticResolver::new());
    // Only one of the two targets resolves.
    resolver.set_ips("ns.cluster.local", vec![ip(10, 0, 2, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![
            target("ns.cluster.local:1884", &[Role::NetworkServer]),
            target("as.cluster.local:1884", &[Role::ApplicationServer]),
        ],
    )
    .await;

    assert_eq!(
        peer_names(&cluster, Role::NetworkServer),
        ["10.0.2.1:1884"]
    );
    assert!(peer_names(&cluster, Role::ApplicationServer).is_empty());

    handle.leave().await;
}

#[tokio::test]
async fn test_leave_clears_snapshot_and_closes_peers() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("is.cluster.local:1885", &[Role::EntityRegistry])],
    )
    .await;

    let peer = cluster.get_peers(Role::EntityRegistry)[0].clone();
    handle.leave().await;

    assert!(peer_names(&cluster, Role::EntityRegistry).is_empty());
    assert!(matches!(peer.conn(), Err(ClusterError::ConnectionClosed)));
}

// -----------------------------------------------------------------------
// Peer resolution
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_get_peer_without_ids_picks_among_role_peers() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1), ip(10, 0, 0, 2)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("is.cluster.local:1885", &[Role::EntityRegistry])],
    )
    .await;

    for _ in 0..10 {
        let peer = cluster.get_peer(Role::EntityRegistry, None).await.unwrap();
        assert!(peer.name().starts_with("10.0.0."));
    }

    match cluster.get_peer(Role::JoinServer, None).await {
        Err(ClusterError::PeerUnavailable { role }) => assert_eq!(role, Role::JoinServer),
        other => panic!("expected PeerUnavailable, got {other:?}"),
    }

    handle.leave().await;
}

#[tokio::test]
async fn test_get_peer_with_ids_is_deterministic_across_rebuilds() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("ns.cluster.local", vec![ip(10, 0, 2, 1), ip(10, 0, 2, 2), ip(10, 0, 2, 3)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("ns.cluster.local:1884", &[Role::NetworkServer])],
    )
    .await;

    let ids = EntityIds::end_device("dev1");
    let first = cluster
        .get_peer(Role::NetworkServer, Some(&ids))
        .await
        .unwrap();

    // Rings are rebuilt from scratch every pass; with an unchanged peer
    // set the mapping must not move.
    next_pass().await;
    let second = cluster
        .get_peer(Role::NetworkServer, Some(&ids))
        .await
        .unwrap();
    assert_eq!(first.name(), second.name());

    handle.leave().await;
}

#[tokio::test]
async fn test_access_role_resolves_through_entity_registry() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("is.cluster.local:1885", &[Role::EntityRegistry])],
    )
    .await;

    let peer = cluster.get_peer(Role::Access, None).await.unwrap();
    assert_eq!(peer.name(), "10.0.0.1:1885");
    assert_eq!(peer_names(&cluster, Role::Access), ["10.0.0.1:1885"]);

    handle.leave().await;
}

#[tokio::test]
async fn test_get_peer_conn_returns_channel() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("is.cluster.local", vec![ip(10, 0, 0, 1)]);

    let cluster = Cluster::new();
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("is.cluster.local:1885", &[Role::EntityRegistry])],
    )
    .await;

    assert!(cluster
        .get_peer_conn(Role::EntityRegistry, None)
        .await
        .is_ok());

    handle.leave().await;
}

// -----------------------------------------------------------------------
// Claim-registry integration
// -----------------------------------------------------------------------

/// Two gateway-server peers; the claim registry decides ownership.
async fn gateway_cluster(
    store: MemoryStore,
) -> (Arc<Cluster>, DiscoveryHandle) {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_srv(
        "gs.cluster.local",
        vec![
            SrvTarget {
                host: "gs1.cluster.local".into(),
                port: 1885,
            },
            SrvTarget {
                host: "gs2.cluster.local".into(),
                port: 1885,
            },
        ],
    );
    resolver.set_ips("gs1.cluster.local", vec![ip(10, 0, 1, 1)]);
    resolver.set_ips("gs2.cluster.local", vec![ip(10, 0, 1, 2)]);

    let claims = Arc::new(MemoryClaimRegistry::new("local", store));
    let cluster = Cluster::with_claims(claims);
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("gs.cluster.local", &[Role::GatewayServer])],
    )
    .await;
    (cluster, handle)
}

#[tokio::test]
async fn test_gateway_lookup_consults_claim_registry() {
    let store = MemoryStore::new();
    let (cluster, handle) = gateway_cluster(store.clone()).await;

    // gs2 owns the gateway session.
    let owner = MemoryClaimRegistry::new("gs2", store);
    let eui: Eui64 = "01-02-03-04-05-06-07-08".parse().unwrap();
    owner
        .claim(&EntityIds::gateway_with_eui("gw1", eui))
        .await
        .unwrap();

    let peer = cluster
        .get_peer(Role::GatewayServer, Some(&EntityIds::gateway_with_eui("gw1", eui)))
        .await
        .unwrap();
    assert_eq!(peer.name(), "gs2");

    // EUI-indexed lookup resolves even under a different ID.
    let peer = cluster
        .get_peer(
            Role::GatewayServer,
            Some(&EntityIds::gateway_with_eui("some-other-id", eui)),
        )
        .await
        .unwrap();
    assert_eq!(peer.name(), "gs2");

    handle.leave().await;
}

#[tokio::test]
async fn test_unclaimed_gateway_falls_back_to_ring() {
    let (cluster, handle) = gateway_cluster(MemoryStore::new()).await;

    let ids = EntityIds::gateway("unclaimed-gw");
    let first = cluster
        .get_peer(Role::GatewayServer, Some(&ids))
        .await
        .unwrap();
    let second = cluster
        .get_peer(Role::GatewayServer, Some(&ids))
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second), "ring fallback is deterministic");

    handle.leave().await;
}

#[tokio::test]
async fn test_single_gateway_peer_skips_claim_lookup() {
    let resolver = Arc::new(StaticResolver::new());
    resolver.set_ips("gs.cluster.local", vec![ip(10, 0, 1, 1)]);

    let claims = Arc::new(MemoryClaimRegistry::new("local", MemoryStore::new()));
    let cluster = Cluster::with_claims(claims);
    let handle = join(
        resolver,
        cluster.clone(),
        vec![target("gs.cluster.local:1885", &[Role::GatewayServer])],
    )
    .await;

    let peer = cluster
        .get_peer(Role::GatewayServer, Some(&EntityIds::gateway("gw1")))
        .await
        .unwrap();
    assert_eq!(peer.name(), "10.0.1.1:1885");

    handle.leave().await;
}
