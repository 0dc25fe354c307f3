//! Bringing a node up: identity, storage, transport and initial membership.

use std::collections::BTreeMap;
use std::sync::Arc;

use openraft::BasicNode;

use crate::app::App;
use crate::config::NodeConfig;
use crate::consensus::Consensus;
use crate::error::StartupError;
use crate::network::Network;
use crate::store::FileSnapshotStore;
use crate::store::LogStore;
use crate::store::StateMachineStore;
use crate::store::UserStore;
use crate::NodeId;
use crate::Raft;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// The node id of the member listening on raft address `addr`.
///
/// Ids are the 64-bit FNV-1a hash of the address, so every node derives the
/// same id for the same address.
pub fn node_id_of(addr: &str) -> NodeId {
    addr.bytes().fold(FNV_OFFSET_BASIS, |hash, b| (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Splits a comma separated address list, dropping blank items.
pub fn parse_bootstrap_servers(list: &str) -> Vec<String> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// The membership a fresh cluster starts with: every bootstrap server plus
/// the local node.
pub fn initial_members(local_addr: &str, bootstrap_servers: &str) -> BTreeMap<NodeId, BasicNode> {
    let mut members = BTreeMap::new();
    for addr in parse_bootstrap_servers(bootstrap_servers).into_iter().chain([local_addr.to_string()]) {
        members.insert(node_id_of(&addr), BasicNode { addr });
    }
    members
}

/// Opens storage and transport and starts the raft engine.
///
/// Nothing here talks to other nodes yet. Any failure is fatal.
pub async fn open(config: &NodeConfig) -> Result<App, StartupError> {
    let id = node_id_of(&config.raft_addr);
    tracing::info!(
        "starting node {} (id {}) at {}, data in {}",
        config.node_id,
        id,
        config.raft_addr,
        config.data_path.display()
    );

    let raft_config = Arc::new(config.raft_config()?);

    let snapshot_dir = config.snapshot_dir();
    let snapshot_store = FileSnapshotStore::open(&snapshot_dir, config.snapshot_retain).map_err(|source| {
        StartupError::SnapshotStore {
            path: snapshot_dir.clone(),
            source,
        }
    })?;
    let state_machine = StateMachineStore::new(snapshot_store).await.map_err(|source| StartupError::SnapshotStore {
        path: snapshot_dir.clone(),
        source,
    })?;
    let state_machine = Arc::new(state_machine);

    let log_path = config.log_store_path();
    let log_store = LogStore::open(&log_path).map_err(|source| StartupError::LogStore { path: log_path, source })?;

    let network = Network::new(config.dial_timeout(), config.max_pool).map_err(StartupError::Transport)?;

    let raft = Raft::new(id, raft_config, network, log_store, state_machine.clone())
        .await
        .map_err(|e| StartupError::Raft(e.to_string()))?;

    let store = UserStore::new(raft.clone(), state_machine, config.commit_timeout());

    Ok(App {
        id,
        addr: config.raft_addr.clone(),
        raft,
        store,
    })
}

/// Asks the engine to form the initial cluster.
///
/// A node that already holds raft state refuses, which is expected on every
/// restart; the failure is logged and otherwise ignored.
pub async fn bootstrap_cluster(app: &App, config: &NodeConfig) {
    let members = initial_members(&config.raft_addr, &config.bootstrap_servers);
    tracing::info!("bootstrapping cluster with members: {:?}", members);

    match app.raft.bootstrap_cluster(members).await {
        Ok(()) => tracing::info!("cluster bootstrapped"),
        Err(e) => tracing::warn!("failed to bootstrap cluster, continuing with existing state: {}", e),
    }
}

/// [`open`] followed by [`bootstrap_cluster`].
pub async fn start(config: &NodeConfig) -> Result<App, StartupError> {
    let app = open(config).await?;
    bootstrap_cluster(&app, config).await;
    Ok(app)
}
