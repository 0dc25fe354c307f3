use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use openraft::BasicNode;
use openraft::RaftMetrics;
use openraft::ServerState;
use raft_userstore::app::App;
use raft_userstore::config::NodeConfig;
use raft_userstore::NodeId;

/// Config of a single node cluster with fast elections, storing data in `dir`.
pub fn node_config(dir: &Path, raft_addr: &str) -> anyhow::Result<NodeConfig> {
    cluster_node_config(dir, raft_addr, "127.0.0.1:0", raft_addr)
}

/// Config of one member of a cluster formed from `bootstrap_servers`.
pub fn cluster_node_config(
    dir: &Path,
    raft_addr: &str,
    http_addr: &str,
    bootstrap_servers: &str,
) -> anyhow::Result<NodeConfig> {
    let data_path = dir.to_string_lossy().to_string();
    let config = NodeConfig::try_parse_from([
        "userserver",
        "--raft-addr",
        raft_addr,
        "--http-addr",
        http_addr,
        "--bootstrap-servers",
        bootstrap_servers,
        "--data-path",
        data_path.as_str(),
        "--commit-timeout-ms",
        "5000",
        "--heartbeat-interval-ms",
        "50",
        "--election-timeout-min-ms",
        "150",
        "--election-timeout-max-ms",
        "300",
    ])?;
    Ok(config)
}

/// Polls the node's metrics until `f` holds, for up to 10 seconds.
pub async fn wait_for_metrics<F>(app: &App, msg: &str, f: F) -> anyhow::Result<RaftMetrics<NodeId, BasicNode>>
where F: Fn(&RaftMetrics<NodeId, BasicNode>) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let metrics = app.metrics();
        if f(&metrics) {
            return Ok(metrics);
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for {}: {:?}", msg, metrics);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub async fn wait_for_leader(app: &App) -> anyhow::Result<()> {
    wait_for_metrics(app, "become leader", |m| m.state == ServerState::Leader).await?;
    Ok(())
}
