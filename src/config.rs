use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use openraft::Config;
use openraft::ConfigError;
use openraft::SnapshotPolicy;

/// Settings of one user store node, read from flags or the environment.
#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct NodeConfig {
    /// Human readable node name, used in logs.
    #[clap(long, env = "NODE_ID", default_value = "node1")]
    pub node_id: String,

    /// Address the raft RPC server listens on; also the node's identity.
    #[clap(long, env = "USERS_RAFT_ADDRESS", default_value = "127.0.0.1:9000")]
    pub raft_addr: String,

    /// Comma separated raft addresses of the initial cluster members.
    #[clap(long, env = "BOOTSTRAP_SERVERS", default_value = "127.0.0.1:9001")]
    pub bootstrap_servers: String,

    #[clap(long, env = "DATA_PATH", default_value = "data/node1")]
    pub data_path: PathBuf,

    /// Address the user API listens on.
    #[clap(long, env = "SERVER_ADDRESS", default_value = "0.0.0.0:5000")]
    pub http_addr: String,

    #[clap(long, env = "COMMIT_TIMEOUT_MS", default_value_t = 10_000)]
    pub commit_timeout_ms: u64,

    #[clap(long, env = "DIAL_TIMEOUT_MS", default_value_t = 10_000)]
    pub dial_timeout_ms: u64,

    /// Idle connections kept per peer.
    #[clap(long, env = "MAX_POOL", default_value_t = 3)]
    pub max_pool: usize,

    #[clap(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 500)]
    pub heartbeat_interval_ms: u64,

    #[clap(long, env = "ELECTION_TIMEOUT_MIN_MS", default_value_t = 1500)]
    pub election_timeout_min_ms: u64,

    #[clap(long, env = "ELECTION_TIMEOUT_MAX_MS", default_value_t = 3000)]
    pub election_timeout_max_ms: u64,

    /// Number of applied entries since the last snapshot that triggers a new one.
    #[clap(long, env = "SNAPSHOT_THRESHOLD", default_value_t = 1000)]
    pub snapshot_threshold: u64,

    /// Number of snapshots kept on disk.
    #[clap(long, env = "SNAPSHOT_RETAIN", default_value_t = 2)]
    pub snapshot_retain: usize,
}

impl NodeConfig {
    /// Builds and validates the raft engine configuration.
    pub fn raft_config(&self) -> Result<Config, ConfigError> {
        let config = Config {
            cluster_name: "users".to_string(),
            heartbeat_interval: self.heartbeat_interval_ms,
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(self.snapshot_threshold),
            ..Default::default()
        };
        config.validate()
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn raft_dir(&self) -> PathBuf {
        self.data_path.join("raft")
    }

    pub fn log_store_path(&self) -> PathBuf {
        self.raft_dir().join("logs.db")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.raft_dir().join("snapshots")
    }
}
