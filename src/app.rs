use openraft::BasicNode;
use openraft::RaftMetrics;

use crate::error::StoreError;
use crate::store::UserStore;
use crate::NodeId;
use crate::Raft;

// Representation of a running node. This struct is shared by the raft RPC
// handlers and the user API handlers.
pub struct App {
    pub id: NodeId,
    pub addr: String,
    pub raft: Raft,
    pub store: UserStore,
}

impl App {
    pub fn metrics(&self) -> RaftMetrics<NodeId, BasicNode> {
        self.raft.metrics().borrow().clone()
    }

    /// Builds a snapshot now instead of waiting for the snapshot policy.
    pub async fn trigger_snapshot(&self) -> Result<(), StoreError> {
        self.raft.trigger().snapshot().await.map_err(|e| StoreError::Raft(e.to_string()))
    }

    pub async fn shutdown(&self) -> Result<(), StoreError> {
        tracing::info!("shutting down node {} at {}", self.id, self.addr);
        self.raft.shutdown().await.map_err(|e| StoreError::Raft(e.to_string()))
    }
}
