//! The narrow view of the consensus engine that the user store depends on.

use std::collections::BTreeMap;
use std::future::Future;

use openraft::BasicNode;
use openraft::ServerState;
use serde::Deserialize;
use serde::Serialize;

use crate::error::StoreError;
use crate::store::Request;
use crate::store::Response;
use crate::NodeId;
use crate::Raft;

/// The role of the local node as reported by the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl From<ServerState> for Role {
    fn from(state: ServerState) -> Self {
        match state {
            ServerState::Leader => Role::Leader,
            ServerState::Candidate => Role::Candidate,
            _ => Role::Follower,
        }
    }
}

/// What the user store needs from a consensus engine.
pub trait Consensus: Send + Sync + 'static {
    fn role(&self) -> Role;

    /// The leader this node currently knows of, if any.
    fn current_leader(&self) -> Option<NodeId>;

    /// Appends `request` to the replicated log and resolves once it has been
    /// committed and applied locally.
    fn submit(&self, request: Request) -> impl Future<Output = Result<Response, StoreError>> + Send;

    /// Forms a new cluster from `members`.
    ///
    /// Fails on a node that already has state.
    fn bootstrap_cluster(
        &self,
        members: BTreeMap<NodeId, BasicNode>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl Consensus for Raft {
    fn role(&self) -> Role {
        self.metrics().borrow().state.into()
    }

    fn current_leader(&self) -> Option<NodeId> {
        self.metrics().borrow().current_leader
    }

    async fn submit(&self, request: Request) -> Result<Response, StoreError> {
        let resp = self.client_write(request).await?;
        Ok(resp.data)
    }

    async fn bootstrap_cluster(&self, members: BTreeMap<NodeId, BasicNode>) -> Result<(), StoreError> {
        self.initialize(members).await.map_err(|e| StoreError::Raft(e.to_string()))
    }
}
