use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::command;
use crate::command::CodecError;
use crate::command::Command;
use crate::consensus::Consensus;
use crate::consensus::Role;
use crate::error::ApplyError;
use crate::error::StoreError;
use crate::Raft;

pub mod log_store;
pub mod snapshot;
pub mod state_machine;

pub use log_store::LogStore;
pub use snapshot::FileSnapshotStore;
pub use state_machine::StateMachineStore;

/// The application data carried by a replicated log entry: one encoded
/// [`Command`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub command: Vec<u8>,
}

impl Request {
    pub fn encode(cmd: &Command) -> Result<Self, CodecError> {
        Ok(Self {
            command: command::encode(cmd)?,
        })
    }
}

/// The outcome of applying one entry, identical on every node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub result: Result<(), ApplyError>,
}

impl Response {
    pub fn ok() -> Self {
        Self { result: Ok(()) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreInfo {
    pub leader: bool,
}

/// The user directory: writes go through consensus, reads hit the local map.
pub struct UserStore<C = Raft> {
    consensus: C,
    state_machine: Arc<StateMachineStore>,
    commit_timeout: Duration,
}

impl<C> UserStore<C>
where C: Consensus
{
    pub fn new(consensus: C, state_machine: Arc<StateMachineStore>, commit_timeout: Duration) -> Self {
        Self {
            consensus,
            state_machine,
            commit_timeout,
        }
    }

    /// Sets the password of `username`, creating the user if needed.
    ///
    /// Only a leader accepts writes. Returns once the command is committed and
    /// applied, or with [`StoreError::CommitTimeout`] if that takes longer
    /// than the commit timeout. A timed out command may still be applied later.
    #[tracing::instrument(level = "debug", skip(self, password))]
    pub async fn set(&self, username: &str, password: &str) -> Result<(), StoreError> {
        self.execute(Command::set(username, password)).await
    }

    async fn execute(&self, cmd: Command) -> Result<(), StoreError> {
        if self.consensus.role() != Role::Leader {
            let leader = self.consensus.current_leader();
            tracing::warn!("rejecting write on non-leader, known leader: {:?}", leader);
            return Err(StoreError::NotLeader { leader });
        }

        let request = Request::encode(&cmd)?;

        let response = match tokio::time::timeout(self.commit_timeout, self.consensus.submit(request)).await {
            Ok(res) => res?,
            Err(_) => {
                tracing::warn!("command not committed within {:?}", self.commit_timeout);
                return Err(StoreError::CommitTimeout(self.commit_timeout));
            }
        };

        response.result.map_err(StoreError::from)
    }

    /// Reads from the local map, which may lag the leader on a follower.
    pub async fn get(&self, username: &str) -> Result<String, StoreError> {
        self.state_machine.get(username).await.ok_or(StoreError::NotFound)
    }

    pub fn info(&self) -> StoreInfo {
        StoreInfo {
            leader: self.consensus.role() == Role::Leader,
        }
    }
}
