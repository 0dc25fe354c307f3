use std::io;
use std::path::PathBuf;
use std::time::Duration;

use openraft::error::ClientWriteError;
use openraft::error::RaftError;
use serde::Deserialize;
use serde::Serialize;

use crate::command::CodecError;
use crate::typ;
use crate::NodeId;

/// Why a committed entry could not be applied.
///
/// This travels back to the client inside the replicated response, so every
/// node that applies the same entry reports the same error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ApplyError {
    #[error("unknown command")]
    UnknownOp,

    #[error("failed to decode command: {0}")]
    Decode(String),
}

/// Errors returned by [`UserStore`](crate::store::UserStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not the leader")]
    NotLeader { leader: Option<NodeId> },

    #[error("user not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] CodecError),

    #[error("command was not committed within {0:?}")]
    CommitTimeout(Duration),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("raft error: {0}")]
    Raft(String),
}

impl From<typ::RaftError<typ::ClientWriteError>> for StoreError {
    fn from(e: typ::RaftError<typ::ClientWriteError>) -> Self {
        match e {
            RaftError::APIError(ClientWriteError::ForwardToLeader(fwd)) => StoreError::NotLeader {
                leader: fwd.leader_id,
            },
            other => StoreError::Raft(other.to_string()),
        }
    }
}

/// Errors from the on-disk snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),

    #[error("snapshot payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fatal errors while bringing a node up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open log store at {path}: {source}")]
    LogStore {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("failed to open snapshot store at {path}: {source}")]
    SnapshotStore {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },

    #[error("failed to build raft transport: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid raft config: {0}")]
    Config(#[from] openraft::ConfigError),

    #[error("failed to start raft: {0}")]
    Raft(String),

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}
