use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use openraft::storage::RaftStateMachine;
use openraft::storage::Snapshot;
use openraft::BasicNode;
use openraft::Entry;
use openraft::EntryPayload;
use openraft::LogId;
use openraft::OptionalSend;
use openraft::RaftSnapshotBuilder;
use openraft::SnapshotMeta;
use openraft::StorageError;
use openraft::StorageIOError;
use openraft::StoredMembership;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::command;
use crate::command::Op;
use crate::error::ApplyError;
use crate::error::SnapshotError;
use crate::store::snapshot::FileSnapshotStore;
use crate::store::snapshot::UserSnapshot;
use crate::store::Response;
use crate::NodeId;
use crate::TypeConfig;

/// Data contained in the raft state machine.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct StateMachineData {
    pub last_applied_log: Option<LogId<NodeId>>,

    pub last_membership: StoredMembership<NodeId, BasicNode>,

    /// username -> password
    pub users: BTreeMap<String, String>,
}

impl StateMachineData {
    /// Decodes and applies one command to the user map.
    ///
    /// A command that cannot be decoded or names an unknown operation leaves
    /// the map untouched.
    pub fn apply_command(&mut self, bytes: &[u8]) -> Result<(), ApplyError> {
        let cmd = command::decode(bytes).map_err(|e| ApplyError::Decode(e.to_string()))?;
        match cmd.op {
            Op::Set => {
                self.users.insert(cmd.username, cmd.password);
                Ok(())
            }
            Op::Unknown => Err(ApplyError::UnknownOp),
        }
    }
}

/// The replicated user map, shared between the raft engine and request
/// handlers.
#[derive(Debug)]
pub struct StateMachineStore {
    state_machine: RwLock<StateMachineData>,

    /// Used in identifier for snapshot.
    snapshot_idx: AtomicU64,

    snapshot_store: FileSnapshotStore,
}

impl StateMachineStore {
    /// Opens the state machine, restoring the newest snapshot in
    /// `snapshot_store` if there is one.
    pub async fn new(snapshot_store: FileSnapshotStore) -> Result<Self, SnapshotError> {
        let sm = Self {
            state_machine: RwLock::new(StateMachineData::default()),
            snapshot_idx: AtomicU64::new(0),
            snapshot_store,
        };

        if let Some(snap) = sm.snapshot_store.latest()? {
            tracing::info!("restoring state machine from snapshot {}", snap.meta.snapshot_id);
            sm.restore(&snap.meta, &snap.data).await?;
        }

        Ok(sm)
    }

    pub async fn get(&self, username: &str) -> Option<String> {
        let sm = self.state_machine.read().await;
        sm.users.get(username).cloned()
    }

    /// A copy of the whole user map.
    pub async fn users(&self) -> BTreeMap<String, String> {
        self.state_machine.read().await.users.clone()
    }

    pub async fn last_applied(&self) -> Option<LogId<NodeId>> {
        self.state_machine.read().await.last_applied_log
    }

    /// Serializes the current user map together with the position it covers.
    pub async fn snapshot(&self) -> Result<UserSnapshot, SnapshotError> {
        let sm = self.state_machine.read().await;
        let data = serde_json::to_vec(&sm.users)?;

        let last_applied_log = sm.last_applied_log;
        let last_membership = sm.last_membership.clone();
        drop(sm);

        let snapshot_idx = self.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot_id = if let Some(last) = last_applied_log {
            format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx)
        } else {
            format!("--{}", snapshot_idx)
        };

        Ok(UserSnapshot {
            meta: SnapshotMeta {
                last_log_id: last_applied_log,
                last_membership,
                snapshot_id,
            },
            data,
        })
    }

    /// Replaces the whole state with the snapshot `data` taken at `meta`.
    pub async fn restore(&self, meta: &SnapshotMeta<NodeId, BasicNode>, data: &[u8]) -> Result<(), SnapshotError> {
        let users: BTreeMap<String, String> = serde_json::from_slice(data)?;

        let mut sm = self.state_machine.write().await;
        *sm = StateMachineData {
            last_applied_log: meta.last_log_id,
            last_membership: meta.last_membership.clone(),
            users,
        };
        Ok(())
    }
}

impl RaftSnapshotBuilder<TypeConfig> for Arc<StateMachineStore> {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let snap = self.snapshot().await.map_err(|e| StorageIOError::read_state_machine(&e))?;
        let signature = snap.meta.signature();

        let sink = self
            .snapshot_store
            .create(&snap.meta)
            .map_err(|e| StorageIOError::write_snapshot(Some(signature.clone()), &e))?;
        snap.persist(sink).map_err(|e| StorageIOError::write_snapshot(Some(signature), &e))?;

        tracing::info!(
            "built snapshot {} at {:?}, {} bytes",
            snap.meta.snapshot_id,
            snap.meta.last_log_id,
            snap.data.len()
        );

        Ok(Snapshot {
            meta: snap.meta,
            snapshot: Box::new(Cursor::new(snap.data)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for Arc<StateMachineStore> {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<NodeId>>, StoredMembership<NodeId, BasicNode>), StorageError<NodeId>> {
        let sm = self.state_machine.read().await;
        Ok((sm.last_applied_log, sm.last_membership.clone()))
    }

    #[tracing::instrument(level = "trace", skip(self, entries))]
    async fn apply<I>(&mut self, entries: I) -> Result<Vec<Response>, StorageError<NodeId>>
    where I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend {
        let mut res = Vec::new();
        let mut sm = self.state_machine.write().await;

        for entry in entries {
            tracing::debug!(%entry.log_id, "replicate to sm");

            sm.last_applied_log = Some(entry.log_id);

            match entry.payload {
                EntryPayload::Blank => res.push(Response::ok()),
                EntryPayload::Normal(req) => {
                    let result = sm.apply_command(&req.command);
                    if let Err(e) = &result {
                        tracing::warn!(%entry.log_id, "rejected command: {}", e);
                    }
                    res.push(Response { result });
                }
                EntryPayload::Membership(mem) => {
                    tracing::info!(%entry.log_id, "membership changed: {:?}", mem);
                    sm.last_membership = StoredMembership::new(Some(entry.log_id), mem);
                    res.push(Response::ok());
                }
            }
        }
        Ok(res)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(&mut self) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    #[tracing::instrument(level = "trace", skip(self, snapshot))]
    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        tracing::info!(
            "installing snapshot {}, {} bytes",
            meta.snapshot_id,
            snapshot.get_ref().len()
        );

        let new_snapshot = UserSnapshot {
            meta: meta.clone(),
            data: snapshot.into_inner(),
        };

        // Reject a payload that does not decode before it replaces anything on disk.
        serde_json::from_slice::<BTreeMap<String, String>>(&new_snapshot.data)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;

        let sink = self
            .snapshot_store
            .create(meta)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        new_snapshot.persist(sink).map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;

        self.restore(meta, &new_snapshot.data)
            .await
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;
        new_snapshot.release();

        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        let latest = self.snapshot_store.latest().map_err(|e| StorageIOError::read_snapshot(None, &e))?;

        Ok(latest.map(|snap| Snapshot {
            meta: snap.meta,
            snapshot: Box::new(Cursor::new(snap.data)),
        }))
    }
}
