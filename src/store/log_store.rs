//! Durable raft log backed by sled.
//!
//! Entries live in the `logs` tree keyed by big-endian index; vote, committed
//! log id and last purged log id live in the `meta` tree as JSON.

use std::fmt::Debug;
use std::ops::Bound;
use std::ops::RangeBounds;
use std::path::Path;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use meta::StoreMeta;
use openraft::storage::LogFlushed;
use openraft::storage::RaftLogStorage;
use openraft::Entry;
use openraft::LogId;
use openraft::LogState;
use openraft::OptionalSend;
use openraft::RaftLogReader;
use openraft::StorageError;
use openraft::StorageIOError;
use openraft::Vote;

use crate::NodeId;
use crate::TypeConfig;

#[derive(Debug, Clone)]
pub struct LogStore {
    _db: sled::Db,
    logs: sled::Tree,
    meta: sled::Tree,
}

impl LogStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        let logs = db.open_tree("logs")?;
        let meta = db.open_tree("meta")?;
        Ok(Self { _db: db, logs, meta })
    }

    /// Get a store metadata.
    ///
    /// It returns `None` if the store does not have such a metadata stored.
    fn get_meta<M: StoreMeta>(&self) -> Result<Option<M::Value>, StorageError<NodeId>> {
        let Some(bytes) = self.meta.get(M::KEY).map_err(M::read_err)? else {
            return Ok(None);
        };

        let t = serde_json::from_slice(&bytes).map_err(M::read_err)?;
        Ok(Some(t))
    }

    async fn put_meta<M: StoreMeta>(&self, value: &M::Value) -> Result<(), StorageError<NodeId>> {
        let json_value = serde_json::to_vec(value).map_err(|e| M::write_err(value, e))?;
        self.meta.insert(M::KEY, json_value).map_err(|e| M::write_err(value, e))?;
        self.meta.flush_async().await.map_err(|e| M::write_err(value, e))?;
        Ok(())
    }

    async fn remove_meta<M: StoreMeta>(&self) -> Result<(), StorageError<NodeId>> {
        self.meta.remove(M::KEY).map_err(M::read_err)?;
        self.meta.flush_async().await.map_err(M::read_err)?;
        Ok(())
    }

    /// Removes every entry whose index is within `range`.
    async fn remove_logs(&self, range: impl RangeBounds<u64>) -> Result<(), StorageError<NodeId>> {
        let start = match range.start_bound() {
            Bound::Included(x) => id_to_bin(*x),
            Bound::Excluded(x) => id_to_bin(*x + 1),
            Bound::Unbounded => id_to_bin(0),
        };

        let mut batch = sled::Batch::default();
        for res in self.logs.range::<&[u8], _>(start.as_slice()..) {
            let (key, _) = res.map_err(|e| StorageIOError::write_logs(&e))?;
            if !range.contains(&bin_to_id(&key)) {
                break;
            }
            batch.remove(key);
        }

        self.logs.apply_batch(batch).map_err(|e| StorageIOError::write_logs(&e))?;
        self.logs.flush_async().await.map_err(|e| StorageIOError::write_logs(&e))?;
        Ok(())
    }
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>> {
        let start = match range.start_bound() {
            Bound::Included(x) => id_to_bin(*x),
            Bound::Excluded(x) => id_to_bin(*x + 1),
            Bound::Unbounded => id_to_bin(0),
        };

        let mut res = Vec::new();
        for item in self.logs.range::<&[u8], _>(start.as_slice()..) {
            let (key, val) = item.map_err(|e| StorageIOError::read_logs(&e))?;
            let id = bin_to_id(&key);
            if !range.contains(&id) {
                break;
            }

            let entry: Entry<TypeConfig> = serde_json::from_slice(&val).map_err(|e| StorageIOError::read_logs(&e))?;
            debug_assert_eq!(id, entry.log_id.index);
            res.push(entry);
        }
        Ok(res)
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last_log_id = match self.logs.last().map_err(|e| StorageIOError::read_logs(&e))? {
            None => None,
            Some((_, val)) => {
                let entry: Entry<TypeConfig> =
                    serde_json::from_slice(&val).map_err(|e| StorageIOError::read_logs(&e))?;
                Some(entry.log_id)
            }
        };

        let last_purged_log_id = self.get_meta::<meta::LastPurged>()?;

        let last_log_id = match last_log_id {
            None => last_purged_log_id,
            Some(x) => Some(x),
        };

        Ok(LogState {
            last_purged_log_id,
            last_log_id,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.put_meta::<meta::Vote>(vote).await
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        self.get_meta::<meta::Vote>()
    }

    async fn save_committed(&mut self, committed: Option<LogId<NodeId>>) -> Result<(), StorageError<NodeId>> {
        match committed {
            Some(c) => self.put_meta::<meta::Committed>(&c).await,
            None => self.remove_meta::<meta::Committed>().await,
        }
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        self.get_meta::<meta::Committed>()
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn append<I>(&mut self, entries: I, callback: LogFlushed<TypeConfig>) -> Result<(), StorageError<NodeId>>
    where I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend {
        let mut batch = sled::Batch::default();
        for entry in entries {
            let value = serde_json::to_vec(&entry).map_err(|e| StorageIOError::write_logs(&e))?;
            batch.insert(id_to_bin(entry.log_id.index).as_slice(), value);
        }

        self.logs.apply_batch(batch).map_err(|e| StorageIOError::write_logs(&e))?;
        self.logs.flush_async().await.map_err(|e| StorageIOError::write_logs(&e))?;

        callback.log_io_completed(Ok(()));
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn truncate(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        tracing::debug!("truncate: [{:?}, +oo)", log_id);
        self.remove_logs(log_id.index..).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn purge(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        tracing::debug!("delete_log: [0, {:?}]", log_id);

        // Entries at or before last-purged are ignored on recovery, so the
        // marker goes first.
        self.put_meta::<meta::LastPurged>(&log_id).await?;
        self.remove_logs(..=log_id.index).await
    }
}

fn id_to_bin(id: u64) -> [u8; 8] {
    let mut buf = [0; 8];
    BigEndian::write_u64(&mut buf, id);
    buf
}

fn bin_to_id(buf: &[u8]) -> u64 {
    BigEndian::read_u64(&buf[0..8])
}

/// Metadata kept next to the log.
mod meta {
    use openraft::AnyError;
    use openraft::ErrorSubject;
    use openraft::ErrorVerb;
    use openraft::LogId;
    use openraft::StorageError;
    use openraft::StorageIOError;

    use crate::NodeId;

    pub(crate) trait StoreMeta {
        /// The key used to store in the `meta` tree
        const KEY: &'static str;

        type Value: serde::Serialize + serde::de::DeserializeOwned;

        fn subject(v: Option<&Self::Value>) -> ErrorSubject<NodeId>;

        fn read_err(e: impl std::error::Error + 'static) -> StorageError<NodeId> {
            StorageIOError::new(Self::subject(None), ErrorVerb::Read, AnyError::new(&e)).into()
        }

        fn write_err(v: &Self::Value, e: impl std::error::Error + 'static) -> StorageError<NodeId> {
            StorageIOError::new(Self::subject(Some(v)), ErrorVerb::Write, AnyError::new(&e)).into()
        }
    }

    pub(crate) struct LastPurged {}
    pub(crate) struct Vote {}
    pub(crate) struct Committed {}

    impl StoreMeta for LastPurged {
        const KEY: &'static str = "last_purged_log_id";
        type Value = LogId<NodeId>;

        fn subject(_v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Store
        }
    }

    impl StoreMeta for Vote {
        const KEY: &'static str = "vote";
        type Value = openraft::Vote<NodeId>;

        fn subject(_v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Vote
        }
    }

    impl StoreMeta for Committed {
        const KEY: &'static str = "committed";
        type Value = LogId<NodeId>;

        fn subject(_v: Option<&Self::Value>) -> ErrorSubject<NodeId> {
            ErrorSubject::Store
        }
    }
}
