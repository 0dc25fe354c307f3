//! Point-in-time snapshots of the user map and their on-disk home.
//!
//! A snapshot directory holds `meta.json` (the engine's [`SnapshotMeta`]) and
//! `state.json` (the serialized map). Directories are written under a `.tmp`
//! name and renamed into place only when complete.

use std::fs;
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use openraft::BasicNode;
use openraft::SnapshotMeta;

use crate::error::SnapshotError;
use crate::NodeId;

const META_FILE: &str = "meta.json";
const STATE_FILE: &str = "state.json";
const TMP_SUFFIX: &str = ".tmp";

/// Destination for the bytes of one snapshot.
///
/// Exactly one of [`close`](SnapshotSink::close) or
/// [`cancel`](SnapshotSink::cancel) ends the write.
pub trait SnapshotSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Makes the written snapshot durable and visible.
    fn close(self) -> Result<(), SnapshotError>;

    /// Discards everything written so far.
    fn cancel(self) -> Result<(), SnapshotError>;
}

/// A serialized copy of the user map along with the log position it covers.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub meta: SnapshotMeta<NodeId, BasicNode>,
    pub data: Vec<u8>,
}

impl UserSnapshot {
    /// Writes the snapshot into `sink`, cancelling the sink if the write fails.
    pub fn persist<S: SnapshotSink>(&self, mut sink: S) -> Result<(), SnapshotError> {
        if let Err(e) = sink.write(&self.data) {
            sink.cancel()?;
            return Err(e.into());
        }
        sink.close()
    }

    pub fn release(self) {}
}

/// Snapshot directories under one root, keeping only the newest `retain`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    retain: usize,
}

impl FileSnapshotStore {
    pub fn open(dir: impl AsRef<Path>, retain: usize) -> Result<Self, SnapshotError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        // Leftovers of a crash in the middle of a write.
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if is_tmp(&path) {
                tracing::warn!("removing incomplete snapshot: {}", path.display());
                fs::remove_dir_all(&path)?;
            }
        }

        Ok(Self {
            dir,
            retain: retain.max(1),
        })
    }

    /// Starts writing a new snapshot described by `meta`.
    pub fn create(&self, meta: &SnapshotMeta<NodeId, BasicNode>) -> Result<FileSnapshotSink, SnapshotError> {
        let name = dir_name(&meta.snapshot_id);
        let final_dir = self.dir.join(&name);
        let tmp_dir = self.dir.join(format!("{}{}", name, TMP_SUFFIX));

        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let meta_file = File::create(tmp_dir.join(META_FILE))?;
        serde_json::to_writer(&meta_file, meta)?;
        meta_file.sync_all()?;

        let state = File::create(tmp_dir.join(STATE_FILE))?;

        Ok(FileSnapshotSink {
            store: self.clone(),
            tmp_dir,
            final_dir,
            state,
        })
    }

    /// Metadata of every complete snapshot, newest first.
    pub fn list(&self) -> Result<Vec<(SnapshotMeta<NodeId, BasicNode>, PathBuf)>, SnapshotError> {
        let mut snapshots = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_dir() || is_tmp(&path) {
                continue;
            }
            let meta_path = path.join(META_FILE);
            if !meta_path.exists() {
                continue;
            }
            let meta: SnapshotMeta<NodeId, BasicNode> = serde_json::from_reader(File::open(&meta_path)?)?;
            snapshots.push((meta, path));
        }

        snapshots.sort_by(|(a, _), (b, _)| {
            b.last_log_id.cmp(&a.last_log_id).then_with(|| b.snapshot_id.cmp(&a.snapshot_id))
        });
        Ok(snapshots)
    }

    /// Loads the newest complete snapshot, if any.
    pub fn latest(&self) -> Result<Option<UserSnapshot>, SnapshotError> {
        let Some((meta, path)) = self.list()?.into_iter().next() else {
            return Ok(None);
        };
        let data = fs::read(path.join(STATE_FILE))?;
        Ok(Some(UserSnapshot { meta, data }))
    }

    fn reap(&self) -> Result<(), SnapshotError> {
        for (meta, path) in self.list()?.into_iter().skip(self.retain) {
            tracing::info!("reaping snapshot: {}", meta.snapshot_id);
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

/// Sink writing `state.json` into a temporary snapshot directory.
pub struct FileSnapshotSink {
    store: FileSnapshotStore,
    tmp_dir: PathBuf,
    final_dir: PathBuf,
    state: File,
}

impl SnapshotSink for FileSnapshotSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.state.write_all(buf)
    }

    fn close(self) -> Result<(), SnapshotError> {
        self.state.sync_all()?;
        drop(self.state);

        if self.final_dir.exists() {
            fs::remove_dir_all(&self.final_dir)?;
        }
        fs::rename(&self.tmp_dir, &self.final_dir)?;

        self.store.reap()
    }

    fn cancel(self) -> Result<(), SnapshotError> {
        drop(self.state);
        fs::remove_dir_all(&self.tmp_dir)?;
        Ok(())
    }
}

fn is_tmp(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.ends_with(TMP_SUFFIX)).unwrap_or(false)
}

fn dir_name(snapshot_id: &str) -> String {
    snapshot_id.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' }).collect()
}
