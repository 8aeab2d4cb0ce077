//! The PinFS guest: the node's recursive pinset as a root directory.

use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::CoreApi;
use crate::error::{Error, Kind, Result};
use crate::ipld::dagpb::symlink_block;
use crate::ipld::{EntryKind, NodeInfo, StreamEntry};
use crate::resolver::parse_cid;

use super::dir::{GuestDir, SnapshotDir, StreamDir};
use super::file::GuestFile;
use super::ipfs::IpfsGuest;
use super::{is_root, Expiry, GuestFs, GuestKind};

struct PinSnapshot {
    entries: Vec<StreamEntry>,
    fetched_at: Instant,
}

/// Pinset guest.
///
/// The IPFS guest is optional and only improves per-entry metadata; the DAG
/// service is optional and gates the pin mutations.
#[derive(Clone)]
pub struct PinGuest {
    client: Arc<dyn CoreApi>,
    ipfs: Option<IpfsGuest>,
    dag: Option<Arc<dyn CoreApi>>,
    expiry: Expiry,
    perm: u32,
    cache: Arc<Mutex<Option<PinSnapshot>>>,
    root_mtime: Arc<RwLock<SystemTime>>,
}

impl PinGuest {
    pub fn new(
        client: Arc<dyn CoreApi>,
        ipfs: Option<IpfsGuest>,
        dag: Option<Arc<dyn CoreApi>>,
        expiry: Expiry,
        perm: u32,
    ) -> Self {
        Self {
            client,
            ipfs,
            dag,
            expiry,
            perm,
            cache: Arc::new(Mutex::new(None)),
            root_mtime: Arc::new(RwLock::new(SystemTime::now())),
        }
    }

    fn root_info(&self) -> NodeInfo {
        let mtime = *self.root_mtime.read().expect("mtime lock never poisoned");
        NodeInfo {
            name: ".".to_string(),
            size: 0,
            kind: EntryKind::Directory,
            perm: self.perm,
            mtime,
        }
    }

    /// Drops the snapshot and zeroes the root mtime; the next fetch restamps
    /// both.
    async fn invalidate(&self) {
        *self.cache.lock().await = None;
        *self.root_mtime.write().expect("mtime lock never poisoned") = SystemTime::UNIX_EPOCH;
    }

    /// Opens the pin listing, serving or rebuilding the snapshot.
    async fn open_root(&self) -> Result<Box<dyn GuestDir>> {
        if self.expiry == Expiry::Disabled {
            // No snapshot is ever kept; every listing is a fresh stream.
            let stream = self.client.pin_ls().await?;
            return Ok(Box::new(StreamDir::new(stream)));
        }
        let mut guard = self.cache.clone().lock_owned().await;
        if let Some(snapshot) = guard.as_ref() {
            if self.expiry.fresh(snapshot.fetched_at) {
                return Ok(Box::new(SnapshotDir::new(snapshot.entries.clone())));
            }
        }
        // Refetch while the cache lock is held: entries are accumulated for
        // the snapshot and relayed to this reader as they arrive. The lock
        // travels into the sink so it is released exactly when the fetch
        // settles.
        let stream = self.client.pin_ls().await?;
        let root_mtime = self.root_mtime.clone();
        let dir = StreamDir::with_sink(stream, move |outcome| {
            if let Some(entries) = outcome {
                *guard = Some(PinSnapshot { entries, fetched_at: Instant::now() });
                *root_mtime.write().expect("mtime lock never poisoned") = SystemTime::now();
            }
            drop(guard);
        });
        Ok(Box::new(dir))
    }

    fn dag(&self, op: &'static str, name: &str) -> Result<&Arc<dyn CoreApi>> {
        self.dag
            .as_ref()
            .ok_or_else(|| Error::new(op, name, Kind::InvalidOperation))
    }
}

#[async_trait]
impl GuestFs for PinGuest {
    fn kind(&self) -> GuestKind {
        GuestKind::Pinfs
    }

    async fn stat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        match &self.ipfs {
            Some(ipfs) => ipfs.stat_at(path, 0).await,
            // Without an IPFS guest, entries read as directories stamped now.
            None => Ok(NodeInfo {
                name: path.trim_matches('/').to_string(),
                size: 0,
                kind: EntryKind::Directory,
                perm: self.perm,
                mtime: SystemTime::now(),
            }),
        }
    }

    async fn lstat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        match &self.ipfs {
            Some(ipfs) => ipfs.lstat(path).await,
            None => self.stat(path).await,
        }
    }

    async fn open(&self, path: &str) -> Result<Box<dyn GuestFile>> {
        if is_root(path) {
            return Err(Error::new("open", path, Kind::IsDir));
        }
        match &self.ipfs {
            Some(ipfs) => ipfs.open_at(path, 0).await,
            None => Err(Error::new("open", path, Kind::InvalidOperation)),
        }
    }

    async fn open_dir(&self, path: &str) -> Result<Box<dyn GuestDir>> {
        if is_root(path) {
            return self.open_root().await;
        }
        match &self.ipfs {
            Some(ipfs) => ipfs.open_dir_at(path, 0).await,
            None => Err(Error::new("opendir", path, Kind::InvalidOperation)),
        }
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        if is_root(path) {
            return Err(Error::new("readlink", path, Kind::InvalidItem));
        }
        match &self.ipfs {
            Some(ipfs) => ipfs.read_link(path).await,
            None => Err(Error::new("readlink", path, Kind::InvalidItem)),
        }
    }

    /// Pin creation: a UnixFS symlink node recording `target` is added to
    /// the DAG and pinned; the new pin shows up on the next fresh listing.
    async fn symlink(&self, target: &str, name: &str) -> Result<()> {
        let dag = self.dag("symlink", name)?;
        let block = symlink_block(target);
        let cid = dag.block_put(block).await?;
        dag.pin_add(&cid).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Pin removal by root CID.
    async fn unlink(&self, name: &str) -> Result<()> {
        let dag = self.dag("unlink", name)?;
        let trimmed = name.trim_matches('/');
        let cid = parse_cid("unlink", trimmed)?;
        dag.pin_rm(&cid).await?;
        self.invalidate().await;
        Ok(())
    }
}
