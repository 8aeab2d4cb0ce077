//! The IPNS guest: mutable names resolved to CIDs, reads delegated to the
//! IPFS guest.

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use cid::Cid;
use dashmap::DashMap;

use crate::client::CoreApi;
use crate::error::{Error, Kind, Result};
use crate::ipld::{EntryKind, NodeInfo};

use super::dir::GuestDir;
use super::file::GuestFile;
use super::ipfs::IpfsGuest;
use super::link::normalize_link_target;
use super::{is_root, Expiry, GuestFs, GuestKind};

const LINK_PREFIX: &str = "/ipns/";

/// Last known resolution of one name. Replaced wholesale so readers always
/// observe a consistent CID/timestamp pair.
struct NameRecord {
    cid: Cid,
    resolved_at: Instant,
}

/// Mutable-name guest.
#[derive(Clone)]
pub struct IpnsGuest {
    ipfs: IpfsGuest,
    client: Arc<dyn CoreApi>,
    names: Arc<DashMap<String, NameRecord>>,
    expiry: Expiry,
    perm: u32,
    mtime: SystemTime,
}

impl IpnsGuest {
    pub fn new(ipfs: IpfsGuest, client: Arc<dyn CoreApi>, expiry: Expiry, perm: u32) -> Self {
        Self {
            ipfs,
            client,
            names: Arc::new(DashMap::new()),
            expiry,
            perm,
            mtime: SystemTime::now(),
        }
    }

    pub(super) fn ipfs(&self) -> &IpfsGuest {
        &self.ipfs
    }

    fn root_info(&self) -> NodeInfo {
        NodeInfo {
            name: ".".to_string(),
            size: 0,
            kind: EntryKind::Directory,
            perm: self.perm,
            mtime: self.mtime,
        }
    }

    /// Resolves `name` to its current root CID, consulting the record cache.
    pub async fn resolve_name(&self, name: &str) -> Result<Cid> {
        if let Some(record) = self.names.get(name) {
            if self.expiry.fresh(record.resolved_at) {
                return Ok(record.cid);
            }
        }
        let resolved = self.client.name_resolve(name).await?;
        let tail = resolved
            .strip_prefix("/ipfs/")
            .unwrap_or(&resolved)
            .trim_matches('/');
        let cid = crate::resolver::parse_cid("resolve", tail)
            .map_err(|e| e.with_path(name))?;
        self.names
            .insert(name.to_string(), NameRecord { cid, resolved_at: Instant::now() });
        Ok(cid)
    }

    /// Splits an IPNS path into its name and the remainder below it.
    fn split(path: &str) -> (&str, &str) {
        let trimmed = path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((name, rest)) => (name, rest),
            None => (trimmed, ""),
        }
    }

    /// Rewrites `/name/rest` into the delegate path `/cid/rest`.
    async fn translate(&self, path: &str) -> Result<(String, Cid, String)> {
        let (name, rest) = Self::split(path);
        let cid = self.resolve_name(name).await?;
        let translated = if rest.is_empty() {
            format!("/{cid}")
        } else {
            format!("/{cid}/{rest}")
        };
        Ok((name.to_string(), cid, translated))
    }
}

#[async_trait]
impl GuestFs for IpnsGuest {
    fn kind(&self) -> GuestKind {
        GuestKind::Ipns
    }

    async fn stat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        let (_, _, translated) = self.translate(path).await?;
        self.ipfs.stat_at(&translated, 0).await.map_err(|e| e.with_path(path))
    }

    async fn lstat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        let (_, _, translated) = self.translate(path).await?;
        self.ipfs.lstat(&translated).await.map_err(|e| e.with_path(path))
    }

    async fn open(&self, path: &str) -> Result<Box<dyn GuestFile>> {
        if is_root(path) {
            return Err(Error::new("open", path, Kind::IsDir));
        }
        let (name, root, translated) = self.translate(path).await?;
        let inner = self.ipfs.open_at(&translated, 0).await.map_err(|e| e.with_path(path))?;
        let (_, rest) = Self::split(path);
        Ok(Box::new(RefreshFile {
            guest: self.clone(),
            path: path.to_string(),
            name,
            rest: rest.to_string(),
            root,
            inner,
            closed: false,
        }))
    }

    async fn open_dir(&self, path: &str) -> Result<Box<dyn GuestDir>> {
        if is_root(path) {
            return self.ipfs.open_dir_at(".", 0).await;
        }
        let (_, _, translated) = self.translate(path).await?;
        self.ipfs.open_dir_at(&translated, 0).await.map_err(|e| e.with_path(path))
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        if is_root(path) {
            return Err(Error::new("readlink", path, Kind::InvalidItem));
        }
        let (_, _, translated) = self.translate(path).await?;
        let resolver = self.ipfs.resolver();
        let cid = resolver.to_cid(&translated).await.map_err(|e| e.with_path(path))?;
        let record = resolver.get_node(&cid).await.map_err(|e| e.with_path(path))?;
        let raw = record
            .node
            .link_target()
            .ok_or_else(|| Error::new("readlink", path, Kind::InvalidItem))?;
        let raw = std::str::from_utf8(raw)
            .map_err(|e| Error::with_source("readlink", path, Kind::InvalidItem, e))?;
        normalize_link_target(path.trim_matches('/'), raw, LINK_PREFIX)
    }
}

/// File shim that tracks the published root of its name.
///
/// Before every operation the name is re-resolved; if the root moved, the
/// underlying file is reopened against the new root with the read cursor
/// carried over.
struct RefreshFile {
    guest: IpnsGuest,
    path: String,
    name: String,
    rest: String,
    root: Cid,
    inner: Box<dyn GuestFile>,
    closed: bool,
}

impl RefreshFile {
    fn check_open(&self, op: &'static str) -> Result<()> {
        if self.closed {
            return Err(Error::new(op, &self.path, Kind::Closed));
        }
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        let current = self.guest.resolve_name(&self.name).await?;
        if current == self.root {
            return Ok(());
        }
        let translated = if self.rest.is_empty() {
            format!("/{current}")
        } else {
            format!("/{}/{}", current, self.rest)
        };
        let mut fresh = self
            .guest
            .ipfs()
            .open_at(&translated, 0)
            .await
            .map_err(|e| e.with_path(&*self.path))?;
        if !self.inner.seekable() || !fresh.seekable() {
            return Err(Error::with_source(
                "refresh",
                &*self.path,
                Kind::Other,
                format!(
                    "cannot carry cursor from {} to {}",
                    self.inner.type_name(),
                    fresh.type_name()
                ),
            ));
        }
        let position = self.inner.seek(SeekFrom::Current(0)).await?;
        fresh.seek(SeekFrom::Start(position)).await?;
        let mut stale = std::mem::replace(&mut self.inner, fresh);
        let _ = stale.close().await;
        self.root = current;
        Ok(())
    }
}

#[async_trait]
impl GuestFile for RefreshFile {
    async fn info(&mut self) -> Result<NodeInfo> {
        self.check_open("stat")?;
        self.refresh().await?;
        self.inner.info().await
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open("seek")?;
        self.refresh().await?;
        self.inner.seek(pos).await
    }

    async fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        self.check_open("read")?;
        self.refresh().await?;
        self.inner.read(count).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("close", &self.path, Kind::Closed));
        }
        self.closed = true;
        self.inner.close().await
    }

    fn type_name(&self) -> &'static str {
        "RefreshFile"
    }

    fn path(&self) -> &str {
        &self.path
    }
}
