//! The IPFS guest: a read-only content-addressed DAG exposed as a
//! filesystem. Paths are rooted at CIDs; there is nothing to list at `/`.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use cid::Cid;

use crate::error::{Error, Kind, Result};
use crate::ipld::{EntryKind, IpldNode, NodeInfo};
use crate::resolver::Resolver;

use super::dir::{GuestDir, SnapshotDir, StreamDir};
use super::file::{GuestFile, NodeFile, UnixFile};
use super::link::normalize_link_target;
use super::{is_root, GuestFs, GuestKind};

const LINK_PREFIX: &str = "/ipfs/";

/// Read-only DAG guest.
#[derive(Clone)]
pub struct IpfsGuest {
    resolver: Arc<Resolver>,
    perm: u32,
    mtime: SystemTime,
    link_limit: u32,
}

impl IpfsGuest {
    pub fn new(resolver: Arc<Resolver>, perm: u32, link_limit: u32) -> Self {
        Self { resolver, perm, mtime: SystemTime::now(), link_limit }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn perm(&self) -> u32 {
        self.perm
    }

    /// Root metadata: an empty pseudo-directory stamped at mount time.
    fn root_info(&self) -> NodeInfo {
        NodeInfo {
            name: ".".to_string(),
            size: 0,
            kind: EntryKind::Directory,
            perm: self.perm,
            mtime: self.mtime,
        }
    }

    /// One step of symlink resolution, charging against the link budget.
    fn follow_link(
        &self,
        op: &'static str,
        path: &str,
        node: &IpldNode,
        depth: &mut u32,
    ) -> Result<String> {
        *depth += 1;
        if *depth >= self.link_limit {
            return Err(Error::new(op, path, Kind::Recursion));
        }
        let raw = node
            .link_target()
            .ok_or_else(|| Error::new(op, path, Kind::InvalidItem))?;
        let raw = std::str::from_utf8(raw)
            .map_err(|e| Error::with_source(op, path, Kind::InvalidItem, e))?;
        normalize_link_target(path.trim_matches('/'), raw, LINK_PREFIX)
    }

    /// Opens `path` as a file with `depth` symlink hops already taken.
    ///
    /// IPNS reuses this entry point after translating names to CIDs, so the
    /// budget spans delegated chains too.
    pub(super) async fn open_at(
        &self,
        path: &str,
        mut depth: u32,
    ) -> Result<Box<dyn GuestFile>> {
        let mut current = path.to_string();
        loop {
            if is_root(&current) {
                return Err(Error::new("open", path, Kind::IsDir));
            }
            let cid = self.resolver.to_cid(&current).await?;
            let record = self.resolver.get_node(&cid).await?;
            match record.kind {
                EntryKind::Regular => {
                    let name = base_name(&current);
                    let info = NodeInfo {
                        name,
                        size: record.size,
                        kind: EntryKind::Regular,
                        perm: self.perm,
                        mtime: self.mtime,
                    };
                    return Ok(self.open_regular(cid, &record.node, current, info));
                }
                EntryKind::Directory => return Err(Error::new("open", &current, Kind::IsDir)),
                EntryKind::Symlink => {
                    current = self.follow_link("open", &current, &record.node, &mut depth)?;
                }
                EntryKind::Irregular => {
                    return Err(Error::new("open", &current, Kind::InvalidOperation))
                }
            }
        }
    }

    fn open_regular(
        &self,
        cid: Cid,
        node: &IpldNode,
        path: String,
        info: NodeInfo,
    ) -> Box<dyn GuestFile> {
        match node {
            // cbor nodes read as their raw block bytes; everything else goes
            // through the node's UnixFS fetch.
            IpldNode::Cbor(bytes) => {
                Box::new(NodeFile::new(Arc::new(bytes.clone()), path, info))
            }
            _ => {
                let api_path = format!("/ipfs/{cid}");
                Box::new(UnixFile::new(self.resolver.client().clone(), api_path, path, info))
            }
        }
    }

    /// Opens `path` as a directory with `depth` symlink hops already taken.
    pub(super) async fn open_dir_at(
        &self,
        path: &str,
        mut depth: u32,
    ) -> Result<Box<dyn GuestDir>> {
        let mut current = path.to_string();
        loop {
            if is_root(&current) {
                return Ok(Box::new(SnapshotDir::new(Vec::new())));
            }
            let cid = self.resolver.to_cid(&current).await?;
            let record = self.resolver.get_node(&cid).await?;
            match record.kind {
                EntryKind::Directory => {
                    if let Some(snapshot) = self.resolver.cached_listing(&cid) {
                        return Ok(Box::new(SnapshotDir::new(snapshot)));
                    }
                    let stream = self.resolver.client().ls(&cid).await?;
                    let resolver = self.resolver.clone();
                    let dir = StreamDir::with_sink(stream, move |outcome| {
                        if let Some(entries) = outcome {
                            resolver.store_listing(&cid, entries);
                        }
                    });
                    return Ok(Box::new(dir));
                }
                EntryKind::Symlink => {
                    current =
                        self.follow_link("opendir", &current, &record.node, &mut depth)?;
                }
                _ => return Err(Error::new("opendir", &current, Kind::NotDir)),
            }
        }
    }

    /// Stat with symlink following, sharing the caller's link budget.
    pub(super) async fn stat_at(&self, path: &str, mut depth: u32) -> Result<NodeInfo> {
        let mut current = path.to_string();
        loop {
            if is_root(&current) {
                return Ok(self.root_info());
            }
            let cid = self.resolver.to_cid(&current).await?;
            let record = self.resolver.get_node(&cid).await?;
            if record.kind != EntryKind::Symlink {
                let name = base_name(&current);
                return self.resolver.get_info(&name, &cid, self.perm, self.mtime).await;
            }
            current = self.follow_link("stat", &current, &record.node, &mut depth)?;
        }
    }
}

fn base_name(path: &str) -> String {
    path.trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

#[async_trait]
impl GuestFs for IpfsGuest {
    fn kind(&self) -> GuestKind {
        GuestKind::Ipfs
    }

    async fn stat(&self, path: &str) -> Result<NodeInfo> {
        self.stat_at(path, 0).await
    }

    async fn lstat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        let cid = self.resolver.to_cid(path).await?;
        let name = base_name(path);
        self.resolver.get_info(&name, &cid, self.perm, self.mtime).await
    }

    async fn open(&self, path: &str) -> Result<Box<dyn GuestFile>> {
        self.open_at(path, 0).await
    }

    async fn open_dir(&self, path: &str) -> Result<Box<dyn GuestDir>> {
        self.open_dir_at(path, 0).await
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        if is_root(path) {
            return Err(Error::new("readlink", path, Kind::InvalidItem));
        }
        let cid = self.resolver.to_cid(path).await?;
        let record = self.resolver.get_node(&cid).await?;
        let raw = record
            .node
            .link_target()
            .ok_or_else(|| Error::new("readlink", path, Kind::InvalidItem))?;
        let raw = std::str::from_utf8(raw)
            .map_err(|e| Error::with_source("readlink", path, Kind::InvalidItem, e))?;
        normalize_link_target(path.trim_matches('/'), raw, LINK_PREFIX)
    }
}
