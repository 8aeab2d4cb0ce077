//! CID parsing, path resolution, and the node/listing caches.
//!
//! Both caches are bounded by entry count and keyed by CID, so entries are
//! coherent by construction; eviction is the only form of invalidation.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use cid::Cid;
use moka::sync::Cache;
use tokio::time::timeout;

use crate::client::CoreApi;
use crate::error::{Error, Kind, Result};
use crate::ipld::{EntryKind, IpldNode, NodeInfo, StreamEntry};

/// Default per-fetch budget for resolver calls.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bounds for the node and listing caches.
pub const NODE_CACHE_COUNT: u64 = 256;
pub const LISTING_CACHE_COUNT: u64 = 64;

/// A fetched node together with its derived shape.
///
/// Storing the derivation alongside the node lets a stat followed by an open
/// reuse a single fetch.
pub struct NodeRecord {
    pub node: IpldNode,
    pub size: u64,
    pub kind: EntryKind,
}

/// Path and node resolution against one remote node.
pub struct Resolver {
    client: Arc<dyn CoreApi>,
    nodes: Option<Cache<Cid, Arc<NodeRecord>>>,
    listings: Option<Cache<Cid, Arc<Vec<StreamEntry>>>>,
    fetch_timeout: Duration,
}

impl Resolver {
    /// Builds a resolver with the given cache bounds.
    ///
    /// A bound of zero disables the respective cache; every call then
    /// degrades to an uncached fetch.
    pub fn new(
        client: Arc<dyn CoreApi>,
        node_cache_count: u64,
        listing_cache_count: u64,
        fetch_timeout: Duration,
    ) -> Self {
        let nodes = (node_cache_count > 0).then(|| Cache::new(node_cache_count));
        let listings = (listing_cache_count > 0).then(|| Cache::new(listing_cache_count));
        Self { client, nodes, listings, fetch_timeout }
    }

    pub fn client(&self) -> &Arc<dyn CoreApi> {
        &self.client
    }

    /// Resolves a guest path to the CID of its last node.
    ///
    /// The first component must decode as a CID. A component that is not
    /// even multibase is reported as missing; structurally invalid CIDs are
    /// I/O failures. Remaining components are resolved remotely.
    pub async fn to_cid(&self, path: &str) -> Result<Cid> {
        let trimmed = path.trim_matches('/');
        let (head, rest) = match trimmed.split_once('/') {
            Some((head, rest)) => (head, rest),
            None => (trimmed, ""),
        };
        let root = parse_cid("resolve", head)?;
        if rest.is_empty() {
            return Ok(root);
        }
        let projected = format!("/ipfs/{root}/{rest}");
        let resolved = timeout(self.fetch_timeout, self.client.resolve_path(&projected))
            .await
            .map_err(|e| Error::with_source("resolve", path, Kind::Io, e))??;
        let tail = resolved
            .strip_prefix("/ipfs/")
            .unwrap_or(&resolved)
            .trim_matches('/');
        parse_cid("resolve", tail)
    }

    /// Fetches (or recalls) the node behind a CID.
    pub async fn get_node(&self, cid: &Cid) -> Result<Arc<NodeRecord>> {
        if let Some(cache) = &self.nodes {
            if let Some(record) = cache.get(cid) {
                return Ok(record);
            }
        }
        let bytes = timeout(self.fetch_timeout, self.client.block_get(cid))
            .await
            .map_err(|e| Error::with_source("getnode", cid.to_string(), Kind::Io, e))??;
        let node = IpldNode::decode(cid, bytes)?;
        let (size, kind) = node.shape();
        let record = Arc::new(NodeRecord { node, size, kind });
        if let Some(cache) = &self.nodes {
            cache.insert(*cid, record.clone());
        }
        Ok(record)
    }

    /// Fetches (or recalls) the derived info for a node, under `name`.
    pub async fn get_info(
        &self,
        name: &str,
        cid: &Cid,
        perm: u32,
        mtime: SystemTime,
    ) -> Result<NodeInfo> {
        let record = self.get_node(cid).await?;
        Ok(NodeInfo {
            name: name.to_string(),
            size: record.size,
            kind: record.kind,
            perm,
            mtime,
        })
    }

    /// Returns a copy of a cached directory listing, if one is held.
    ///
    /// The copy is the caller's to mutate; later callers see the snapshot.
    pub fn cached_listing(&self, cid: &Cid) -> Option<Vec<StreamEntry>> {
        self.listings.as_ref()?.get(cid).map(|entries| entries.as_ref().clone())
    }

    /// Snapshots a fully drained listing for later readers.
    pub fn store_listing(&self, cid: &Cid, entries: Vec<StreamEntry>) {
        if let Some(cache) = &self.listings {
            cache.insert(*cid, Arc::new(entries));
        }
    }
}

/// Parses one path component as a CID, classifying the failure mode.
pub fn parse_cid(op: &'static str, text: &str) -> Result<Cid> {
    match text.parse::<Cid>() {
        Ok(cid) => Ok(cid),
        Err(cause) => {
            // CIDv0 is bare base58btc; everything else is multibase-prefixed.
            // A component that fails both decodes names nothing addressable.
            let decodes = multibase::decode(text).is_ok()
                || multibase::Base::Base58Btc.decode(text).is_ok();
            let kind = if decodes { Kind::Io } else { Kind::NotExist };
            Err(Error::with_source(op, text, kind, cause))
        }
    }
}
