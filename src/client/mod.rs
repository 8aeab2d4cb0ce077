//! Remote node API client.
//!
//! [`CoreApi`] is the seam between the guests and the remote IPFS node: the
//! guests only ever talk to this trait. [`IpfsClient`] implements it over
//! the node's HTTP RPC; tests substitute an in-memory fake.

mod api;
mod transport;


use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::ipld::StreamEntry;

pub use transport::{Endpoint, DIAL_TIMEOUT, UNIX_AUTHORITY};

/// Default per-call budget for node API requests made by guests.
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

/// Lazy stream of directory or pin entries.
///
/// Entries arrive as `Ok` items; a failed fetch terminates the stream with
/// one final `Err` item. A closed, drained channel is end-of-stream.
pub type EntryStream = mpsc::Receiver<Result<StreamEntry>>;

/// An owner key known to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Short name chosen at key generation.
    pub name: String,
    /// The key's identity, which doubles as its IPNS name.
    pub id: String,
}

/// Operations the guests require of the remote node.
#[async_trait]
pub trait CoreApi: Send + Sync {
    /// Resolves an `/ipfs/...` path to the path of its last node.
    async fn resolve_path(&self, path: &str) -> Result<String>;

    /// Fetches the raw block behind a CID.
    async fn block_get(&self, cid: &Cid) -> Result<Vec<u8>>;

    /// Reads file bytes through the node's UnixFS layer.
    async fn cat(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Vec<u8>>;

    /// Streams the entries of a UnixFS directory.
    async fn ls(&self, cid: &Cid) -> Result<EntryStream>;

    /// Streams the node's recursive pinset.
    async fn pin_ls(&self) -> Result<EntryStream>;

    async fn pin_add(&self, cid: &Cid) -> Result<()>;

    async fn pin_rm(&self, cid: &Cid) -> Result<()>;

    /// Stores a dag-pb block, returning its CID.
    async fn block_put(&self, block: Vec<u8>) -> Result<Cid>;

    async fn key_list(&self) -> Result<Vec<KeyRecord>>;

    async fn key_gen(&self, name: &str) -> Result<KeyRecord>;

    async fn key_rm(&self, name: &str) -> Result<()>;

    /// Resolves an IPNS name to an `/ipfs/...` path.
    async fn name_resolve(&self, name: &str) -> Result<String>;

    /// Publishes `path` under the key named `key`.
    async fn name_publish(&self, key: &str, path: &str) -> Result<()>;
}

/// HTTP RPC client for a remote node.
///
/// One client exists per node API address; the mount manager pools them and
/// every guest bound to that address shares the same instance.
pub struct IpfsClient {
    endpoint: Endpoint,
    address: String,
    api_timeout: Duration,
    dial_timeout: Duration,
}

impl IpfsClient {
    /// Builds a client for the node at `address` (textual multiaddr).
    pub fn new(address: &str, api_timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::parse(address)?;
        Ok(Self {
            endpoint,
            address: address.to_string(),
            api_timeout,
            dial_timeout: DIAL_TIMEOUT,
        })
    }

    /// Canonical address string; the identifier half of a bind key.
    pub fn address(&self) -> &str {
        &self.address
    }
}
