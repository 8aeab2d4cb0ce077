//! File objects returned by guest `open`.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::CoreApi;
use crate::error::{Error, Kind, Result};
use crate::ipld::NodeInfo;

/// A readable, seekable file handle.
///
/// Writes default to `ReadOnly`; no current guest stores file bytes.
#[async_trait]
pub trait GuestFile: Send {
    /// Metadata for the open file.
    async fn info(&mut self) -> Result<NodeInfo>;

    /// Moves the cursor, returning the new absolute position.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Reads up to `count` bytes at the cursor. Past-EOF reads are empty.
    async fn read(&mut self, count: usize) -> Result<Vec<u8>>;

    async fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(Error::new("write", self.path(), Kind::ReadOnly))
    }

    async fn truncate(&mut self, _size: u64) -> Result<()> {
        Err(Error::new("truncate", self.path(), Kind::ReadOnly))
    }

    /// Releases the handle; a second close reports `Closed`.
    async fn close(&mut self) -> Result<()>;

    /// Whether the cursor can be repositioned.
    fn seekable(&self) -> bool {
        true
    }

    /// Concrete object name, used in refresh diagnostics.
    fn type_name(&self) -> &'static str;

    /// Guest path this file was opened at.
    fn path(&self) -> &str;
}

impl std::fmt::Debug for dyn GuestFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.type_name()).field("path", &self.path()).finish()
    }
}

/// Applies a seek request against a linear cursor.
fn apply_seek(op: &'static str, path: &str, cursor: u64, size: u64, pos: SeekFrom) -> Result<u64> {
    let next = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => cursor.checked_add_signed(delta),
        SeekFrom::End(delta) => size.checked_add_signed(delta),
    };
    next.ok_or_else(|| Error::new(op, path, Kind::InvalidItem))
}

/// A UnixFS regular file, read through the node's UnixFS fetch operation.
pub struct UnixFile {
    client: Arc<dyn CoreApi>,
    /// `/ipfs/<cid>` path the node API reads from.
    api_path: String,
    info: NodeInfo,
    path: String,
    cursor: u64,
    closed: bool,
}

impl UnixFile {
    pub fn new(client: Arc<dyn CoreApi>, api_path: String, path: String, info: NodeInfo) -> Self {
        Self { client, api_path, info, path, cursor: 0, closed: false }
    }

    fn check_open(&self, op: &'static str) -> Result<()> {
        if self.closed {
            return Err(Error::new(op, &self.path, Kind::Closed));
        }
        Ok(())
    }
}

#[async_trait]
impl GuestFile for UnixFile {
    async fn info(&mut self) -> Result<NodeInfo> {
        self.check_open("stat")?;
        Ok(self.info.clone())
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.check_open("seek")?;
        self.cursor = apply_seek("seek", &self.path, self.cursor, self.info.size, pos)?;
        Ok(self.cursor)
    }

    async fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        self.check_open("read")?;
        if self.cursor >= self.info.size || count == 0 {
            return Ok(Vec::new());
        }
        let remaining = self.info.size - self.cursor;
        let length = remaining.min(count as u64);
        let bytes = self.client.cat(&self.api_path, self.cursor, Some(length)).await?;
        self.cursor += bytes.len() as u64;
        Ok(bytes)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("close", &self.path, Kind::Closed));
        }
        self.closed = true;
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "UnixFile"
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// A byte-reader over a node's raw bytes (cbor and other non-UnixFS nodes).
pub struct NodeFile {
    bytes: Arc<Vec<u8>>,
    info: NodeInfo,
    path: String,
    cursor: u64,
    closed: bool,
}

impl NodeFile {
    pub fn new(bytes: Arc<Vec<u8>>, path: String, info: NodeInfo) -> Self {
        Self { bytes, info, path, cursor: 0, closed: false }
    }
}

#[async_trait]
impl GuestFile for NodeFile {
    async fn info(&mut self) -> Result<NodeInfo> {
        if self.closed {
            return Err(Error::new("stat", &self.path, Kind::Closed));
        }
        Ok(self.info.clone())
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.closed {
            return Err(Error::new("seek", &self.path, Kind::Closed));
        }
        let size = self.bytes.len() as u64;
        self.cursor = apply_seek("seek", &self.path, self.cursor, size, pos)?;
        Ok(self.cursor)
    }

    async fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::new("read", &self.path, Kind::Closed));
        }
        let start = (self.cursor as usize).min(self.bytes.len());
        let end = start.saturating_add(count).min(self.bytes.len());
        self.cursor = end as u64;
        Ok(self.bytes[start..end].to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::new("close", &self.path, Kind::Closed));
        }
        self.closed = true;
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "NodeFile"
    }

    fn path(&self) -> &str {
        &self.path
    }
}
