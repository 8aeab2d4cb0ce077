//! IPLD node model shared by the resolver, the guests, and the node client.

pub mod dagpb;

#[cfg(test)]
mod tests;

use std::time::SystemTime;

use cid::Cid;
use prost::Message;

use crate::error::{Error, Kind, Result};
use dagpb::{DataType, PbNode, UnixFsData};

/// Multicodec numbers this crate distinguishes.
pub const CODEC_DAG_PB: u64 = 0x70;
pub const CODEC_RAW: u64 = 0x55;
pub const CODEC_CBOR: u64 = 0x51;
pub const CODEC_DAG_CBOR: u64 = 0x71;

/// What a directory entry or node resolves to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    /// UnixFS types with no host-filesystem equivalent (metadata nodes).
    Irregular,
}

/// Host-facing metadata derived from an IPLD node.
///
/// Permissions come from mount-time configuration; UnixFSv1 stores none.
/// The mtime defaults to mount time and is only ever bumped by mutations
/// that invalidate a listing (pin-set changes).
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    pub perm: u32,
    pub mtime: SystemTime,
}

/// One entry of a streamed or snapshotted directory listing.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub name: String,
    pub cid: Option<Cid>,
    pub size: u64,
    pub kind: EntryKind,
}

/// A fetched and decoded IPLD node.
#[derive(Debug, Clone)]
pub enum IpldNode {
    /// dag-pb node with its UnixFS envelope.
    Proto { node: PbNode, meta: UnixFsData },
    /// cbor/dag-cbor node, exposed as an opaque raw-bytes file.
    Cbor(Vec<u8>),
    /// Anything else (raw leaves included), exposed as a regular file.
    Other(Vec<u8>),
}

impl IpldNode {
    /// Decodes raw block bytes according to the CID's codec.
    pub fn decode(cid: &Cid, bytes: Vec<u8>) -> Result<Self> {
        match cid.codec() {
            CODEC_DAG_PB => {
                let node = PbNode::decode(bytes.as_slice()).map_err(|e| {
                    Error::with_source("decode", cid.to_string(), Kind::Io, e)
                })?;
                let data = node.data.clone().unwrap_or_default();
                let meta = UnixFsData::decode(data.as_slice()).map_err(|e| {
                    Error::with_source("decode", cid.to_string(), Kind::Io, e)
                })?;
                Ok(IpldNode::Proto { node, meta })
            }
            CODEC_CBOR | CODEC_DAG_CBOR => Ok(IpldNode::Cbor(bytes)),
            _ => Ok(IpldNode::Other(bytes)),
        }
    }

    /// The UnixFS data type, if this is a dag-pb node.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            IpldNode::Proto { meta, .. } => DataType::try_from(meta.data_type).ok(),
            _ => None,
        }
    }

    /// The symlink target carried by a UnixFS symlink node.
    pub fn link_target(&self) -> Option<&[u8]> {
        match self {
            IpldNode::Proto { meta, .. }
                if matches!(DataType::try_from(meta.data_type), Ok(DataType::Symlink)) =>
            {
                meta.data.as_deref()
            }
            _ => None,
        }
    }

    /// Derives host-facing metadata for this node.
    pub fn info(&self, name: &str, perm: u32, mtime: SystemTime) -> NodeInfo {
        let (size, kind) = self.shape();
        NodeInfo { name: name.to_string(), size, kind, perm, mtime }
    }

    /// Size and entry kind as derived from the node alone.
    pub fn shape(&self) -> (u64, EntryKind) {
        match self {
            IpldNode::Proto { meta, .. } => {
                let size = meta.filesize.unwrap_or(0);
                match DataType::try_from(meta.data_type) {
                    Ok(DataType::File) | Ok(DataType::Raw) => (size, EntryKind::Regular),
                    Ok(DataType::Directory) | Ok(DataType::HamtShard) => {
                        (size, EntryKind::Directory)
                    }
                    Ok(DataType::Symlink) => {
                        let target_len = meta.data.as_ref().map_or(0, |d| d.len() as u64);
                        (target_len, EntryKind::Symlink)
                    }
                    _ => (size, EntryKind::Irregular),
                }
            }
            IpldNode::Cbor(bytes) => (bytes.len() as u64, EntryKind::Regular),
            IpldNode::Other(bytes) => (bytes.len() as u64, EntryKind::Regular),
        }
    }
}
