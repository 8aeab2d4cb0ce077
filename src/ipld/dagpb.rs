//! Hand-declared dag-pb and UnixFS protobuf messages.
//!
//! The merkledag protobuf schema is stable and tiny, so the messages are
//! declared inline with `prost` derives instead of generated from `.proto`
//! sources at build time.

use prost::Message;

/// A link from a dag-pb node to another node.
#[derive(Clone, PartialEq, Message)]
pub struct PbLink {
    /// Multihash of the target object.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub hash: Option<Vec<u8>>,
    /// UTF-8 name of the link within its parent.
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    /// Cumulative size of the target object.
    #[prost(uint64, optional, tag = "3")]
    pub tsize: Option<u64>,
}

/// A dag-pb node: opaque data plus named links.
#[derive(Clone, PartialEq, Message)]
pub struct PbNode {
    #[prost(message, repeated, tag = "2")]
    pub links: Vec<PbLink>,
    /// Opaque payload; for UnixFS nodes this is an encoded [`UnixFsData`].
    #[prost(bytes = "vec", optional, tag = "1")]
    pub data: Option<Vec<u8>>,
}

/// UnixFS data types carried in [`UnixFsData::data_type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Raw = 0,
    Directory = 1,
    File = 2,
    Metadata = 3,
    Symlink = 4,
    HamtShard = 5,
}

/// The UnixFS envelope stored in a dag-pb node's data field.
#[derive(Clone, PartialEq, Message)]
pub struct UnixFsData {
    #[prost(enumeration = "DataType", required, tag = "1")]
    pub data_type: i32,
    /// Inline file bytes, or the target path for symlink nodes.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "3")]
    pub filesize: Option<u64>,
    #[prost(uint64, repeated, packed = "false", tag = "4")]
    pub blocksizes: Vec<u64>,
    #[prost(uint64, optional, tag = "5")]
    pub hash_type: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    pub fanout: Option<u64>,
    #[prost(uint32, optional, tag = "7")]
    pub mode: Option<u32>,
}

/// Builds the block bytes of a UnixFS symlink node pointing at `target`.
///
/// The result is a complete dag-pb block, suitable for `block/put` with the
/// dag-pb format.
pub fn symlink_block(target: &str) -> Vec<u8> {
    let envelope = UnixFsData {
        data_type: DataType::Symlink as i32,
        data: Some(target.as_bytes().to_vec()),
        filesize: Some(target.len() as u64),
        blocksizes: Vec::new(),
        hash_type: None,
        fanout: None,
        mode: None,
    };
    let node = PbNode { links: Vec::new(), data: Some(envelope.encode_to_vec()) };
    node.encode_to_vec()
}
