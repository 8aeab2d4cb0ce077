#![cfg(test)]

use std::time::SystemTime;

use cid::Cid;
use prost::Message;

use super::dagpb::{symlink_block, DataType, PbNode, UnixFsData};
use super::{EntryKind, IpldNode, CODEC_DAG_PB};

// CIDv1, dag-pb codec.
const DIR_CID: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";
// CIDv1, raw codec.
const RAW_CID: &str = "bafkreidgvpkjawlxz6sffxzwgooowe5yt7i6wsyg236mfoks77nywkptdq";

fn unixfs_block(data_type: DataType, filesize: Option<u64>, inline: Option<&[u8]>) -> Vec<u8> {
    let envelope = UnixFsData {
        data_type: data_type as i32,
        data: inline.map(<[u8]>::to_vec),
        filesize,
        blocksizes: Vec::new(),
        hash_type: None,
        fanout: None,
        mode: None,
    };
    PbNode { links: Vec::new(), data: Some(envelope.encode_to_vec()) }.encode_to_vec()
}

#[test]
fn proto_file_derives_regular_with_filesize() {
    let cid: Cid = DIR_CID.parse().unwrap();
    assert_eq!(cid.codec(), CODEC_DAG_PB);

    let node = IpldNode::decode(&cid, unixfs_block(DataType::File, Some(42), None)).unwrap();
    let info = node.info("a.txt", 0o444, SystemTime::UNIX_EPOCH);
    assert_eq!(info.kind, EntryKind::Regular);
    assert_eq!(info.size, 42);
    assert_eq!(info.name, "a.txt");
}

#[test]
fn proto_directory_and_shard_derive_directory() {
    let cid: Cid = DIR_CID.parse().unwrap();
    for data_type in [DataType::Directory, DataType::HamtShard] {
        let node = IpldNode::decode(&cid, unixfs_block(data_type, None, None)).unwrap();
        let info = node.info("d", 0o555, SystemTime::UNIX_EPOCH);
        assert_eq!(info.kind, EntryKind::Directory);
    }
}

#[test]
fn proto_symlink_carries_target() {
    let cid: Cid = DIR_CID.parse().unwrap();
    let node = IpldNode::decode(&cid, symlink_block("/ipfs/QmTarget")).unwrap();
    assert_eq!(node.link_target(), Some("/ipfs/QmTarget".as_bytes()));

    let info = node.info("l", 0o444, SystemTime::UNIX_EPOCH);
    assert_eq!(info.kind, EntryKind::Symlink);
    assert_eq!(info.size, "/ipfs/QmTarget".len() as u64);
}

#[test]
fn proto_metadata_is_irregular() {
    let cid: Cid = DIR_CID.parse().unwrap();
    let node = IpldNode::decode(&cid, unixfs_block(DataType::Metadata, None, None)).unwrap();
    let info = node.info("m", 0o444, SystemTime::UNIX_EPOCH);
    assert_eq!(info.kind, EntryKind::Irregular);
}

#[test]
fn raw_codec_is_opaque_regular_file() {
    let cid: Cid = RAW_CID.parse().unwrap();
    let node = IpldNode::decode(&cid, b"not a protobuf".to_vec()).unwrap();
    let info = node.info("r", 0o444, SystemTime::UNIX_EPOCH);
    assert_eq!(info.kind, EntryKind::Regular);
    assert_eq!(info.size, "not a protobuf".len() as u64);
}

#[test]
fn undecodable_dag_pb_is_an_io_error() {
    let cid: Cid = DIR_CID.parse().unwrap();
    let err = IpldNode::decode(&cid, vec![0xff, 0xff, 0xff, 0xff]).unwrap_err();
    assert_eq!(err.kind(), crate::error::Kind::Io);
}
