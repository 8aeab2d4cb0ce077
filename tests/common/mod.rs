//! In-memory stand-in for the remote node API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use cid::multihash::Multihash;
use cid::Cid;
use tokio::sync::mpsc;

use ipfs_mount::client::{CoreApi, EntryStream, KeyRecord};
use ipfs_mount::error::{Error, Kind, Result};
use ipfs_mount::ipld::{EntryKind, StreamEntry, CODEC_DAG_PB};

const SHA2_256: u64 = 0x12;

/// Encodes a UnixFS node block of the given type.
pub fn unixfs_block(data_type: ipfs_mount::ipld::dagpb::DataType, filesize: u64) -> Vec<u8> {
    use ipfs_mount::ipld::dagpb::{PbNode, UnixFsData};
    use prost::Message;

    let envelope = UnixFsData {
        data_type: data_type as i32,
        data: None,
        filesize: Some(filesize),
        blocksizes: Vec::new(),
        hash_type: None,
        fanout: None,
        mode: None,
    };
    PbNode { links: Vec::new(), data: Some(envelope.encode_to_vec()) }.encode_to_vec()
}

/// Deterministic CID for test content; the digest is fabricated, not
/// computed, which none of the code under test verifies.
pub fn fake_cid(codec: u64, seed: u8) -> Cid {
    let digest = [seed; 32];
    let hash = Multihash::wrap(SHA2_256, &digest).expect("digest fits a multihash");
    Cid::new_v1(codec, hash)
}

#[derive(Default)]
pub struct FakeNode {
    /// Raw blocks by CID.
    pub blocks: Mutex<HashMap<Cid, Vec<u8>>>,
    /// UnixFS file bytes by `/ipfs/<cid>` path, served through `cat`.
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    /// Directory listings by CID, served through `ls`.
    pub listings: Mutex<HashMap<Cid, Vec<StreamEntry>>>,
    /// Recursive pinset.
    pub pins: Mutex<Vec<Cid>>,
    /// Owner keys.
    pub keys: Mutex<Vec<KeyRecord>>,
    /// IPNS name -> `/ipfs/...` path.
    pub names: Mutex<HashMap<String, String>>,
    /// Multi-component path -> resolved `/ipfs/<cid>` path.
    pub resolutions: Mutex<HashMap<String, String>>,
    pub pin_ls_calls: AtomicUsize,
    next_seed: AtomicU8,
}

impl FakeNode {
    pub fn new() -> Self {
        Self { next_seed: AtomicU8::new(0x80), ..Self::default() }
    }

    /// Registers a UnixFS file: its node block plus its readable bytes.
    pub fn add_file(&self, cid: Cid, block: Vec<u8>, content: &[u8]) {
        self.blocks.lock().unwrap().insert(cid, block);
        self.files.lock().unwrap().insert(format!("/ipfs/{cid}"), content.to_vec());
    }

    pub fn add_block(&self, cid: Cid, block: Vec<u8>) {
        self.blocks.lock().unwrap().insert(cid, block);
    }

    pub fn add_listing(&self, cid: Cid, entries: Vec<StreamEntry>) {
        self.listings.lock().unwrap().insert(cid, entries);
    }

    pub fn publish(&self, name: &str, cid: &Cid) {
        self.names.lock().unwrap().insert(name.to_string(), format!("/ipfs/{cid}"));
    }

    fn stream(entries: Vec<Result<StreamEntry>>) -> EntryStream {
        let (send, recv) = mpsc::channel(entries.len().max(1));
        for entry in entries {
            send.try_send(entry).expect("stream channel sized to fit");
        }
        recv
    }
}

#[async_trait]
impl CoreApi for FakeNode {
    async fn resolve_path(&self, path: &str) -> Result<String> {
        self.resolutions
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::new("resolve", path, Kind::NotExist))
    }

    async fn block_get(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.blocks
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .ok_or_else(|| Error::new("getnode", cid.to_string(), Kind::NotExist))
    }

    async fn cat(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        let content = files
            .get(path)
            .ok_or_else(|| Error::new("read", path, Kind::NotExist))?;
        let start = (offset as usize).min(content.len());
        let end = match length {
            Some(length) => start.saturating_add(length as usize).min(content.len()),
            None => content.len(),
        };
        Ok(content[start..end].to_vec())
    }

    async fn ls(&self, cid: &Cid) -> Result<EntryStream> {
        let listings = self.listings.lock().unwrap();
        let entries = listings
            .get(cid)
            .ok_or_else(|| Error::new("readdir", cid.to_string(), Kind::NotExist))?;
        Ok(Self::stream(entries.iter().cloned().map(Ok).collect()))
    }

    async fn pin_ls(&self) -> Result<EntryStream> {
        self.pin_ls_calls.fetch_add(1, Ordering::SeqCst);
        let pins = self.pins.lock().unwrap();
        let entries = pins
            .iter()
            .map(|cid| {
                Ok(StreamEntry {
                    name: cid.to_string(),
                    cid: Some(*cid),
                    size: 0,
                    kind: EntryKind::Directory,
                })
            })
            .collect();
        Ok(Self::stream(entries))
    }

    async fn pin_add(&self, cid: &Cid) -> Result<()> {
        let mut pins = self.pins.lock().unwrap();
        if !pins.contains(cid) {
            pins.push(*cid);
        }
        Ok(())
    }

    async fn pin_rm(&self, cid: &Cid) -> Result<()> {
        let mut pins = self.pins.lock().unwrap();
        let before = pins.len();
        pins.retain(|pinned| pinned != cid);
        if pins.len() == before {
            return Err(Error::new("unlink", cid.to_string(), Kind::NotExist));
        }
        Ok(())
    }

    async fn block_put(&self, block: Vec<u8>) -> Result<Cid> {
        let seed = self.next_seed.fetch_add(1, Ordering::SeqCst);
        let cid = fake_cid(CODEC_DAG_PB, seed);
        self.blocks.lock().unwrap().insert(cid, block);
        Ok(cid)
    }

    async fn key_list(&self) -> Result<Vec<KeyRecord>> {
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn key_gen(&self, name: &str) -> Result<KeyRecord> {
        let seed = self.next_seed.fetch_add(1, Ordering::SeqCst);
        let record = KeyRecord {
            name: name.to_string(),
            id: format!("k51key{seed:02x}"),
        };
        self.keys.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn key_rm(&self, name: &str) -> Result<()> {
        let mut keys = self.keys.lock().unwrap();
        let before = keys.len();
        keys.retain(|key| key.name != name);
        if keys.len() == before {
            return Err(Error::new("unlink", name, Kind::NotExist));
        }
        Ok(())
    }

    async fn name_resolve(&self, name: &str) -> Result<String> {
        self.names
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new("resolve", name, Kind::NotExist))
    }

    async fn name_publish(&self, key: &str, path: &str) -> Result<()> {
        self.names.lock().unwrap().insert(key.to_string(), path.to_string());
        Ok(())
    }
}
