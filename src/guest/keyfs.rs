//! The KeyFS guest: the node's own keys as a namespace over IPNS.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::{CoreApi, KeyRecord};
use crate::error::{Error, Kind, Result};
use crate::ipld::{EntryKind, NodeInfo, StreamEntry};

use super::dir::{GuestDir, SnapshotDir};
use super::file::GuestFile;
use super::ipns::IpnsGuest;
use super::{is_root, Expiry, GuestFs, GuestKind};

struct KeySnapshot {
    keys: Vec<KeyRecord>,
    fetched_at: Instant,
}

/// Owner-key guest. Every sub-path proxies to IPNS under the key's identity.
#[derive(Clone)]
pub struct KeyGuest {
    ipns: IpnsGuest,
    client: Arc<dyn CoreApi>,
    /// Name service; its presence enables the key mutations.
    names: Option<Arc<dyn CoreApi>>,
    keys: Arc<Mutex<Option<KeySnapshot>>>,
    expiry: Expiry,
    perm: u32,
    mtime: SystemTime,
}

impl KeyGuest {
    pub fn new(
        ipns: IpnsGuest,
        client: Arc<dyn CoreApi>,
        names: Option<Arc<dyn CoreApi>>,
        expiry: Expiry,
        perm: u32,
    ) -> Self {
        Self {
            ipns,
            client,
            names,
            keys: Arc::new(Mutex::new(None)),
            expiry,
            perm,
            mtime: SystemTime::now(),
        }
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

    /// The current key list, refetched when the snapshot has aged out.
    async fn keys(&self) -> Result<Vec<KeyRecord>> {
        let mut guard = self.keys.lock().await;
        if let Some(snapshot) = guard.as_ref() {
            if self.expiry.fresh(snapshot.fetched_at) {
                return Ok(snapshot.keys.clone());
            }
        }
        let keys = self.client.key_list().await?;
        *guard = Some(KeySnapshot { keys: keys.clone(), fetched_at: Instant::now() });
        Ok(keys)
    }

    async fn drop_keys(&self) {
        *self.keys.lock().await = None;
    }

    async fn key_named(&self, op: &'static str, name: &str) -> Result<KeyRecord> {
        self.keys()
            .await?
            .into_iter()
            .find(|key| key.name == name)
            .ok_or_else(|| Error::new(op, name, Kind::NotExist))
    }

    /// Rewrites `/key/rest` into the IPNS path `/key-id/rest`.
    async fn translate(&self, op: &'static str, path: &str) -> Result<String> {
        let trimmed = path.trim_matches('/');
        let (name, rest) = match trimmed.split_once('/') {
            Some((name, rest)) => (name, rest),
            None => (trimmed, ""),
        };
        let key = self.key_named(op, name).await?;
        Ok(if rest.is_empty() {
            format!("/{}", key.id)
        } else {
            format!("/{}/{}", key.id, rest)
        })
    }

    fn names(&self, op: &'static str, name: &str) -> Result<&Arc<dyn CoreApi>> {
        self.names
            .as_ref()
            .ok_or_else(|| Error::new(op, name, Kind::InvalidOperation))
    }
}

#[async_trait]
impl GuestFs for KeyGuest {
    fn kind(&self) -> GuestKind {
        GuestKind::Keyfs
    }

    async fn stat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        let translated = self.translate("stat", path).await?;
        self.ipns.stat(&translated).await.map_err(|e| e.with_path(path))
    }

    async fn lstat(&self, path: &str) -> Result<NodeInfo> {
        if is_root(path) {
            return Ok(self.root_info());
        }
        let translated = self.translate("stat", path).await?;
        self.ipns.lstat(&translated).await.map_err(|e| e.with_path(path))
    }

    async fn open(&self, path: &str) -> Result<Box<dyn GuestFile>> {
        if is_root(path) {
            return Err(Error::new("open", path, Kind::IsDir));
        }
        let translated = self.translate("open", path).await?;
        self.ipns.open(&translated).await.map_err(|e| e.with_path(path))
    }

    async fn open_dir(&self, path: &str) -> Result<Box<dyn GuestDir>> {
        if is_root(path) {
            let entries = self
                .keys()
                .await?
                .into_iter()
                .map(|key| StreamEntry {
                    name: key.name,
                    cid: None,
                    size: 0,
                    kind: EntryKind::Directory,
                })
                .collect();
            return Ok(Box::new(SnapshotDir::new(entries)));
        }
        let translated = self.translate("opendir", path).await?;
        self.ipns.open_dir(&translated).await.map_err(|e| e.with_path(path))
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        if is_root(path) {
            return Err(Error::new("readlink", path, Kind::InvalidItem));
        }
        let translated = self.translate("readlink", path).await?;
        self.ipns.read_link(&translated).await.map_err(|e| e.with_path(path))
    }

    /// Publishes `target` under the key `name`, generating the key first if
    /// the node does not hold one by that name.
    async fn symlink(&self, target: &str, name: &str) -> Result<()> {
        let names = self.names("symlink", name)?.clone();
        let trimmed = name.trim_matches('/');
        let known = self.keys().await?.into_iter().any(|key| key.name == trimmed);
        if !known {
            names.key_gen(trimmed).await?;
        }
        let path = if target.starts_with('/') {
            target.to_string()
        } else {
            format!("/ipfs/{target}")
        };
        names.name_publish(trimmed, &path).await?;
        self.drop_keys().await;
        Ok(())
    }

    /// Key generation.
    async fn create(&self, name: &str) -> Result<()> {
        let names = self.names("create", name)?.clone();
        names.key_gen(name.trim_matches('/')).await?;
        self.drop_keys().await;
        Ok(())
    }

    /// Key removal.
    async fn unlink(&self, name: &str) -> Result<()> {
        let names = self.names("unlink", name)?.clone();
        names.key_rm(name.trim_matches('/')).await?;
        self.drop_keys().await;
        Ok(())
    }
}
