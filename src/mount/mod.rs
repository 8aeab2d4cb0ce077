//! Mount manager: owns clients, guests, and live mounts.
//!
//! One client exists per node API address; one guest exists per
//! `(guest kind, address)` bind key; one bridge instance exists per mounted
//! target. Multi-target mounts are atomic for tracking: either every target
//! is registered or none is, with partial successes unwound inline.

pub mod point;
pub mod repo;
pub mod settings;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::client::{CoreApi, IpfsClient};
use crate::error::{self, Error, Kind, Result};
use crate::fuse::{attach, FuseHost, FuseSession};
use crate::guest::{Guest, GuestKind, IpfsGuest, IpnsGuest, KeyGuest, PinGuest};
use crate::resolver::{Resolver, RESOLVE_TIMEOUT};

pub use point::MountAddress;
pub use settings::{
    FieldError, GuestSettings, HostSettings, IpfsSettings, IpnsSettings, KeyfsSettings,
    MountPair, ParseField, PinfsSettings,
};

/// Host-bridge kinds a mount pair can name. Only FUSE mounts are served
/// here; the NFS form exists for the persistence surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostKind {
    #[serde(rename = "FUSE")]
    Fuse,
    #[serde(rename = "NFS")]
    Nfs,
}

/// Identity of one guest instance: its kind plus the node address backing
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindKey {
    pub guest: GuestKind,
    pub identifier: String,
}

struct MountInstance {
    #[allow(dead_code)]
    key: BindKey,
    session: FuseSession,
}

/// Lifecycle owner for every live mount.
pub struct Manager {
    rt: Handle,
    clients: Mutex<HashMap<String, Arc<IpfsClient>>>,
    guests: Mutex<HashMap<BindKey, Guest>>,
    mounts: Mutex<HashMap<String, MountInstance>>,
}

impl Manager {
    /// Builds a manager on the current runtime.
    pub fn new() -> Self {
        Self {
            rt: Handle::current(),
            clients: Mutex::new(HashMap::new()),
            guests: Mutex::new(HashMap::new()),
            mounts: Mutex::new(HashMap::new()),
        }
    }

    /// Mounts one guest at every target, all-or-nothing for tracking.
    pub async fn mount(
        &self,
        host: HostKind,
        guest_settings: &GuestSettings,
        targets: &[MountAddress],
    ) -> Result<()> {
        if host != HostKind::Fuse {
            return Err(Error::new("mount", "", Kind::InvalidOperation));
        }
        let address = match guest_settings.api_maddr() {
            Some(address) => address.to_string(),
            None => repo::default_api_maddr()?,
        };
        let client = self.client_for(&address, guest_settings.api_timeout()).await?;
        let key = BindKey { guest: guest_settings.kind(), identifier: address };
        let guest = self.guest_for(&key, client, guest_settings).await?;

        {
            let mounts = self.mounts.lock().await;
            for target in targets {
                if mounts.contains_key(target.as_str()) {
                    return Err(Error::new("mount", target.as_str(), Kind::Exist));
                }
            }
        }

        let mut attached: Vec<(String, FuseSession)> = Vec::with_capacity(targets.len());
        for target in targets {
            let bridge = FuseHost::new(guest.clone(), self.rt.clone());
            match attach(bridge, key.guest.as_str(), target.as_path()) {
                Ok(session) => attached.push((target.as_str().to_string(), session)),
                Err(err) => {
                    // Unwind this call's successes before reporting.
                    for (text, mut session) in attached {
                        if let Err(error) = session.close() {
                            tracing::warn!(point = %text, %error, "cleanup unmount failed");
                        }
                    }
                    return Err(err);
                }
            }
        }

        let mut mounts = self.mounts.lock().await;
        for (text, session) in attached {
            mounts.insert(text, MountInstance { key: key.clone(), session });
        }
        Ok(())
    }

    /// Unmounts the given targets, attempting every one regardless of
    /// earlier failures. Targets leave the tracking map whether or not the
    /// detach succeeded; a stuck detach is the operator's to force.
    pub async fn unmount(&self, targets: &[MountAddress]) -> Result<()> {
        let mut mounts = self.mounts.lock().await;
        let mut errors = Vec::new();
        for target in targets {
            match mounts.remove(target.as_str()) {
                Some(mut instance) => {
                    if let Err(err) = instance.session.close() {
                        errors.push(err);
                    }
                }
                None => errors.push(Error::new("unmount", target.as_str(), Kind::NotExist)),
            }
        }
        match error::join("unmount", errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Unmounts everything currently tracked.
    pub async fn unmount_all(&self) -> Result<()> {
        let mut mounts = self.mounts.lock().await;
        let mut errors = Vec::new();
        for (_, mut instance) in mounts.drain() {
            if let Err(err) = instance.session.close() {
                errors.push(err);
            }
        }
        match error::join("unmount", errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The set of live mount addresses; order is not meaningful.
    pub async fn list(&self) -> Vec<MountAddress> {
        let mounts = self.mounts.lock().await;
        mounts
            .keys()
            .filter_map(|text| MountAddress::parse(text).ok())
            .collect()
    }

    async fn client_for(&self, address: &str, timeout: Duration) -> Result<Arc<IpfsClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }
        let client = Arc::new(IpfsClient::new(address, timeout)?);
        clients.insert(address.to_string(), client.clone());
        Ok(client)
    }

    async fn guest_for(
        &self,
        key: &BindKey,
        client: Arc<IpfsClient>,
        guest_settings: &GuestSettings,
    ) -> Result<Guest> {
        let mut guests = self.guests.lock().await;
        if let Some(guest) = guests.get(key) {
            return Ok(guest.clone());
        }
        let guest = build_guest(client, guest_settings);
        guests.insert(key.clone(), guest.clone());
        Ok(guest)
    }
}

fn core(client: &Arc<IpfsClient>) -> Arc<dyn CoreApi> {
    client.clone()
}

fn build_ipfs(client: &Arc<IpfsClient>, settings: &IpfsSettings) -> IpfsGuest {
    let resolver = Resolver::new(
        core(client),
        settings.node_cache_count,
        settings.listing_cache_count,
        RESOLVE_TIMEOUT,
    );
    IpfsGuest::new(Arc::new(resolver), settings.permissions, settings.link_limit)
}

fn build_ipns(client: &Arc<IpfsClient>, settings: &IpnsSettings) -> IpnsGuest {
    let ipfs = build_ipfs(client, &settings.ipfs);
    IpnsGuest::new(ipfs, core(client), settings.cache_expiry, settings.permissions)
}

fn build_guest(client: Arc<IpfsClient>, guest_settings: &GuestSettings) -> Guest {
    match guest_settings {
        GuestSettings::Ipfs(s) => Guest::Ipfs(build_ipfs(&client, s)),
        GuestSettings::Ipns(s) => Guest::Ipns(build_ipns(&client, s)),
        GuestSettings::Pinfs(s) => {
            let ipfs = s.ipfs.as_ref().map(|inner| build_ipfs(&client, inner));
            Guest::Pinfs(PinGuest::new(
                core(&client),
                ipfs,
                Some(core(&client)),
                s.cache_expiry,
                s.permissions,
            ))
        }
        GuestSettings::Keyfs(s) => {
            let ipns = build_ipns(&client, &s.ipns);
            Guest::Keyfs(KeyGuest::new(
                ipns,
                core(&client),
                Some(core(&client)),
                s.cache_expiry,
                s.permissions,
            ))
        }
    }
}
