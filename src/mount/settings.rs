//! Mount-pair persistence and field-wise updates.
//!
//! A mount request serializes as a tagged pair of host and guest objects:
//!
//! ```json
//! { "tag":   { "host": "FUSE", "guest": "IPFS" },
//!   "host":  { "maddr": "/path/mnt/ipfs" },
//!   "guest": { "apiMaddr": "/ip4/127.0.0.1/tcp/5001", ... } }
//! ```
//!
//! Nested guests embed their inner guest's object. Individual attributes are
//! updatable by dotted name through [`ParseField`].

use std::fmt;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::client::API_TIMEOUT;
use crate::guest::{Expiry, GuestKind, LINK_LIMIT};
use crate::resolver::{LISTING_CACHE_COUNT, NODE_CACHE_COUNT};

use super::HostKind;

/// Default permission bits applied to guest entries.
pub const DEFAULT_PERMISSIONS: u32 = 0o444;

/// Default freshness window for name, pin, and key caches.
pub const DEFAULT_CACHE_EXPIRY: Expiry = Expiry::After(Duration::from_secs(30));

mod duration_text {
    use super::*;

    pub fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}

/// Attribute update failure: the name that was asked for and the keys that
/// were actually tried at that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub attribute: String,
    pub tried: Vec<String>,
}

impl FieldError {
    fn unknown(attribute: &str, tried: &[&str]) -> Self {
        Self {
            attribute: attribute.to_string(),
            tried: tried.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn bad_value(attribute: &str) -> Self {
        Self { attribute: attribute.to_string(), tried: vec![attribute.to_string()] }
    }

    fn prefixed(mut self, prefix: &str) -> Self {
        self.attribute = format!("{prefix}.{}", self.attribute);
        self.tried = self.tried.into_iter().map(|key| format!("{prefix}.{key}")).collect();
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown attribute {:?} (tried {:?})", self.attribute, self.tried)
    }
}

impl std::error::Error for FieldError {}

/// Updates one attribute of a settings object from its string form.
pub trait ParseField {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError>;
}

fn parse_permissions(attribute: &str, value: &str) -> Result<u32, FieldError> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    u32::from_str_radix(digits, 8).map_err(|_| FieldError::bad_value(attribute))
}

/// Host-side half of a mount pair: where on the host the guest lands (a
/// path for FUSE hosts, a network multiaddr for NFS hosts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSettings {
    pub maddr: String,
}

impl ParseField for HostSettings {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        match attribute {
            "maddr" => {
                self.maddr = value.to_string();
                Ok(())
            }
            _ => Err(FieldError::unknown(attribute, &["maddr"])),
        }
    }
}

/// IPFS guest configuration; also the delegate config embedded by the
/// other guests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpfsSettings {
    /// Node API address; absent means discover through the repo api file.
    pub api_maddr: Option<String>,
    #[serde(with = "duration_text")]
    pub api_timeout: Duration,
    pub permissions: u32,
    pub node_cache_count: u64,
    pub listing_cache_count: u64,
    pub link_limit: u32,
}

impl Default for IpfsSettings {
    fn default() -> Self {
        Self {
            api_maddr: None,
            api_timeout: API_TIMEOUT,
            permissions: DEFAULT_PERMISSIONS,
            node_cache_count: NODE_CACHE_COUNT,
            listing_cache_count: LISTING_CACHE_COUNT,
            link_limit: LINK_LIMIT,
        }
    }
}

impl ParseField for IpfsSettings {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        const KEYS: &[&str] = &[
            "apiMaddr",
            "apiTimeout",
            "permissions",
            "nodeCacheCount",
            "listingCacheCount",
            "linkLimit",
        ];
        match attribute {
            "apiMaddr" => {
                self.api_maddr = Some(value.to_string());
                Ok(())
            }
            "apiTimeout" => {
                self.api_timeout = humantime::parse_duration(value)
                    .map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            "permissions" => {
                self.permissions = parse_permissions(attribute, value)?;
                Ok(())
            }
            "nodeCacheCount" => {
                self.node_cache_count =
                    value.parse().map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            "listingCacheCount" => {
                self.listing_cache_count =
                    value.parse().map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            "linkLimit" => {
                self.link_limit = value.parse().map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            _ => Err(FieldError::unknown(attribute, KEYS)),
        }
    }
}

/// IPNS guest configuration, embedding its IPFS delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpnsSettings {
    pub cache_expiry: Expiry,
    pub permissions: u32,
    pub ipfs: IpfsSettings,
}

impl Default for IpnsSettings {
    fn default() -> Self {
        Self {
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            permissions: DEFAULT_PERMISSIONS,
            ipfs: IpfsSettings::default(),
        }
    }
}

impl ParseField for IpnsSettings {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        const KEYS: &[&str] = &["cacheExpiry", "permissions", "ipfs.*"];
        if let Some(rest) = attribute.strip_prefix("ipfs.") {
            return self.ipfs.parse_field(rest, value).map_err(|e| e.prefixed("ipfs"));
        }
        match attribute {
            "cacheExpiry" => {
                self.cache_expiry =
                    value.parse().map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            "permissions" => {
                self.permissions = parse_permissions(attribute, value)?;
                Ok(())
            }
            _ => Err(FieldError::unknown(attribute, KEYS)),
        }
    }
}

/// PinFS guest configuration; the IPFS delegate is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinfsSettings {
    pub cache_expiry: Expiry,
    pub permissions: u32,
    pub ipfs: Option<IpfsSettings>,
}

impl Default for PinfsSettings {
    fn default() -> Self {
        Self {
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            permissions: DEFAULT_PERMISSIONS,
            ipfs: Some(IpfsSettings::default()),
        }
    }
}

impl ParseField for PinfsSettings {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        const KEYS: &[&str] = &["cacheExpiry", "permissions", "ipfs.*"];
        if let Some(rest) = attribute.strip_prefix("ipfs.") {
            return self
                .ipfs
                .get_or_insert_with(IpfsSettings::default)
                .parse_field(rest, value)
                .map_err(|e| e.prefixed("ipfs"));
        }
        match attribute {
            "cacheExpiry" => {
                self.cache_expiry =
                    value.parse().map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            "permissions" => {
                self.permissions = parse_permissions(attribute, value)?;
                Ok(())
            }
            _ => Err(FieldError::unknown(attribute, KEYS)),
        }
    }
}

/// KeyFS guest configuration, embedding its IPNS delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyfsSettings {
    pub cache_expiry: Expiry,
    pub permissions: u32,
    pub ipns: IpnsSettings,
}

impl Default for KeyfsSettings {
    fn default() -> Self {
        Self {
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            permissions: DEFAULT_PERMISSIONS,
            ipns: IpnsSettings::default(),
        }
    }
}

impl ParseField for KeyfsSettings {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        const KEYS: &[&str] = &["cacheExpiry", "permissions", "ipns.*"];
        if let Some(rest) = attribute.strip_prefix("ipns.") {
            return self.ipns.parse_field(rest, value).map_err(|e| e.prefixed("ipns"));
        }
        match attribute {
            "cacheExpiry" => {
                self.cache_expiry =
                    value.parse().map_err(|_| FieldError::bad_value(attribute))?;
                Ok(())
            }
            "permissions" => {
                self.permissions = parse_permissions(attribute, value)?;
                Ok(())
            }
            _ => Err(FieldError::unknown(attribute, KEYS)),
        }
    }
}

/// Guest-side half of a mount pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestSettings {
    Ipfs(IpfsSettings),
    Ipns(IpnsSettings),
    Pinfs(PinfsSettings),
    Keyfs(KeyfsSettings),
}

impl GuestSettings {
    pub fn kind(&self) -> GuestKind {
        match self {
            GuestSettings::Ipfs(_) => GuestKind::Ipfs,
            GuestSettings::Ipns(_) => GuestKind::Ipns,
            GuestSettings::Pinfs(_) => GuestKind::Pinfs,
            GuestSettings::Keyfs(_) => GuestKind::Keyfs,
        }
    }

    /// Defaults for a guest kind.
    pub fn default_for(kind: GuestKind) -> Self {
        match kind {
            GuestKind::Ipfs => GuestSettings::Ipfs(IpfsSettings::default()),
            GuestKind::Ipns => GuestSettings::Ipns(IpnsSettings::default()),
            GuestKind::Pinfs => GuestSettings::Pinfs(PinfsSettings::default()),
            GuestKind::Keyfs => GuestSettings::Keyfs(KeyfsSettings::default()),
        }
    }

    /// The configured node API address, wherever it is nested.
    pub fn api_maddr(&self) -> Option<&str> {
        match self {
            GuestSettings::Ipfs(s) => s.api_maddr.as_deref(),
            GuestSettings::Ipns(s) => s.ipfs.api_maddr.as_deref(),
            GuestSettings::Pinfs(s) => s.ipfs.as_ref().and_then(|i| i.api_maddr.as_deref()),
            GuestSettings::Keyfs(s) => s.ipns.ipfs.api_maddr.as_deref(),
        }
    }

    /// The API timeout that applies to the backing client.
    pub fn api_timeout(&self) -> Duration {
        match self {
            GuestSettings::Ipfs(s) => s.api_timeout,
            GuestSettings::Ipns(s) => s.ipfs.api_timeout,
            GuestSettings::Pinfs(s) => {
                s.ipfs.as_ref().map_or(API_TIMEOUT, |i| i.api_timeout)
            }
            GuestSettings::Keyfs(s) => s.ipns.ipfs.api_timeout,
        }
    }
}

impl ParseField for GuestSettings {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        match self {
            GuestSettings::Ipfs(s) => s.parse_field(attribute, value),
            GuestSettings::Ipns(s) => s.parse_field(attribute, value),
            GuestSettings::Pinfs(s) => s.parse_field(attribute, value),
            GuestSettings::Keyfs(s) => s.parse_field(attribute, value),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PairTag {
    host: HostKind,
    guest: GuestKind,
}

#[derive(Serialize, Deserialize)]
struct RawPair {
    tag: PairTag,
    host: serde_json::Value,
    guest: serde_json::Value,
}

/// A complete, persistable mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPair {
    pub host_kind: HostKind,
    pub host: HostSettings,
    pub guest: GuestSettings,
}

impl MountPair {
    pub fn new(host_kind: HostKind, host: HostSettings, guest: GuestSettings) -> Self {
        Self { host_kind, host, guest }
    }
}

impl ParseField for MountPair {
    fn parse_field(&mut self, attribute: &str, value: &str) -> Result<(), FieldError> {
        if let Some(rest) = attribute.strip_prefix("host.") {
            return self.host.parse_field(rest, value).map_err(|e| e.prefixed("host"));
        }
        if let Some(rest) = attribute.strip_prefix("guest.") {
            return self.guest.parse_field(rest, value).map_err(|e| e.prefixed("guest"));
        }
        Err(FieldError::unknown(attribute, &["host.*", "guest.*"]))
    }
}

impl Serialize for MountPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;
        let guest = match &self.guest {
            GuestSettings::Ipfs(s) => serde_json::to_value(s),
            GuestSettings::Ipns(s) => serde_json::to_value(s),
            GuestSettings::Pinfs(s) => serde_json::to_value(s),
            GuestSettings::Keyfs(s) => serde_json::to_value(s),
        }
        .map_err(S::Error::custom)?;
        let raw = RawPair {
            tag: PairTag { host: self.host_kind, guest: self.guest.kind() },
            host: serde_json::to_value(&self.host).map_err(S::Error::custom)?,
            guest,
        };
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MountPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPair::deserialize(deserializer)?;
        let host = serde_json::from_value(raw.host).map_err(D::Error::custom)?;
        let guest = match raw.tag.guest {
            GuestKind::Ipfs => {
                GuestSettings::Ipfs(serde_json::from_value(raw.guest).map_err(D::Error::custom)?)
            }
            GuestKind::Ipns => {
                GuestSettings::Ipns(serde_json::from_value(raw.guest).map_err(D::Error::custom)?)
            }
            GuestKind::Pinfs => GuestSettings::Pinfs(
                serde_json::from_value(raw.guest).map_err(D::Error::custom)?,
            ),
            GuestKind::Keyfs => GuestSettings::Keyfs(
                serde_json::from_value(raw.guest).map_err(D::Error::custom)?,
            ),
        };
        Ok(MountPair { host_kind: raw.tag.host, host, guest })
    }
}
