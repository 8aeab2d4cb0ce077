//! Guest filesystem adapters.
//!
//! A guest implements the hierarchical-filesystem contract on top of the
//! remote node API. The host bridge consumes guests through [`GuestFs`];
//! [`Guest`] is the tagged union the mount manager constructs and hands out.
//!
//! Ownership between guests is one-way: IPNS holds the IPFS guest it
//! delegates to, KeyFS holds IPNS, PinFS optionally holds IPFS. IPFS is the
//! leaf.

pub mod dir;
pub mod file;
mod ipfs;
mod ipns;
mod keyfs;
mod link;
mod pinfs;

#[cfg(test)]
mod tests;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Kind, Result};
use crate::ipld::NodeInfo;

pub use dir::GuestDir;
pub use file::GuestFile;
pub use ipfs::IpfsGuest;
pub use ipns::IpnsGuest;
pub use keyfs::KeyGuest;
pub use link::normalize_link_target;
pub use pinfs::PinGuest;

/// Bound on symlink chain length before resolution reports recursion.
pub const LINK_LIMIT: u32 = 40;

/// Which guest semantics a filesystem instance carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuestKind {
    #[serde(rename = "IPFS")]
    Ipfs,
    #[serde(rename = "IPNS")]
    Ipns,
    #[serde(rename = "PinFS")]
    Pinfs,
    #[serde(rename = "KeyFS")]
    Keyfs,
}

impl GuestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GuestKind::Ipfs => "IPFS",
            GuestKind::Ipns => "IPNS",
            GuestKind::Pinfs => "PinFS",
            GuestKind::Keyfs => "KeyFS",
        }
    }
}

/// Lifetime policy for time-based caches.
///
/// Replaces the zero/positive/negative duration convention of the original
/// configuration surface with explicit variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Never cache; every consumer fetches fresh.
    Disabled,
    /// Cache entries are valid for the given age.
    After(Duration),
    /// Cache entries never expire.
    Forever,
}

impl Expiry {
    /// Whether a record stamped at `at` is still usable.
    pub fn fresh(self, at: Instant) -> bool {
        match self {
            Expiry::Disabled => false,
            Expiry::After(limit) => at.elapsed() < limit,
            Expiry::Forever => true,
        }
    }
}

impl std::fmt::Display for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expiry::Disabled => f.write_str("0s"),
            Expiry::After(limit) => write!(f, "{}", humantime::format_duration(*limit)),
            Expiry::Forever => f.write_str("forever"),
        }
    }
}

impl std::str::FromStr for Expiry {
    type Err = humantime::DurationError;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        if text == "forever" || text == "never" {
            return Ok(Expiry::Forever);
        }
        let limit = humantime::parse_duration(text)?;
        if limit.is_zero() {
            Ok(Expiry::Disabled)
        } else {
            Ok(Expiry::After(limit))
        }
    }
}

impl Serialize for Expiry {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// The filesystem surface the host bridge consumes.
///
/// Reads are universal; the mutating operations default to
/// `InvalidOperation` and are overridden only by guests that support the
/// respective narrow mutation.
#[async_trait]
pub trait GuestFs: Send + Sync {
    fn kind(&self) -> GuestKind;

    /// Metadata for `path`, following symlinks up to the link limit.
    async fn stat(&self, path: &str) -> Result<NodeInfo>;

    /// Metadata for `path` without following a final symlink.
    async fn lstat(&self, path: &str) -> Result<NodeInfo>;

    /// Opens a regular file for reading.
    async fn open(&self, path: &str) -> Result<Box<dyn GuestFile>>;

    /// Opens a directory for streaming or snapshot reads.
    async fn open_dir(&self, path: &str) -> Result<Box<dyn GuestDir>>;

    /// Normalized symlink target of `path`. The root is never a symlink.
    async fn read_link(&self, path: &str) -> Result<String>;

    /// Creates `name` pointing at `target` (pin-add, key publication).
    async fn symlink(&self, _target: &str, name: &str) -> Result<()> {
        Err(Error::new("symlink", name, Kind::InvalidOperation))
    }

    /// Creates an empty entry named `name` (key generation).
    async fn create(&self, name: &str) -> Result<()> {
        Err(Error::new("create", name, Kind::InvalidOperation))
    }

    /// Removes the entry named `name` (pin or key removal).
    async fn unlink(&self, name: &str) -> Result<()> {
        Err(Error::new("unlink", name, Kind::InvalidOperation))
    }
}

/// Tagged union over the guest adapters.
#[derive(Clone)]
pub enum Guest {
    Ipfs(IpfsGuest),
    Ipns(IpnsGuest),
    Pinfs(PinGuest),
    Keyfs(KeyGuest),
}

impl Guest {
    fn as_fs(&self) -> &dyn GuestFs {
        match self {
            Guest::Ipfs(fs) => fs,
            Guest::Ipns(fs) => fs,
            Guest::Pinfs(fs) => fs,
            Guest::Keyfs(fs) => fs,
        }
    }
}

#[async_trait]
impl GuestFs for Guest {
    fn kind(&self) -> GuestKind {
        self.as_fs().kind()
    }

    async fn stat(&self, path: &str) -> Result<NodeInfo> {
        self.as_fs().stat(path).await
    }

    async fn lstat(&self, path: &str) -> Result<NodeInfo> {
        self.as_fs().lstat(path).await
    }

    async fn open(&self, path: &str) -> Result<Box<dyn GuestFile>> {
        self.as_fs().open(path).await
    }

    async fn open_dir(&self, path: &str) -> Result<Box<dyn GuestDir>> {
        self.as_fs().open_dir(path).await
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        self.as_fs().read_link(path).await
    }

    async fn symlink(&self, target: &str, name: &str) -> Result<()> {
        self.as_fs().symlink(target, name).await
    }

    async fn create(&self, name: &str) -> Result<()> {
        self.as_fs().create(name).await
    }

    async fn unlink(&self, name: &str) -> Result<()> {
        self.as_fs().unlink(name).await
    }
}

/// Whether `path` names the guest root.
pub(crate) fn is_root(path: &str) -> bool {
    matches!(path, "" | "/" | ".")
}
