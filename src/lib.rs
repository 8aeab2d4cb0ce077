//! ipfs-mount - content-addressed data as ordinary host filesystems.
//!
//! Guest adapters (IPFS, IPNS, PinFS, KeyFS) implement a hierarchical
//! filesystem over a remote node's API; the FUSE host bridge serves them to
//! the kernel; the mount manager owns clients, guests, and live mounts.

pub mod client;
pub mod error;
pub mod fuse;
pub mod guest;
pub mod ipld;
pub mod mount;
pub mod resolver;

pub use error::{Error, Kind, Result};
pub use guest::{Expiry, Guest, GuestFs, GuestKind};
pub use mount::{
    GuestSettings, HostKind, HostSettings, Manager, MountAddress, MountPair, ParseField,
};
