//! Mounts one guest filesystem and serves it until interrupted.
//!
//! ```text
//! cargo run --example mount -- --guest pinfs --target /mnt/pins \
//!     --api /ip4/127.0.0.1/tcp/5001
//! ```

use clap::Parser;

use ipfs_mount::mount::settings::{GuestSettings, IpfsSettings};
use ipfs_mount::mount::{Manager, MountAddress};
use ipfs_mount::{GuestKind, HostKind};

#[derive(Parser)]
struct Args {
    /// Guest kind: ipfs, ipns, pinfs, or keyfs.
    #[arg(long, default_value = "ipfs")]
    guest: String,

    /// Host directory to mount onto.
    #[arg(long)]
    target: String,

    /// Node API multiaddr; read from the repo api file when omitted.
    #[arg(long)]
    api: Option<String>,
}

fn guest_kind(name: &str) -> Option<GuestKind> {
    match name {
        "ipfs" => Some(GuestKind::Ipfs),
        "ipns" => Some(GuestKind::Ipns),
        "pinfs" => Some(GuestKind::Pinfs),
        "keyfs" => Some(GuestKind::Keyfs),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let kind = guest_kind(&args.guest).ok_or("unknown guest kind")?;
    let mut settings = GuestSettings::default_for(kind);
    if let Some(api) = args.api.clone() {
        match &mut settings {
            GuestSettings::Ipfs(s) => s.api_maddr = Some(api),
            GuestSettings::Ipns(s) => s.ipfs.api_maddr = Some(api),
            GuestSettings::Pinfs(s) => {
                s.ipfs.get_or_insert_with(IpfsSettings::default).api_maddr = Some(api)
            }
            GuestSettings::Keyfs(s) => s.ipns.ipfs.api_maddr = Some(api),
        }
    }
    let target = MountAddress::parse(&args.target)?;

    let manager = Manager::new();
    manager.mount(HostKind::Fuse, &settings, std::slice::from_ref(&target)).await?;
    tracing::info!(point = %target, guest = %args.guest, "mounted; ctrl-c to detach");

    tokio::signal::ctrl_c().await?;
    manager.unmount(std::slice::from_ref(&target)).await?;
    Ok(())
}
