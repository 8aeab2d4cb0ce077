//! Mount-manager bookkeeping that does not require a kernel mount.

use ipfs_mount::error::Kind;
use ipfs_mount::mount::settings::GuestSettings;
use ipfs_mount::mount::{HostKind, Manager, MountAddress};
use ipfs_mount::GuestKind;

#[tokio::test]
async fn a_fresh_manager_tracks_nothing() {
    let manager = Manager::new();
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn unmounting_unknown_targets_reports_each_as_missing() {
    let manager = Manager::new();
    let targets =
        [MountAddress::parse("/mnt/a").unwrap(), MountAddress::parse("/mnt/b").unwrap()];
    let err = manager.unmount(&targets).await.unwrap_err();
    assert_eq!(err.kind(), Kind::NotExist);
    let text = err.to_string();
    assert!(text.contains("/mnt/a"));
    assert!(text.contains("/mnt/b"));
}

#[tokio::test]
async fn unmount_all_of_nothing_is_fine() {
    let manager = Manager::new();
    manager.unmount_all().await.unwrap();
}

#[tokio::test]
async fn non_fuse_hosts_are_rejected() {
    let manager = Manager::new();
    let target = MountAddress::parse("/mnt/a").unwrap();
    let settings = GuestSettings::default_for(GuestKind::Ipfs);
    let err = manager
        .mount(HostKind::Nfs, &settings, std::slice::from_ref(&target))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidOperation);
}
