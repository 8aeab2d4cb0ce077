//! Mount-pair persistence round-trips.

use std::time::Duration;

use ipfs_mount::guest::Expiry;
use ipfs_mount::mount::settings::{
    GuestSettings, HostSettings, IpfsSettings, IpnsSettings, KeyfsSettings, MountPair,
    ParseField, PinfsSettings,
};
use ipfs_mount::mount::HostKind;

fn ipfs_settings() -> IpfsSettings {
    IpfsSettings {
        api_maddr: Some("/ip4/127.0.0.1/tcp/5001".into()),
        api_timeout: Duration::from_secs(30),
        permissions: 0o644,
        node_cache_count: 128,
        listing_cache_count: 32,
        link_limit: 16,
    }
}

#[test]
fn ipfs_pair_round_trips() {
    let pair = MountPair::new(
        HostKind::Fuse,
        HostSettings { maddr: "/path/mnt/ipfs".into() },
        GuestSettings::Ipfs(ipfs_settings()),
    );
    let json = serde_json::to_string(&pair).unwrap();
    let back: MountPair = serde_json::from_str(&json).unwrap();
    assert_eq!(back, pair);
}

#[test]
fn tag_object_carries_host_and_guest_names() {
    let pair = MountPair::new(
        HostKind::Fuse,
        HostSettings { maddr: "/mnt/pins".into() },
        GuestSettings::Pinfs(PinfsSettings::default()),
    );
    let value: serde_json::Value = serde_json::to_value(&pair).unwrap();
    assert_eq!(value["tag"]["host"], "FUSE");
    assert_eq!(value["tag"]["guest"], "PinFS");
    assert!(value["host"].is_object());
    assert!(value["guest"].is_object());
}

#[test]
fn nested_guests_embed_their_delegates() {
    let pair = MountPair::new(
        HostKind::Fuse,
        HostSettings { maddr: "/mnt/keys".into() },
        GuestSettings::Keyfs(KeyfsSettings {
            cache_expiry: Expiry::Forever,
            permissions: 0o555,
            ipns: IpnsSettings {
                cache_expiry: Expiry::After(Duration::from_secs(90)),
                permissions: 0o444,
                ipfs: ipfs_settings(),
            },
        }),
    );
    let json = serde_json::to_string(&pair).unwrap();
    let back: MountPair = serde_json::from_str(&json).unwrap();
    assert_eq!(back, pair);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["guest"]["cacheExpiry"], "forever");
    assert_eq!(value["guest"]["ipns"]["cacheExpiry"], "1m 30s");
    assert_eq!(value["guest"]["ipns"]["ipfs"]["apiTimeout"], "30s");
}

#[test]
fn nfs_host_pair_preserves_every_field_in_string_form() {
    let mut pair = MountPair::new(
        HostKind::Nfs,
        HostSettings { maddr: String::new() },
        GuestSettings::Ipfs(IpfsSettings::default()),
    );
    pair.parse_field("host.maddr", "/ip4/127.0.0.1/tcp/2049").unwrap();
    pair.parse_field("guest.apiTimeout", "30s").unwrap();
    pair.parse_field("guest.linkLimit", "16").unwrap();

    let json = serde_json::to_string(&pair).unwrap();
    let back: MountPair = serde_json::from_str(&json).unwrap();
    assert_eq!(back, pair);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["tag"]["host"], "NFS");
    assert_eq!(value["host"]["maddr"], "/ip4/127.0.0.1/tcp/2049");
    assert_eq!(value["guest"]["apiTimeout"], "30s");
    assert_eq!(value["guest"]["linkLimit"], 16);
}

#[test]
fn pinfs_without_a_delegate_round_trips() {
    let pair = MountPair::new(
        HostKind::Fuse,
        HostSettings { maddr: "/mnt/pins".into() },
        GuestSettings::Pinfs(PinfsSettings {
            cache_expiry: Expiry::Disabled,
            permissions: 0o444,
            ipfs: None,
        }),
    );
    let json = serde_json::to_string(&pair).unwrap();
    let back: MountPair = serde_json::from_str(&json).unwrap();
    assert_eq!(back, pair);
}

#[test]
fn unknown_field_errors_name_the_attribute_and_the_candidates() {
    let mut pair = MountPair::new(
        HostKind::Fuse,
        HostSettings { maddr: "/mnt".into() },
        GuestSettings::Ipfs(IpfsSettings::default()),
    );
    let err = pair.parse_field("guest.bogus", "1").unwrap_err();
    assert_eq!(err.attribute, "guest.bogus");
    assert!(err.tried.iter().any(|key| key == "guest.linkLimit"));

    let err = pair.parse_field("neither", "1").unwrap_err();
    assert_eq!(err.attribute, "neither");
}
