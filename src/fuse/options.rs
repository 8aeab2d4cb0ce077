//! Platform formatting of mount targets and option strings.

use std::ffi::OsString;
use std::path::Path;

/// Renders the option arguments for mounting `fs_id` at `target`.
///
/// The returned vector is passed straight to the FUSE binding as
/// `-o`-style arguments.
#[cfg(all(unix, not(target_os = "macos")))]
pub fn mount_args(fs_id: &str, _target: &Path) -> Vec<OsString> {
    let mut options = format!("fsname={fs_id},subtype={fs_id}");
    // Only the superuser may expose the mount to other accounts.
    if unsafe { libc::geteuid() } == 0 {
        options.push_str(",allow_other");
    }
    vec![OsString::from("-o"), OsString::from(options)]
}

#[cfg(target_os = "macos")]
pub fn mount_args(fs_id: &str, _target: &Path) -> Vec<OsString> {
    let mut options = format!("fsname={fs_id},volname={fs_id}");
    if unsafe { libc::geteuid() } == 0 {
        options.push_str(",allow_other");
    }
    vec![OsString::from("-o"), OsString::from(options)]
}

/// Windows hosts get uid/gid deferral plus volume naming; UNC targets move
/// into a volume prefix and leave the mount target empty.
#[cfg(windows)]
pub fn mount_args(fs_id: &str, target: &Path) -> Vec<OsString> {
    let mut args = vec![OsString::from("-o")];
    args.push(OsString::from(format!(
        "uid=-1,gid=-1,FileSystemName={fs_id},volname={fs_id}"
    )));
    let text = target.to_string_lossy();
    if let Some(share) = text.strip_prefix("\\\\") {
        args.push(OsString::from(format!("--VolumePrefix=\\{share}")));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn unix_args_carry_fsname_and_subtype() {
        let args = mount_args("IPFS", Path::new("/mnt/ipfs"));
        assert_eq!(args[0], "-o");
        let rendered = args[1].to_string_lossy();
        assert!(rendered.contains("fsname=IPFS"));
        assert!(rendered.contains("subtype=IPFS"));
    }
}
