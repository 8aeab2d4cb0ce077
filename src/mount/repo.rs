//! Default node API discovery through the IPFS repo directory.

use std::env;
use std::path::PathBuf;

use crate::error::{Error, Kind, Result};

const REPO_ENV: &str = "IPFS_PATH";
const DEFAULT_REPO: &str = "~/.ipfs";
const API_FILE: &str = "api";

/// Expands a leading `~` against the caller's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    let Some(home) = env::var_os("HOME") else {
        return PathBuf::from(path);
    };
    let mut expanded = PathBuf::from(home);
    expanded.push(rest.trim_start_matches('/'));
    expanded
}

/// The repo directory: `$IPFS_PATH`, or the platform default.
pub fn repo_dir() -> PathBuf {
    match env::var(REPO_ENV) {
        Ok(path) if !path.is_empty() => expand_tilde(&path),
        _ => expand_tilde(DEFAULT_REPO),
    }
}

/// Reads the node's API multiaddr from `<repo>/api`.
///
/// The file holds one multiaddr per line; the first is taken.
pub fn default_api_maddr() -> Result<String> {
    let api_file = repo_dir().join(API_FILE);
    let text = std::fs::read_to_string(&api_file).map_err(|e| {
        Error::with_source("mount", api_file.to_string_lossy().into_owned(), Kind::Io, e)
    })?;
    let maddr = text.lines().map(str::trim).find(|line| !line.is_empty());
    match maddr {
        Some(maddr) => Ok(maddr.to_string()),
        None => Err(Error::new(
            "mount",
            api_file.to_string_lossy().into_owned(),
            Kind::InvalidItem,
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Both api-file tests rewrite IPFS_PATH; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn tilde_expands_against_home() {
        let home = env::var("HOME").unwrap_or_default();
        if home.is_empty() {
            return;
        }
        let expanded = expand_tilde("~/.ipfs");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".ipfs"));
    }

    #[test]
    fn absolute_paths_pass_through() {
        assert_eq!(expand_tilde("/var/ipfs"), PathBuf::from("/var/ipfs"));
    }

    #[test]
    fn api_file_supplies_the_default_maddr() {
        let _env = ENV_LOCK.lock().unwrap();
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join(API_FILE), "\n/ip4/127.0.0.1/tcp/5001\n").unwrap();

        env::set_var(REPO_ENV, repo.path());
        let maddr = default_api_maddr();
        env::remove_var(REPO_ENV);

        assert_eq!(maddr.unwrap(), "/ip4/127.0.0.1/tcp/5001");
    }

    #[test]
    fn empty_api_file_is_invalid() {
        let _env = ENV_LOCK.lock().unwrap();
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join(API_FILE), "").unwrap();

        env::set_var(REPO_ENV, repo.path());
        let maddr = default_api_maddr();
        env::remove_var(REPO_ENV);

        assert!(maddr.is_err());
    }
}
