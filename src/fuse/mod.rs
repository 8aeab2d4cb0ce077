//! FUSE host bridge.
//!
//! Translates per-operation FUSE callbacks into guest calls: resolves
//! handles, holds the per-path lock for the duration of each op, drives the
//! guest futures to completion on the shared runtime, and collapses guest
//! errors to errnos at the reply boundary.

pub mod errno;
pub mod handle;
pub mod lock;
pub mod options;

use std::ffi::OsStr;
use std::io::SeekFrom;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fuse_mt::{
    CallbackResult, DirectoryEntry, FileAttr, FileType, FilesystemMT, FuseMT, RequestInfo,
    ResultData, ResultEmpty, ResultEntry, ResultOpen, ResultReaddir, ResultSlice, ResultWrite,
};
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::error::{Error, Kind, Result};
use crate::guest::{Guest, GuestDir, GuestFile, GuestFs};
use crate::ipld::{EntryKind, NodeInfo, StreamEntry};

use errno::errno;
use handle::HandleTable;
use lock::{Mode, PathLocks};

/// Kernel attribute cache lifetime handed back with every entry.
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Threads serving FUSE callbacks concurrently.
const DISPATCH_THREADS: usize = 8;

type FileSlot = Mutex<Box<dyn GuestFile>>;

struct DirState {
    dir: Box<dyn GuestDir>,
    /// Drained listing, kept so kernel readdir offsets address a stable
    /// snapshot across repeated calls on one handle.
    listing: Option<Vec<StreamEntry>>,
}

type DirSlot = Mutex<DirState>;

/// The bridge: one per mounted instance.
pub struct FuseHost {
    guest: Guest,
    rt: Handle,
    files: HandleTable<FileSlot>,
    dirs: HandleTable<DirSlot>,
    locks: PathLocks,
}

impl FuseHost {
    /// Builds a bridge over `guest`, driving its futures on `rt`.
    pub fn new(guest: Guest, rt: Handle) -> Self {
        Self {
            guest,
            rt,
            files: HandleTable::new(),
            dirs: HandleTable::new(),
            locks: PathLocks::new(),
        }
    }

    /// Logs and collapses a guest error at the reply boundary.
    fn reply_errno(&self, op: &'static str, err: Error) -> libc::c_int {
        if err.kind() == Kind::NotExist {
            tracing::debug!(op, error = %err, "op failed");
        } else {
            tracing::warn!(op, error = %err, "op failed");
        }
        errno(err.kind())
    }

    /// Positioned read through a file handle: the seek/read pair runs under
    /// the file's I/O lock. Returns the bytes read; empty past end-of-file.
    pub fn read_at(
        &self,
        path: &Path,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> std::result::Result<Vec<u8>, libc::c_int> {
        let text = path_text(path);
        let Some(slot) = self.files.get(fh) else {
            return Err(libc::EBADF);
        };
        self.rt
            .block_on(async {
                let _guard = self.locks.acquire(&text, Mode::Access).await;
                let mut file = slot.lock().await;
                file.seek(SeekFrom::Start(offset)).await?;
                file.read(size as usize).await
            })
            .map_err(|err| self.reply_errno("read", err))
    }

    fn attr_for(req: &RequestInfo, info: &NodeInfo) -> FileAttr {
        let kind = match info.kind {
            EntryKind::Directory => FileType::Directory,
            EntryKind::Symlink => FileType::Symlink,
            EntryKind::Regular | EntryKind::Irregular => FileType::RegularFile,
        };
        let mut perm = (info.perm & 0o7777) as u16;
        if info.kind == EntryKind::Directory {
            // Directories are searchable wherever they are readable.
            perm |= (perm & 0o444) >> 2;
        }
        FileAttr {
            size: info.size,
            blocks: info.size.div_ceil(512),
            atime: info.mtime,
            mtime: info.mtime,
            ctime: info.mtime,
            crtime: info.mtime,
            kind,
            perm,
            nlink: 1,
            uid: req.uid,
            gid: req.gid,
            rdev: 0,
            flags: 0,
        }
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn join_path(parent: &Path, name: &OsStr) -> String {
    path_text(&parent.join(name))
}

fn entry_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::Symlink => FileType::Symlink,
        EntryKind::Regular | EntryKind::Irregular => FileType::RegularFile,
    }
}

impl FilesystemMT for FuseHost {
    fn destroy(&self) {
        // Close-all: a handle never outlives its filesystem.
        let files = self.files.drain();
        let dirs = self.dirs.drain();
        self.rt.block_on(async {
            for slot in files {
                let mut file = slot.lock().await;
                if let Err(error) = file.close().await {
                    tracing::debug!(%error, "file already closed at teardown");
                }
            }
            for slot in dirs {
                let mut state = slot.lock().await;
                if let Err(error) = state.dir.close().await {
                    tracing::debug!(%error, "directory already closed at teardown");
                }
            }
        });
    }

    fn getattr(&self, req: RequestInfo, path: &Path, fh: Option<u64>) -> ResultEntry {
        let text = path_text(path);
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Access).await;
            if let Some(id) = fh {
                if let Some(slot) = self.files.get(id) {
                    let info = slot.lock().await.info().await;
                    return match info {
                        Ok(info) => Ok((ATTR_TTL, Self::attr_for(&req, &info))),
                        Err(err) => Err(self.reply_errno("getattr", err)),
                    };
                }
            }
            match self.guest.stat(&text).await {
                Ok(info) => Ok((ATTR_TTL, Self::attr_for(&req, &info))),
                Err(err) => Err(self.reply_errno("getattr", err)),
            }
        })
    }

    fn readlink(&self, _req: RequestInfo, path: &Path) -> ResultData {
        let text = path_text(path);
        if text.is_empty() {
            return Err(libc::ENOENT);
        }
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Access).await;
            match self.guest.read_link(&text).await {
                Ok(target) => Ok(target.into_bytes()),
                Err(err) => Err(self.reply_errno("readlink", err)),
            }
        })
    }

    fn open(&self, _req: RequestInfo, path: &Path, _flags: u32) -> ResultOpen {
        let text = path_text(path);
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Access).await;
            let file = match self.guest.open(&text).await {
                Ok(file) => file,
                Err(err) => return Err(self.reply_errno("open", err)),
            };
            match self.files.insert(Mutex::new(file)) {
                Ok(id) => Ok((id, 0)),
                Err(err) => Err(self.reply_errno("open", err)),
            }
        })
    }

    fn read(
        &self,
        _req: RequestInfo,
        path: &Path,
        fh: u64,
        offset: u64,
        size: u32,
        callback: impl FnOnce(ResultSlice<'_>) -> CallbackResult,
    ) -> CallbackResult {
        match self.read_at(path, fh, offset, size) {
            Ok(bytes) => callback(Ok(&bytes)),
            Err(errno) => callback(Err(errno)),
        }
    }

    fn write(
        &self,
        _req: RequestInfo,
        path: &Path,
        fh: u64,
        offset: u64,
        data: Vec<u8>,
        _flags: u32,
    ) -> ResultWrite {
        let text = path_text(path);
        let Some(slot) = self.files.get(fh) else {
            return Err(libc::EBADF);
        };
        let outcome = self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Modify).await;
            let mut file = slot.lock().await;
            file.seek(SeekFrom::Start(offset)).await?;
            file.write(&data).await
        });
        match outcome {
            Ok(written) => Ok(written as u32),
            Err(err) => Err(self.reply_errno("write", err)),
        }
    }

    fn truncate(&self, _req: RequestInfo, path: &Path, fh: Option<u64>, size: u64) -> ResultEmpty {
        let text = path_text(path);
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Modify).await;
            if let Some(slot) = fh.and_then(|id| self.files.get(id)) {
                let mut file = slot.lock().await;
                return file
                    .truncate(size)
                    .await
                    .map_err(|err| self.reply_errno("truncate", err));
            }
            // No usable handle: open, truncate, close.
            let mut file = match self.guest.open(&text).await {
                Ok(file) => file,
                Err(err) => return Err(self.reply_errno("truncate", err)),
            };
            let outcome = file.truncate(size).await;
            let _ = file.close().await;
            outcome.map_err(|err| self.reply_errno("truncate", err))
        })
    }

    fn release(
        &self,
        _req: RequestInfo,
        _path: &Path,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> ResultEmpty {
        let Some(slot) = self.files.remove(fh) else {
            return Err(libc::EBADF);
        };
        self.rt.block_on(async {
            let mut file = slot.lock().await;
            file.close().await.map_err(|err| self.reply_errno("release", err))
        })
    }

    fn opendir(&self, _req: RequestInfo, path: &Path, _flags: u32) -> ResultOpen {
        let text = path_text(path);
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Access).await;
            let dir = match self.guest.open_dir(&text).await {
                Ok(dir) => dir,
                Err(err) => return Err(self.reply_errno("opendir", err)),
            };
            match self.dirs.insert(Mutex::new(DirState { dir, listing: None })) {
                Ok(id) => Ok((id, 0)),
                Err(err) => Err(self.reply_errno("opendir", err)),
            }
        })
    }

    fn readdir(&self, _req: RequestInfo, path: &Path, fh: u64) -> ResultReaddir {
        let text = path_text(path);
        let Some(slot) = self.dirs.get(fh) else {
            return Err(libc::EBADF);
        };
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Access).await;
            let mut state = slot.lock().await;
            if state.listing.is_none() {
                let entries = match state.dir.read_dir(0).await {
                    Ok(entries) => entries,
                    Err(err) => return Err(self.reply_errno("readdir", err)),
                };
                state.listing = Some(entries);
            }
            let listing = state.listing.as_ref().expect("listing was just installed");
            let mut out = Vec::with_capacity(listing.len() + 2);
            out.push(DirectoryEntry { name: ".".into(), kind: FileType::Directory });
            out.push(DirectoryEntry { name: "..".into(), kind: FileType::Directory });
            for entry in listing {
                out.push(DirectoryEntry {
                    name: entry.name.clone().into(),
                    kind: entry_type(entry.kind),
                });
            }
            Ok(out)
        })
    }

    fn releasedir(&self, _req: RequestInfo, _path: &Path, fh: u64, _flags: u32) -> ResultEmpty {
        let Some(slot) = self.dirs.remove(fh) else {
            return Err(libc::EBADF);
        };
        self.rt.block_on(async {
            let mut state = slot.lock().await;
            state.dir.close().await.map_err(|err| self.reply_errno("releasedir", err))
        })
    }

    fn symlink(
        &self,
        req: RequestInfo,
        parent: &Path,
        name: &OsStr,
        target: &Path,
    ) -> ResultEntry {
        let link = join_path(parent, name);
        let target = path_text(target);
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&link, Mode::Modify).await;
            if let Err(err) = self.guest.symlink(&target, &link).await {
                return Err(self.reply_errno("symlink", err));
            }
            let info = NodeInfo {
                name: link.clone(),
                size: target.len() as u64,
                kind: EntryKind::Symlink,
                perm: 0o777,
                mtime: SystemTime::now(),
            };
            Ok((ATTR_TTL, Self::attr_for(&req, &info)))
        })
    }

    fn unlink(&self, _req: RequestInfo, parent: &Path, name: &OsStr) -> ResultEmpty {
        let text = join_path(parent, name);
        if text == "/" || name.is_empty() {
            return Err(libc::EPERM);
        }
        self.rt.block_on(async {
            let _guard = self.locks.acquire(&text, Mode::Modify).await;
            self.guest
                .unlink(&text)
                .await
                .map_err(|err| self.reply_errno("unlink", err))
        })
    }

    fn rmdir(&self, _req: RequestInfo, parent: &Path, name: &OsStr) -> ResultEmpty {
        let text = join_path(parent, name);
        if text == "/" || name.is_empty() {
            return Err(libc::EPERM);
        }
        // No guest removes directories.
        Err(libc::ENOSYS)
    }
}

/// A mounted bridge and the background session serving it.
pub struct FuseSession {
    target: PathBuf,
    session: Option<fuser::BackgroundSession>,
}

impl FuseSession {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Unmounts and joins the session loop. A second close reports `Closed`.
    pub fn close(&mut self) -> Result<()> {
        let session = self
            .session
            .take()
            .ok_or_else(|| Error::new("unmount", path_text(&self.target), Kind::Closed))?;
        session.join();
        Ok(())
    }
}

/// Mounts `host` at `target`, serving callbacks on a background session.
///
/// Panics out of the FUSE binding (a missing FUSE runtime, typically) are
/// caught and surfaced as structured errors; none cross this boundary.
pub fn attach(host: FuseHost, fs_id: &str, target: &Path) -> Result<FuseSession> {
    let args = options::mount_args(fs_id, target);
    let arg_refs: Vec<&OsStr> = args.iter().map(AsRef::as_ref).collect();
    let fs = FuseMT::new(host, DISPATCH_THREADS);
    let text = path_text(target);
    let outcome = catch_unwind(AssertUnwindSafe(|| fuse_mt::spawn_mount(fs, target, &arg_refs)));
    match outcome {
        Ok(Ok(session)) => {
            tracing::debug!(point = %text, "mounted");
            Ok(FuseSession { target: target.to_path_buf(), session: Some(session) })
        }
        Ok(Err(error)) => Err(Error::with_source("mount", text, Kind::Io, error)),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "FUSE backend unavailable".to_string());
            Err(Error::with_source("mount", text, Kind::Other, message))
        }
    }
}
