//! Error-kind to errno collapse.
//!
//! The taxonomy survives intact until this table; nothing below the bridge
//! deals in errnos.

use libc::c_int;

use crate::error::Kind;

pub fn errno(kind: Kind) -> c_int {
    match kind {
        Kind::Other => libc::EIO,
        Kind::InvalidItem => libc::EINVAL,
        Kind::InvalidOperation => libc::ENOSYS,
        Kind::Permission => libc::EACCES,
        Kind::Io => libc::EIO,
        Kind::Exist => libc::EEXIST,
        Kind::NotExist => libc::ENOENT,
        Kind::IsDir => libc::EISDIR,
        Kind::NotDir => libc::ENOTDIR,
        Kind::NotEmpty => libc::ENOTEMPTY,
        Kind::ReadOnly => libc::EROFS,
        Kind::Recursion => libc::ELOOP,
        Kind::Closed => libc::EBADF,
    }
}
