//! Crate-wide error taxonomy.
//!
//! Every failure inside the guests, the resolver, and the node client is an
//! [`Error`] carrying the operation name, the path it applied to, a [`Kind`],
//! and an optional wrapped cause. Errors cross guest boundaries unchanged;
//! only the FUSE bridge collapses them to errnos.

use std::fmt;

/// Convenient result alias used by all filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a filesystem failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    Other,
    InvalidItem,
    InvalidOperation,
    Permission,
    Io,
    Exist,
    NotExist,
    IsDir,
    NotDir,
    NotEmpty,
    ReadOnly,
    Recursion,
    Closed,
}

impl Kind {
    /// Static name used in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Other => "other",
            Kind::InvalidItem => "invalid item",
            Kind::InvalidOperation => "invalid operation",
            Kind::Permission => "permission",
            Kind::Io => "io",
            Kind::Exist => "exist",
            Kind::NotExist => "not exist",
            Kind::IsDir => "is a directory",
            Kind::NotDir => "not a directory",
            Kind::NotEmpty => "not empty",
            Kind::ReadOnly => "read-only",
            Kind::Recursion => "recursion",
            Kind::Closed => "closed",
        }
    }
}

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// A classified filesystem error.
#[derive(Debug)]
pub struct Error {
    op: &'static str,
    path: String,
    kind: Kind,
    source: Option<Cause>,
}

impl Error {
    pub fn new(op: &'static str, path: impl Into<String>, kind: Kind) -> Self {
        Self { op, path: path.into(), kind, source: None }
    }

    pub fn with_source(
        op: &'static str,
        path: impl Into<String>,
        kind: Kind,
        source: impl Into<Cause>,
    ) -> Self {
        Self { op, path: path.into(), kind, source: Some(source.into()) }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rewrites the operation name, keeping kind, path, and cause.
    ///
    /// Used by delegating guests so the surfaced operation matches the call
    /// the caller actually made.
    pub fn with_op(mut self, op: &'static str) -> Self {
        self.op = op;
        self
    }

    /// Rewrites the path, keeping everything else.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}: {}", self.op, self.path, self.kind.as_str())?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|s| s as &(dyn std::error::Error + 'static))
    }
}

/// Folds a batch of per-target errors into one, keeping every message.
///
/// Used by unmount-all style operations where each target is attempted
/// regardless of earlier failures.
pub fn join(op: &'static str, errors: Vec<Error>) -> Option<Error> {
    let mut iter = errors.into_iter();
    let first = iter.next()?;
    let mut rest = iter.peekable();
    if rest.peek().is_none() {
        return Some(first);
    }
    let mut message = first.to_string();
    for err in rest {
        message.push_str("; ");
        message.push_str(&err.to_string());
    }
    Some(Error::with_source(op, first.path.clone(), first.kind, message))
}
