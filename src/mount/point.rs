//! Mount target addresses.
//!
//! Targets arrive either as plain host paths or as the textual `/path/...`
//! component form used by the persistence layer. Windows drive letters keep
//! their `C:` shape through both forms.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Kind, Result};

/// An opaque mount target on the host system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountAddress {
    target: String,
}

impl MountAddress {
    /// Parses a mount target from either form.
    pub fn parse(text: &str) -> Result<Self> {
        let target = text.strip_prefix("/path/").unwrap_or(text);
        if target.is_empty() {
            return Err(Error::new("mount", text, Kind::InvalidItem));
        }
        Ok(Self { target: target.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.target
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.target)
    }

    /// The textual `/path/...` component form.
    pub fn to_component(&self) -> String {
        format!("/path/{}", self.target)
    }
}

impl fmt::Display for MountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.target)
    }
}
