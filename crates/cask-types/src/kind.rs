use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Schema tag for a blob payload: a stable identifier plus a version.
///
/// The kind tells a reader how to interpret the payload region of a record.
/// Identifiers are lowercase ASCII with `-` separators (e.g. `"tree-dir"`,
/// `"tree-file"`); the version bumps whenever the payload layout changes.
/// The kind is hashed as part of the record, so blobs of different kinds
/// never collide even with identical payloads.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobKind {
    ident: String,
    version: u32,
}

impl BlobKind {
    /// Create a kind tag, validating the identifier.
    pub fn new(ident: impl Into<String>, version: u32) -> Result<Self, TypeError> {
        let ident = ident.into();
        if ident.is_empty() || ident.len() > 64 {
            return Err(TypeError::InvalidKind(ident));
        }
        if !ident
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(TypeError::InvalidKind(ident));
        }
        Ok(Self { ident, version })
    }

    /// The stable identifier.
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// The schema version.
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Debug for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKind({}@v{})", self.ident, self.version)
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.ident, self.version)
    }
}
