//! Identifier and hash primitives for the domain model.

use md5::{Digest as Md5Digest, Md5};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveError {
    /// A 0-indexed chunk span had `startLine > endLine`.
    SpanStartAfterEnd {
        /// Starting line (0-indexed).
        start_line: u32,
        /// Ending line (0-indexed).
        end_line: u32,
    },
    /// A 1-indexed line span had a non-positive boundary.
    LineSpanNonPositive {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
    /// A 1-indexed line span had `startLine > endLine`.
    LineSpanStartAfterEnd {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpanStartAfterEnd {
                start_line,
                end_line,
            } => write!(
                formatter,
                "span start_line {start_line} is after end_line {end_line}"
            ),
            Self::LineSpanNonPositive {
                start_line,
                end_line,
            } => write!(
                formatter,
                "line span ({start_line}, {end_line}) must be 1-indexed"
            ),
            Self::LineSpanStartAfterEnd {
                start_line,
                end_line,
            } => write!(
                formatter,
                "line span startLine {start_line} is after endLine {end_line}"
            ),
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for codesearch_shared::ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        Self::expected(
            codesearch_shared::ErrorCode::new("domain", "invalid_span"),
            error.to_string(),
        )
    }
}

/// Globally unique chunk identifier, assigned once at creation time.
///
/// Unlike [`CodebaseId`] (derived deterministically from a path) a `ChunkId`
/// carries no semantic meaning: two chunks covering identical content get
/// distinct ids, matching the "UUID" requirement in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(Uuid);

impl ChunkId {
    /// Generate a new random chunk id.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a chunk id from its canonical string form.
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(value)?))
    }

    /// Borrow the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// SHA-256 content hash, hex-encoded. Identical for every chunk of a given
/// file revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(Box<str>);

impl ContentHash {
    /// Hash raw file bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        Self(format!("{digest:x}").into_boxed_str())
    }

    /// Borrow the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Stable identifier for a project root, used to namespace on-disk state
/// (`.codesearch/` contents) so two projects never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodebaseId(Box<str>);

impl CodebaseId {
    /// Derive a stable id from a project root path.
    ///
    /// Normalizes separators before hashing so the same project opened from
    /// different shells (`\` vs `/`) derives the same id.
    #[must_use]
    pub fn derive(root: &Path) -> Self {
        let normalized = root.to_string_lossy().replace('\\', "/");
        let mut hasher = Md5::new();
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();
        Self(format!("{digest:x}").into_boxed_str())
    }

    /// Borrow the id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodebaseId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A validated, non-empty collection name. One collection backs one indexed
/// codebase (named from its [`CodebaseId`] by the caller).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(Box<str>);

impl CollectionName {
    /// Validate and build a collection name.
    pub fn new(name: impl Into<Box<str>>) -> codesearch_shared::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(codesearch_shared::ErrorEnvelope::expected(
                codesearch_shared::ErrorCode::invalid_input(),
                "collection name must be non-empty",
            ));
        }
        Ok(Self(name))
    }

    /// Borrow the collection name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Search-time retrieval mode. Every stored chunk always carries both a dense
/// vector and a late-interaction matrix; this toggles whether a search also
/// runs the full-text/MaxSim fusion pass or returns dense-only results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Dense-only retrieval.
    Dense,
    /// Hybrid dense + full-text + late-interaction rerank retrieval.
    Hybrid,
}

impl IndexMode {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for IndexMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_round_trips_through_display() {
        let id = ChunkId::new_random();
        let Ok(parsed) = ChunkId::parse(&id.to_string()) else {
            unreachable!("display of a valid uuid always reparses");
        };
        assert_eq!(id, parsed);
    }

    #[test]
    fn content_hash_is_stable_for_identical_bytes() {
        let a = ContentHash::of_bytes(b"fn main() {}");
        let b = ContentHash::of_bytes(b"fn main() {}");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_differs_for_different_bytes() {
        let a = ContentHash::of_bytes(b"fn main() {}");
        let b = ContentHash::of_bytes(b"fn other() {}");
        assert_ne!(a, b);
    }

    #[test]
    fn codebase_id_normalizes_separators() {
        let unix = CodebaseId::derive(Path::new("/home/user/project"));
        let windows = CodebaseId::derive(Path::new("\\home\\user\\project"));
        assert_eq!(unix, windows);
    }
}
