//! # codesearch-domain
//!
//! Domain entities, primitives, and value objects for the per-project
//! semantic code search engine.
//!
//! This crate contains the core domain model with no infrastructure
//! dependencies:
//!
//! - **Primitives** — `ChunkId`, `ContentHash`, `CodebaseId`.
//! - **Spans** — `ChunkSpan` (0-indexed), `LineSpan` (1-indexed), `Language`.
//! - **Chunk** — the atomic indexed unit and its supporting enums.
//! - **Search** — `SearchQuery`, `SearchResult`, `SearchOptions`, RRF fusion key.
//! - **State** — per-file sync state machine, indexing status, progress events.
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// Re-export shared types for convenience
pub use codesearch_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod chunk;
pub mod primitives;
pub mod search;
pub mod spans;
pub mod states;

pub use chunk::{
    ANCHOR_CHUNK_INDEX, Chunk, ChunkRole, ChunkType, ChunkValidationError, FileSkeleton,
    MAX_CHUNK_CHARS, QuantizedColbert, all_share_hash, exactly_one_anchor,
};
pub use primitives::{
    ChunkId, CodebaseId, CollectionName, ContentHash, IndexMode, PrimitiveError,
};
pub use search::{
    RRF_K, SearchOptions, SearchQuery, SearchResult, SearchResultKey, compare_search_results,
    maxsim_score, reciprocal_rank_fusion,
};
pub use spans::{ChunkSpan, Language, LineSpan};
pub use states::{FileSyncState, IndexStatus, IndexingState, ProgressEvent};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_crate_compiles() {
        let version = domain_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn domain_depends_on_shared() {
        let shared_version = shared_crate_version();
        assert!(!shared_version.is_empty());
    }
}
