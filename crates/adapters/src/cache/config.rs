use std::path::PathBuf;

/// Cache configuration for embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingCacheConfig {
    /// Enable in-memory cache.
    pub enabled: bool,
    /// Maximum number of entries in memory.
    pub max_entries: usize,
    /// Maximum memory bytes to keep.
    pub max_bytes: u64,
    /// Enable disk cache.
    pub disk_enabled: bool,
    /// Disk cache provider.
    pub disk_provider: DiskCacheProvider,
    /// Optional disk path for the `SQLite` cache.
    pub disk_path: Option<PathBuf>,
    /// Maximum disk cache size in bytes.
    pub disk_max_bytes: Option<u64>,
}

/// Disk cache provider. A per-project tool persists its cache to a local
/// file; there is no shared SQL server to back it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskCacheProvider {
    /// `SQLite` file-backed cache.
    #[default]
    Sqlite,
}
