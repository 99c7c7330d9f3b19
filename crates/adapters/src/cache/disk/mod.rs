use super::config::DiskCacheProvider;
use codesearch_ports::embedding::EmbedOutput;
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

mod sqlite;

pub(super) const SCHEMA_VERSION: i64 = 3;

// Only a local SQLite-backed disk cache is supported: a per-project tool has
// no multi-tenant SQL server to share a cache through, unlike the upstream
// service this adapter descends from.
#[derive(Debug)]
pub(super) struct DiskCache {
    backend: DiskCacheBackend,
}

#[derive(Debug)]
enum DiskCacheBackend {
    Sqlite(sqlite::SqliteCache),
}

impl DiskCache {
    pub(crate) fn new(
        provider: DiskCacheProvider,
        path: Option<PathBuf>,
        max_bytes: Option<u64>,
    ) -> Result<Self> {
        let backend = match provider {
            DiskCacheProvider::Sqlite => {
                let path =
                    path.ok_or_else(|| disk_error("disk path is required for sqlite cache"))?;
                DiskCacheBackend::Sqlite(sqlite::SqliteCache::new(path, max_bytes))
            },
        };

        Ok(Self { backend })
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<EmbedOutput>> {
        match &self.backend {
            DiskCacheBackend::Sqlite(cache) => cache.get(key).await,
        }
    }

    pub(crate) async fn insert(&self, key: &str, value: &EmbedOutput) -> Result<()> {
        match &self.backend {
            DiskCacheBackend::Sqlite(cache) => cache.insert(key, value).await,
        }
    }
}

pub(super) fn now_epoch_ms() -> Result<i64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
        .map_err(|error| disk_error(&format!("disk cache clock error: {error}")))
}

pub(super) fn legacy_suffix(found_version: &str) -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs());
    format!("{found_version}_{stamp}")
}

pub(super) fn disk_error(message: &str) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "cache_disk"),
        message.to_string(),
        ErrorClass::NonRetriable,
    )
}
