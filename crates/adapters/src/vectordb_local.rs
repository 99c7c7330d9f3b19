//! Local vector store adapter backed by an in-process HNSW index with a
//! JSON snapshot on disk (SPEC_FULL §4.6). One collection per indexed
//! codebase; rows are full [`Chunk`]s so the searcher's MaxSim rerank stage
//! can read the colbert matrix back without a second round trip.

use codesearch_config::SnapshotStorageMode;
use codesearch_domain::Chunk;
use codesearch_ports::{
    CollectionName, FtsSearchRequest, FtsSearchResult, VectorDbPort, VectorDbProviderId,
    VectorDbProviderInfo, VectorDocument, VectorDocumentForInsert, VectorSearchRequest,
    VectorSearchResult,
};
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use codesearch_vector::{HnswParams, VectorIndex, VectorRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

const LOCAL_SNAPSHOT_VERSION: u32 = 1;
const LOCAL_SNAPSHOT_DIR: &str = "vector";
const LOCAL_COLLECTIONS_DIR: &str = "collections";

/// Local vector DB backed by an HNSW index.
pub struct LocalVectorDb {
    provider: VectorDbProviderInfo,
    codebase_root: PathBuf,
    storage_mode: SnapshotStorageMode,
    collections: Arc<RwLock<HashMap<CollectionName, LocalCollection>>>,
}

impl LocalVectorDb {
    /// Create a local vector DB adapter scoped to a codebase root.
    pub fn new(codebase_root: PathBuf, storage_mode: SnapshotStorageMode) -> Result<Self> {
        let provider = VectorDbProviderInfo {
            id: VectorDbProviderId::new("hnsw-local"),
            name: "Local".into(),
        };
        Ok(Self {
            provider,
            codebase_root,
            storage_mode,
            collections: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn snapshot_root(&self) -> Option<PathBuf> {
        self.storage_mode
            .resolve_root(&self.codebase_root)
            .map(|root| root.join(LOCAL_SNAPSHOT_DIR).join(LOCAL_COLLECTIONS_DIR))
    }

    fn snapshot_path(&self, collection_name: &CollectionName) -> Option<PathBuf> {
        let root = self.snapshot_root()?;
        Some(root.join(format!("{}.json", collection_name.as_str())))
    }

    async fn ensure_loaded(&self, collection_name: &CollectionName) -> Result<()> {
        {
            let collections = self.collections.read().await;
            if collections.contains_key(collection_name) {
                return Ok(());
            }
        }

        let snapshot = self.read_snapshot(collection_name).await?;
        let Some(snapshot) = snapshot else {
            return Ok(());
        };
        let collection = LocalCollection::from_snapshot(snapshot)?;
        self.collections
            .write()
            .await
            .entry(collection_name.clone())
            .or_insert(collection);
        Ok(())
    }

    async fn read_snapshot(
        &self,
        collection_name: &CollectionName,
    ) -> Result<Option<CollectionSnapshot>> {
        let Some(path) = self.snapshot_path(collection_name) else {
            return Ok(None);
        };

        match tokio::fs::read(&path).await {
            Ok(payload) => {
                let snapshot = serde_json::from_slice(&payload).map_err(|error| {
                    snapshot_error("snapshot_parse_failed", "failed to parse snapshot", error)
                })?;
                Ok(Some(snapshot))
            },
            Err(error) => {
                if error.kind() == std::io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(ErrorEnvelope::from(error))
                }
            },
        }
    }

    async fn write_snapshot(
        &self,
        collection_name: &CollectionName,
        snapshot: &CollectionSnapshot,
    ) -> Result<()> {
        let Some(path) = self.snapshot_path(collection_name) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ErrorEnvelope::from)?;
        }
        let payload = serde_json::to_vec_pretty(snapshot).map_err(|error| {
            snapshot_error(
                "snapshot_serialize_failed",
                "failed to serialize snapshot",
                error,
            )
        })?;
        tokio::fs::write(&path, payload)
            .await
            .map_err(ErrorEnvelope::from)?;
        Ok(())
    }

    async fn persist_collection(&self, collection_name: &CollectionName) -> Result<()> {
        let snapshot = {
            let guard = self.collections.read().await;
            guard.get(collection_name).map(LocalCollection::snapshot)
        };
        let Some(snapshot) = snapshot else {
            return Ok(());
        };
        self.write_snapshot(collection_name, &snapshot).await
    }
}

impl VectorDbPort for LocalVectorDb {
    fn provider(&self) -> &VectorDbProviderInfo {
        &self.provider
    }

    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.create_collection")?;
            let collection = LocalCollection::new(dimension)?;
            let mut guard = db.collections.write().await;
            guard.insert(collection_name.clone(), collection);
            drop(guard);
            db.persist_collection(&collection_name).await
        })
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let collections = Arc::clone(&self.collections);
        let snapshot = self.snapshot_path(&collection_name);
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.drop_collection")?;
            let mut guard = collections.write().await;
            guard.remove(&collection_name);
            drop(guard);

            if let Some(path) = snapshot {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => (),
                    Err(error) => {
                        if error.kind() != std::io::ErrorKind::NotFound {
                            return Err(ErrorEnvelope::from(error));
                        }
                    },
                }
            }
            Ok(())
        })
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        let collections = Arc::clone(&self.collections);
        let snapshot = self.snapshot_path(&collection_name);
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.has_collection")?;
            let guard = collections.read().await;
            if guard.contains_key(&collection_name) {
                return Ok(true);
            }
            drop(guard);

            let Some(path) = snapshot else {
                return Ok(false);
            };

            match tokio::fs::metadata(&path).await {
                Ok(metadata) => Ok(metadata.is_file()),
                Err(error) => {
                    if error.kind() == std::io::ErrorKind::NotFound {
                        Ok(false)
                    } else {
                        Err(ErrorEnvelope::from(error))
                    }
                },
            }
        })
    }

    fn list_collections(
        &self,
        ctx: &RequestContext,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<CollectionName>>> {
        let ctx = ctx.clone();
        let collections = Arc::clone(&self.collections);
        let snapshot_root = self.snapshot_root();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.list_collections")?;
            let guard = collections.read().await;
            let mut names: BTreeMap<Box<str>, CollectionName> = guard
                .keys()
                .map(|name| (name.as_str().into(), name.clone()))
                .collect();
            drop(guard);

            let Some(root) = snapshot_root else {
                return Ok(names.into_values().collect());
            };

            let mut dir = match tokio::fs::read_dir(&root).await {
                Ok(dir) => dir,
                Err(error) => {
                    if error.kind() == std::io::ErrorKind::NotFound {
                        return Ok(names.into_values().collect());
                    }
                    return Err(ErrorEnvelope::from(error));
                },
            };

            while let Some(entry) = dir.next_entry().await.map_err(ErrorEnvelope::from)? {
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(collection) = collection_name_from_filename(&name) {
                    names
                        .entry(collection.as_str().into())
                        .or_insert(collection);
                }
            }

            Ok(names.into_values().collect())
        })
    }

    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.insert")?;
            db.ensure_loaded(&collection_name).await?;
            let mut guard = db.collections.write().await;
            let Some(collection) = guard.get_mut(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };

            collection.insert(documents)?;
            drop(guard);
            db.persist_collection(&collection_name).await
        })
    }

    fn search(
        &self,
        ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<VectorSearchResult>>> {
        let ctx = ctx.clone();
        let db = self.clone();
        let VectorSearchRequest {
            collection_name,
            query_vector,
            options,
        } = request;
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.search")?;
            db.ensure_loaded(&collection_name).await?;
            let top_k = options.top_k.unwrap_or(10).max(1) as usize;
            let threshold = options.threshold;
            let path_prefix = options.path_prefix;

            let results = {
                let guard = db.collections.read().await;
                let Some(collection) = guard.get(&collection_name) else {
                    return Err(ErrorEnvelope::expected(
                        ErrorCode::not_found(),
                        "collection not found",
                    ));
                };

                let matches = collection
                    .index
                    .search(query_vector.as_ref(), top_k.saturating_mul(5))?;

                let mut results = Vec::new();
                for candidate in matches {
                    let Some(chunk) = collection.documents.get(candidate.id.as_ref()) else {
                        continue;
                    };
                    if let Some(prefix) = &path_prefix
                        && !chunk.path.starts_with(prefix.as_ref())
                    {
                        continue;
                    }
                    let score = candidate.score;
                    if threshold.is_some_and(|value| score < value) {
                        continue;
                    }
                    results.push(VectorSearchResult {
                        document: VectorDocument {
                            chunk: chunk.clone(),
                        },
                        score,
                    });
                    if results.len() >= top_k {
                        break;
                    }
                }

                drop(guard);
                results
            };

            Ok(results)
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.delete")?;
            db.ensure_loaded(&collection_name).await?;
            let mut guard = db.collections.write().await;
            let Some(collection) = guard.get_mut(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };
            collection.delete(&ids)?;
            drop(guard);
            db.persist_collection(&collection_name).await
        })
    }

    fn query_by_path_prefix(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<VectorDocument>>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.query_by_path_prefix")?;
            db.ensure_loaded(&collection_name).await?;
            let limit = limit.map(|value| value.max(1) as usize);

            let rows = {
                let guard = db.collections.read().await;
                let Some(collection) = guard.get(&collection_name) else {
                    return Err(ErrorEnvelope::expected(
                        ErrorCode::not_found(),
                        "collection not found",
                    ));
                };
                let mut rows = Vec::new();
                for chunk in collection.documents.values() {
                    if !chunk.path.starts_with(path_prefix.as_ref()) {
                        continue;
                    }
                    rows.push(VectorDocument {
                        chunk: chunk.clone(),
                    });
                    if limit.is_some_and(|value| rows.len() >= value) {
                        break;
                    }
                }
                drop(guard);
                rows
            };

            Ok(rows)
        })
    }

    fn persist(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.persist")?;
            db.persist_collection(&collection_name).await
        })
    }

    fn create_fts_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let db = self.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.create_fts_index")?;
            db.ensure_loaded(&collection_name).await?;
            let mut guard = db.collections.write().await;
            let Some(collection) = guard.get_mut(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };
            collection.rebuild_fts_index();
            Ok(())
        })
    }

    fn fts_search(
        &self,
        ctx: &RequestContext,
        request: FtsSearchRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<FtsSearchResult>>> {
        let ctx = ctx.clone();
        let db = self.clone();
        let FtsSearchRequest {
            collection_name,
            query,
            options,
        } = request;
        Box::pin(async move {
            ctx.ensure_not_cancelled("vectordb_local.fts_search")?;
            db.ensure_loaded(&collection_name).await?;
            let limit = options.limit.unwrap_or(10).max(1) as usize;
            let path_prefix = options.path_prefix;

            let guard = db.collections.read().await;
            let Some(collection) = guard.get(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };

            let mut results = collection.fts_search(&query);
            if let Some(prefix) = &path_prefix {
                results.retain(|result| result.document.chunk.path.starts_with(prefix.as_ref()));
            }
            results.truncate(limit);
            Ok(results)
        })
    }
}

impl Clone for LocalVectorDb {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            codebase_root: self.codebase_root.clone(),
            storage_mode: self.storage_mode.clone(),
            collections: Arc::clone(&self.collections),
        }
    }
}

struct LocalCollection {
    dimension: u32,
    index: VectorIndex,
    documents: BTreeMap<Box<str>, Chunk>,
    /// token -> postings (chunk id, term frequency). Rebuilt on demand;
    /// not part of the on-disk snapshot since it's cheaply derived from
    /// `documents`.
    fts_index: HashMap<Box<str>, Vec<(Box<str>, u32)>>,
}

impl LocalCollection {
    fn new(dimension: u32) -> Result<Self> {
        let params = HnswParams::default();
        let index = VectorIndex::new(dimension, params)?;
        Ok(Self {
            dimension,
            index,
            documents: BTreeMap::new(),
            fts_index: HashMap::new(),
        })
    }

    fn rebuild_fts_index(&mut self) {
        let mut index: HashMap<Box<str>, Vec<(Box<str>, u32)>> = HashMap::new();
        for (id, chunk) in &self.documents {
            let mut term_counts: HashMap<Box<str>, u32> = HashMap::new();
            for token in tokenize(&chunk.content) {
                *term_counts.entry(token).or_insert(0) += 1;
            }
            for (token, count) in term_counts {
                index.entry(token).or_default().push((id.clone(), count));
            }
        }
        self.fts_index = index;
    }

    fn fts_search(&self, query: &str) -> Vec<FtsSearchResult> {
        let mut scores: HashMap<&str, f32> = HashMap::new();
        for token in tokenize(query) {
            let Some(postings) = self.fts_index.get(token.as_ref()) else {
                continue;
            };
            for (id, count) in postings {
                *scores.entry(id.as_ref()).or_insert(0.0) += *count as f32;
            }
        }

        let mut results: Vec<FtsSearchResult> = scores
            .into_iter()
            .filter_map(|(id, score)| {
                let chunk = self.documents.get(id)?;
                Some(FtsSearchResult {
                    document: VectorDocument {
                        chunk: chunk.clone(),
                    },
                    score,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.document.chunk.path.cmp(&b.document.chunk.path))
                .then_with(|| a.document.chunk.span.start_line().cmp(&b.document.chunk.span.start_line()))
        });
        results
    }

    fn insert(&mut self, documents: Vec<VectorDocumentForInsert>) -> Result<()> {
        let mut records = Vec::new();
        let mut docs = BTreeMap::new();
        for doc in documents {
            let chunk = doc.chunk;
            let id: Box<str> = chunk.id.to_string().into_boxed_str();
            records.push(VectorRecord {
                id: id.clone(),
                vector: chunk.vector.clone(),
            });
            docs.insert(id, chunk);
        }

        self.index.insert(records)?;
        for (id, chunk) in docs {
            self.documents.insert(id, chunk);
        }
        Ok(())
    }

    fn delete(&mut self, ids: &[Box<str>]) -> Result<()> {
        self.index.delete(ids)?;
        for id in ids {
            self.documents.remove(id.as_ref());
        }
        Ok(())
    }

    fn snapshot(&self) -> CollectionSnapshot {
        let chunks = self.documents.values().cloned().collect();
        CollectionSnapshot {
            version: LOCAL_SNAPSHOT_VERSION,
            dimension: self.dimension,
            chunks,
        }
    }

    fn from_snapshot(snapshot: CollectionSnapshot) -> Result<Self> {
        if snapshot.version != LOCAL_SNAPSHOT_VERSION {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("vector", "snapshot_version_mismatch"),
                "snapshot version mismatch",
            )
            .with_metadata("found", snapshot.version.to_string())
            .with_metadata("expected", LOCAL_SNAPSHOT_VERSION.to_string()));
        }
        let params = HnswParams::default();
        let mut index = VectorIndex::new(snapshot.dimension, params)?;
        let mut documents = BTreeMap::new();
        let mut records = Vec::new();
        for chunk in snapshot.chunks {
            let id: Box<str> = chunk.id.to_string().into_boxed_str();
            records.push(VectorRecord {
                id: id.clone(),
                vector: chunk.vector.clone(),
            });
            documents.insert(id, chunk);
        }
        index.insert(records)?;
        Ok(Self {
            dimension: snapshot.dimension,
            index,
            documents,
            fts_index: HashMap::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSnapshot {
    version: u32,
    dimension: u32,
    chunks: Vec<Chunk>,
}

/// Lowercase alphanumeric-run tokenizer for the hand-rolled inverted index.
fn tokenize(text: &str) -> Vec<Box<str>> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase().into_boxed_str())
        .collect()
}

fn snapshot_error(
    code: &'static str,
    message: &str,
    error: impl std::error::Error,
) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("vector", code),
        format!("{message}: {error}"),
        ErrorClass::NonRetriable,
    )
}

fn collection_name_from_filename(filename: &str) -> Option<CollectionName> {
    let trimmed = filename.strip_suffix(".json")?;
    CollectionName::new(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesearch_domain::{ChunkId, ChunkRole, ChunkSpan, ChunkType, ContentHash, QuantizedColbert};
    use codesearch_ports::VectorSearchOptions;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn sample_chunk(path: &str) -> Result<Chunk> {
        Ok(Chunk {
            id: ChunkId::new_random(),
            path: path.into(),
            hash: ContentHash::of_bytes(path.as_bytes()),
            content: "hello".into(),
            display_text: "hello".into(),
            span: ChunkSpan::new(0, 0)?,
            chunk_index: 0,
            is_anchor: false,
            chunk_type: ChunkType::Block,
            context_prev: None,
            context_next: None,
            context: Vec::new(),
            complexity: None,
            defined_symbols: Vec::new(),
            referenced_symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            role: ChunkRole::Implementation,
            parent_symbol: None,
            file_skeleton: None,
            vector: vec![0.1, 0.2, 0.3],
            colbert: QuantizedColbert::quantize(&[0.1, 0.2, 0.3], 3),
            pooled_colbert: None,
        })
    }

    #[tokio::test]
    async fn snapshot_roundtrip_persists_records() -> Result<()> {
        let tmp = std::env::temp_dir().join(format!(
            "codesearch-localdb-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|duration| duration.as_nanos())
                .unwrap_or(0)
        ));
        let db = LocalVectorDb::new(tmp.clone(), SnapshotStorageMode::Custom(tmp.clone()))?;
        let collection = CollectionName::new("local_snapshot")?;
        let ctx = RequestContext::new_request();
        db.create_collection(&ctx, collection.clone(), 3).await?;
        let chunk = sample_chunk("src/lib.rs")?;
        db.insert(
            &ctx,
            collection.clone(),
            vec![VectorDocumentForInsert { chunk }],
        )
        .await?;

        let restored = LocalVectorDb::new(tmp.clone(), SnapshotStorageMode::Custom(tmp.clone()))?;
        let results = restored
            .search(
                &ctx,
                VectorSearchRequest {
                    collection_name: collection,
                    query_vector: Arc::from(vec![0.1, 0.2, 0.3]),
                    options: VectorSearchOptions {
                        top_k: Some(1),
                        path_prefix: None,
                        threshold: None,
                    },
                },
            )
            .await?;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.chunk.path.as_ref(), "src/lib.rs");
        Ok(())
    }

    #[tokio::test]
    async fn fts_search_ranks_by_term_frequency() -> Result<()> {
        let tmp = std::env::temp_dir().join(format!(
            "codesearch-localdb-fts-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|duration| duration.as_nanos())
                .unwrap_or(0)
        ));
        let db = LocalVectorDb::new(tmp.clone(), SnapshotStorageMode::Custom(tmp))?;
        let collection = CollectionName::new("local_fts")?;
        let ctx = RequestContext::new_request();
        db.create_collection(&ctx, collection.clone(), 3).await?;

        let mut needle_heavy = sample_chunk("src/needle.rs")?;
        needle_heavy.content = "needle needle haystack".into();
        let mut needle_light = sample_chunk("src/other.rs")?;
        needle_light.content = "haystack haystack needle".into();
        db.insert(
            &ctx,
            collection.clone(),
            vec![
                VectorDocumentForInsert {
                    chunk: needle_heavy,
                },
                VectorDocumentForInsert {
                    chunk: needle_light,
                },
            ],
        )
        .await?;
        db.create_fts_index(&ctx, collection.clone()).await?;

        let results = db
            .fts_search(
                &ctx,
                FtsSearchRequest {
                    collection_name: collection,
                    query: "needle".into(),
                    options: codesearch_ports::FtsSearchOptions::default(),
                },
            )
            .await?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.chunk.path.as_ref(), "src/needle.rs");
        assert!(results[0].score > results[1].score);
        Ok(())
    }
}
