//! In-memory adapters for CLI self-check smoke tests.

use codesearch_ports::{
    CodeChunk, CollectionName, DetectDimensionRequest, EmbedBatchRequest, EmbedOutput,
    EmbedRequest, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector, FileChangeSet,
    FileSyncInitOptions, FileSyncOptions, FileSyncPort, FileSystemDirEntry, FileSystemEntryKind,
    FileSystemPort, FileSystemStat, IgnoreMatchInput, IgnorePort, PathPolicyPort, SafeRelativePath,
    SplitOptions, SplitterPort, VectorDbPort, VectorDbProviderInfo, VectorDocument,
    VectorDocumentForInsert, VectorSearchOptions, VectorSearchRequest, VectorSearchResult,
};
use codesearch_domain::Chunk;
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

const SELF_CHECK_COLBERT_TOKENS: usize = 1;

/// In-memory embedding adapter for self-check.
#[derive(Clone)]
pub struct SelfCheckEmbedding {
    provider: EmbeddingProviderInfo,
    vector: Arc<[f32]>,
}

impl SelfCheckEmbedding {
    /// Build a default embedding adapter.
    pub fn new() -> Result<Self> {
        let dimension = u32::try_from(3usize).map_err(|_| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "embedding dimension overflow",
                ErrorClass::NonRetriable,
            )
        })?;
        let provider = EmbeddingProviderInfo {
            id: codesearch_ports::EmbeddingProviderId::new("self-check"),
            name: "self-check".into(),
            d_dense: dimension,
            d_late: dimension,
        };
        Ok(Self {
            provider,
            vector: Arc::from(vec![0.0, 0.0, 0.0]),
        })
    }

    fn dimension(&self) -> Result<u32> {
        u32::try_from(self.vector.len()).map_err(|_| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "embedding dimension overflow",
                ErrorClass::NonRetriable,
            )
        })
    }

    fn output(&self) -> Result<EmbedOutput> {
        let dimension = self.dimension()?;
        let vector = Arc::clone(&self.vector);
        let colbert: Vec<f32> = std::iter::repeat_n(vector.iter().copied(), SELF_CHECK_COLBERT_TOKENS)
            .flatten()
            .collect();
        Ok(EmbedOutput {
            dense: EmbeddingVector::new(vector),
            colbert: Arc::from(colbert),
            d_late: dimension,
        })
    }
}

impl EmbeddingPort for SelfCheckEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(
        &self,
        _ctx: &RequestContext,
        _request: DetectDimensionRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<u32>> {
        let dimension = self.dimension();
        Box::pin(async move { dimension })
    }

    fn embed(
        &self,
        _ctx: &RequestContext,
        _request: EmbedRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<EmbedOutput>> {
        let output = self.output();
        Box::pin(async move { output })
    }

    fn embed_batch(
        &self,
        _ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<EmbedOutput>>> {
        let output = self.output();
        Box::pin(async move {
            let output = output?;
            Ok(request.texts.iter().map(|_| output.clone()).collect())
        })
    }
}

/// In-memory vector DB adapter for self-check.
#[derive(Clone)]
pub struct SelfCheckVectorDb {
    provider: VectorDbProviderInfo,
    collections: Arc<RwLock<HashMap<CollectionName, CollectionState>>>,
}

#[derive(Clone)]
struct CollectionState {
    dimension: u32,
    documents: HashMap<Box<str>, Chunk>,
}

impl SelfCheckVectorDb {
    /// Build a default vector DB adapter.
    pub fn new() -> Result<Self> {
        let provider = VectorDbProviderInfo {
            id: codesearch_ports::VectorDbProviderId::new("self-check"),
            name: "self-check".into(),
        };
        Ok(Self {
            provider,
            collections: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn lock_collections(
        &self,
    ) -> tokio::sync::RwLockReadGuard<'_, HashMap<CollectionName, CollectionState>> {
        self.collections.read().await
    }

    async fn lock_collections_mut(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<CollectionName, CollectionState>> {
        self.collections.write().await
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(lhs, rhs)| lhs * rhs).sum()
    }

    async fn search_internal(
        &self,
        collection_name: &CollectionName,
        query_vector: &[f32],
        options: &VectorSearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        let (dimension, documents) = {
            let collections = self.lock_collections().await;
            let collection = collections.get(collection_name).ok_or_else(|| {
                ErrorEnvelope::expected(ErrorCode::not_found(), "collection not found")
            })?;
            let dimension = collection.dimension;
            let documents = collection.documents.clone();
            drop(collections);
            (dimension, documents)
        };

        let query_dimension = u32::try_from(query_vector.len()).map_err(|_| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "vector dimension overflow",
                ErrorClass::NonRetriable,
            )
        })?;
        if query_dimension != dimension {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "vector dimension mismatch",
            ));
        }

        let top_k = usize::try_from(options.top_k.unwrap_or(10).max(1)).map_err(|_| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "top_k overflow",
                ErrorClass::NonRetriable,
            )
        })?;
        let threshold = options.threshold;
        let path_prefix = options.path_prefix.as_ref();

        let mut scored = documents
            .values()
            .filter(|chunk| {
                path_prefix.is_none_or(|prefix| chunk.path.as_ref().starts_with(prefix.as_ref()))
            })
            .map(|chunk| {
                let score = Self::dot(query_vector, &chunk.vector);
                VectorSearchResult {
                    document: VectorDocument {
                        chunk: chunk.clone(),
                    },
                    score,
                }
            })
            .filter(|result| threshold.is_none_or(|value| result.score >= value))
            .collect::<Vec<_>>();
        drop(documents);

        scored.sort_by(|a, b| {
            let score = b.score.total_cmp(&a.score);
            if score != std::cmp::Ordering::Equal {
                return score;
            }
            a.document.chunk.id.to_string().cmp(&b.document.chunk.id.to_string())
        });
        scored.truncate(top_k);

        Ok(scored)
    }

    async fn insert_internal(
        &self,
        collection_name: &CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> Result<()> {
        let mut collections = self.lock_collections_mut().await;
        let collection = collections.get_mut(collection_name).ok_or_else(|| {
            ErrorEnvelope::expected(ErrorCode::not_found(), "collection not found")
        })?;
        let result = Self::insert_documents(collection, documents);
        drop(collections);
        result
    }

    fn insert_documents(
        collection: &mut CollectionState,
        documents: Vec<VectorDocumentForInsert>,
    ) -> Result<()> {
        for doc in documents {
            let chunk = doc.chunk;
            let dimension = u32::try_from(chunk.vector.len()).map_err(|_| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "vector dimension overflow",
                    ErrorClass::NonRetriable,
                )
            })?;
            if dimension != collection.dimension {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "vector dimension mismatch",
                ));
            }
            collection
                .documents
                .insert(chunk.id.to_string().into_boxed_str(), chunk);
        }
        Ok(())
    }
}

impl VectorDbPort for SelfCheckVectorDb {
    fn provider(&self) -> &VectorDbProviderInfo {
        &self.provider
    }

    fn create_collection(
        &self,
        _ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let this = self.clone();
        Box::pin(async move {
            {
                let mut collections = this.lock_collections_mut().await;
                collections
                    .entry(collection_name)
                    .or_insert_with(|| CollectionState {
                        dimension,
                        documents: HashMap::new(),
                    });
            }
            Ok(())
        })
    }

    fn drop_collection(
        &self,
        _ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let this = self.clone();
        Box::pin(async move {
            {
                let mut collections = this.lock_collections_mut().await;
                collections.remove(&collection_name);
            }
            Ok(())
        })
    }

    fn has_collection(
        &self,
        _ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<bool>> {
        let this = self.clone();
        Box::pin(async move {
            let collections = this.lock_collections().await;
            Ok(collections.contains_key(&collection_name))
        })
    }

    fn list_collections(
        &self,
        _ctx: &RequestContext,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<CollectionName>>> {
        let this = self.clone();
        Box::pin(async move {
            let collections = this.lock_collections().await;
            Ok(collections.keys().cloned().collect())
        })
    }

    fn insert(
        &self,
        _ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let this = self.clone();
        Box::pin(async move { this.insert_internal(&collection_name, documents).await })
    }

    fn search(
        &self,
        _ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<VectorSearchResult>>> {
        let this = self.clone();
        let VectorSearchRequest {
            collection_name,
            query_vector,
            options,
        } = request;
        Box::pin(async move {
            this.search_internal(&collection_name, query_vector.as_ref(), &options)
                .await
        })
    }

    fn delete(
        &self,
        _ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        let this = self.clone();
        Box::pin(async move {
            let mut collections = this.lock_collections_mut().await;
            if let Some(collection) = collections.get_mut(&collection_name) {
                for id in &ids {
                    collection.documents.remove(id);
                }
            }
            Ok(())
        })
    }

    fn query_by_path_prefix(
        &self,
        _ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<VectorDocument>>> {
        let this = self.clone();
        Box::pin(async move {
            let collections = this.lock_collections().await;
            let Some(collection) = collections.get(&collection_name) else {
                return Ok(Vec::new());
            };
            let mut matched: Vec<VectorDocument> = collection
                .documents
                .values()
                .filter(|chunk| chunk.path.as_ref().starts_with(path_prefix.as_ref()))
                .map(|chunk| VectorDocument {
                    chunk: chunk.clone(),
                })
                .collect();
            drop(collections);
            matched.sort_by(|a, b| a.chunk.id.to_string().cmp(&b.chunk.id.to_string()));
            if let Some(limit) = limit {
                let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                matched.truncate(limit);
            }
            Ok(matched)
        })
    }

    fn persist(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn create_fts_index(
        &self,
        _ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn fts_search(
        &self,
        _ctx: &RequestContext,
        request: codesearch_ports::FtsSearchRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<codesearch_ports::FtsSearchResult>>> {
        let this = self.clone();
        Box::pin(async move {
            let collections = this.lock_collections().await;
            let Some(collection) = collections.get(&request.collection_name) else {
                return Ok(Vec::new());
            };
            let query_lower = request.query.to_lowercase();
            let terms: Vec<&str> = query_lower.split_whitespace().collect();
            let path_prefix = request.options.path_prefix;
            let mut matched: Vec<codesearch_ports::FtsSearchResult> = collection
                .documents
                .values()
                .filter(|chunk| {
                    path_prefix
                        .as_ref()
                        .is_none_or(|prefix| chunk.path.as_ref().starts_with(prefix.as_ref()))
                })
                .filter_map(|chunk| {
                    let content_lower = chunk.content.to_lowercase();
                    let score = terms
                        .iter()
                        .filter(|term| content_lower.contains(*term))
                        .count();
                    (score > 0).then(|| codesearch_ports::FtsSearchResult {
                        document: VectorDocument {
                            chunk: chunk.clone(),
                        },
                        score: score as f32,
                    })
                })
                .collect();
            drop(collections);
            matched.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.document.chunk.id.to_string().cmp(&b.document.chunk.id.to_string()))
            });
            if let Some(limit) = request.options.limit {
                matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            }
            Ok(matched)
        })
    }
}

/// In-memory filesystem for self-check.
#[derive(Clone)]
pub struct SelfCheckFileSystem {
    state: Arc<RwLock<SelfCheckFileSystemState>>,
}

#[derive(Default)]
struct SelfCheckFileSystemState {
    files: HashMap<String, String>,
    dirs: HashMap<String, Vec<FileSystemDirEntry>>,
}

impl SelfCheckFileSystem {
    /// Build a filesystem with a small Rust fixture.
    #[must_use]
    pub fn new() -> Self {
        let mut state = SelfCheckFileSystemState::default();
        state.add_file("src/main.rs", "fn main() { println!(\"ok\"); }\n");
        state.add_file("src/lib.rs", "pub fn meaning() -> i32 { 42 }\n");
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

impl Default for SelfCheckFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SelfCheckFileSystemState {
    fn add_file(&mut self, path: &str, content: &str) {
        let normalized = path.replace('\\', "/");
        self.files.insert(normalized.clone(), content.to_string());

        let (dir, name) = normalized
            .rsplit_once('/')
            .map_or((".", normalized.as_str()), |(dir, name)| (dir, name));

        self.add_dir_entry(dir, name, FileSystemEntryKind::File);
        self.ensure_dirs(dir);
    }

    fn ensure_dirs(&mut self, dir: &str) {
        if dir == "." || dir.is_empty() {
            return;
        }
        let mut current = String::new();
        for segment in dir.split('/') {
            let parent = if current.is_empty() {
                "."
            } else {
                current.as_str()
            };
            let next = if current.is_empty() {
                segment.to_string()
            } else {
                format!("{current}/{segment}")
            };
            self.add_dir_entry(parent, segment, FileSystemEntryKind::Directory);
            current = next;
        }
    }

    fn add_dir_entry(&mut self, dir: &str, name: &str, kind: FileSystemEntryKind) {
        let entries = self.dirs.entry(dir.to_string()).or_default();
        if entries.iter().any(|entry| entry.name.as_ref() == name) {
            return;
        }
        entries.push(FileSystemDirEntry {
            name: name.to_string().into_boxed_str(),
            kind,
        });
    }
}

impl FileSystemPort for SelfCheckFileSystem {
    fn read_dir(
        &self,
        _ctx: &RequestContext,
        _codebase_root: PathBuf,
        dir: SafeRelativePath,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<FileSystemDirEntry>>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let state = state.read().await;
            Ok(state.dirs.get(dir.as_str()).cloned().unwrap_or_default())
        })
    }

    fn read_file_text(
        &self,
        _ctx: &RequestContext,
        _codebase_root: PathBuf,
        file: SafeRelativePath,
    ) -> codesearch_ports::BoxFuture<'_, Result<Box<str>>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let state = state.read().await;
            state
                .files
                .get(file.as_str())
                .map(|value| value.clone().into_boxed_str())
                .ok_or_else(|| ErrorEnvelope::expected(ErrorCode::not_found(), "missing file"))
        })
    }

    fn stat(
        &self,
        _ctx: &RequestContext,
        _codebase_root: PathBuf,
        path: SafeRelativePath,
    ) -> codesearch_ports::BoxFuture<'_, Result<FileSystemStat>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let state = state.read().await;
            let stat = if path.as_str() == "." || state.dirs.contains_key(path.as_str()) {
                FileSystemStat {
                    kind: FileSystemEntryKind::Directory,
                    size_bytes: 0,
                    mtime_ms: 0,
                }
            } else if let Some(contents) = state.files.get(path.as_str()) {
                FileSystemStat {
                    kind: FileSystemEntryKind::File,
                    size_bytes: contents.len() as u64,
                    mtime_ms: 0,
                }
            } else {
                FileSystemStat {
                    kind: FileSystemEntryKind::Other,
                    size_bytes: 0,
                    mtime_ms: 0,
                }
            };
            drop(state);
            Ok(stat)
        })
    }
}

/// In-memory file sync adapter for self-check.
#[derive(Clone, Default)]
pub struct SelfCheckFileSync;

impl SelfCheckFileSync {
    /// Build a default file sync adapter.
    pub const fn new() -> Self {
        Self
    }
}

impl FileSyncPort for SelfCheckFileSync {
    fn initialize(
        &self,
        _ctx: &RequestContext,
        _options: FileSyncInitOptions,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn check_for_changes(
        &self,
        _ctx: &RequestContext,
        _options: FileSyncOptions,
    ) -> codesearch_ports::BoxFuture<'_, Result<FileChangeSet>> {
        Box::pin(async move { Ok(FileChangeSet::default()) })
    }

    fn delete_snapshot(
        &self,
        _ctx: &RequestContext,
        _codebase_root: PathBuf,
    ) -> codesearch_ports::BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }
}

/// Path policy used for self-check.
pub struct SelfCheckPathPolicy;

impl PathPolicyPort for SelfCheckPathPolicy {
    fn to_safe_relative_path(&self, input: &str) -> Result<SafeRelativePath> {
        SafeRelativePath::new(input)
    }
}

/// Ignore matcher used for self-check.
pub struct SelfCheckIgnore;

impl IgnorePort for SelfCheckIgnore {
    fn is_ignored(&self, _input: &IgnoreMatchInput) -> bool {
        false
    }
}

/// Splitter used for self-check (single chunk).
pub struct SelfCheckSplitter;

impl SplitterPort for SelfCheckSplitter {
    fn split(
        &self,
        _ctx: &RequestContext,
        code: Box<str>,
        language: codesearch_ports::Language,
        options: SplitOptions,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<CodeChunk>>> {
        Box::pin(async move {
            let lines = u32::try_from(code.lines().count().max(1)).map_err(|_| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "line count overflow",
                    ErrorClass::NonRetriable,
                )
            })?;
            let span = codesearch_ports::LineSpan::new(1, lines).map_err(ErrorEnvelope::from)?;
            Ok(vec![CodeChunk::block(
                code,
                span,
                Some(language),
                options.file_path,
                0,
            )])
        })
    }

    fn set_chunk_size(&self, _chunk_size: usize) {}

    fn set_chunk_overlap(&self, _chunk_overlap: usize) {}
}
