//! In-memory adapter implementations for port contracts.
//!
//! These implementations are intended for:
//! - Unit/integration tests
//! - Deterministic contract tests for the ports layer
//! - Local experimentation without external dependencies

use codesearch_domain::Chunk;
use codesearch_ports::{
    BoxFuture, CollectionName, DetectDimensionRequest, EmbedBatchRequest, EmbedOutput,
    EmbedRequest, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector, EmbeddingVectorFixed,
    FtsSearchRequest, FtsSearchResult, LogEvent, LogFields, LogLevel, LoggerPort, TelemetryPort,
    TelemetryTags, TelemetryTimer, VectorDbPort, VectorDbProviderInfo, VectorDocument,
    VectorDocumentForInsert, VectorSearchRequest, VectorSearchResult,
};
use codesearch_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// A no-op telemetry timer.
#[derive(Debug, Default)]
pub struct NoopTimer;

impl TelemetryTimer for NoopTimer {
    fn stop(&self) {}
}

/// A no-op telemetry implementation.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetryPort for NoopTelemetry {
    fn increment_counter(&self, _name: &str, _value: u64, _tags: Option<&TelemetryTags>) {}

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}

    fn start_timer(&self, _name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(NoopTimer)
    }
}

fn embed_text_with_dimension(text: &str, dimension: u32) -> Vec<f32> {
    let dim = dimension.max(1) as usize;
    let mut buckets = vec![0u32; dim];
    for (idx, byte) in text.as_bytes().iter().enumerate() {
        let slot = idx % dim;
        buckets[slot] = buckets[slot].wrapping_add(u32::from(*byte));
    }

    buckets
        .into_iter()
        .map(|value| (value as f32) / 255.0)
        .collect()
}

/// Deterministic in-memory embedding provider, sized by the provider's
/// `d_dense`/`d_late` fields rather than a separate dimension argument, so it
/// matches the shape real embedding adapters (e.g. the ONNX one) are
/// constructed with.
#[derive(Debug, Clone)]
pub struct InMemoryEmbedding {
    provider: EmbeddingProviderInfo,
}

impl InMemoryEmbedding {
    /// Create a deterministic embedder.
    #[must_use]
    pub const fn new(provider: EmbeddingProviderInfo) -> Self {
        Self { provider }
    }

    fn embed_dense(&self, text: &str) -> Vec<f32> {
        embed_text_with_dimension(text, self.provider.d_dense)
    }

    /// Split `text` on whitespace and embed each token, producing a row-major
    /// `[token_count, d_late]` matrix. Falls back to a single all-text token
    /// when the input has no whitespace-separated words.
    fn embed_colbert(&self, text: &str) -> Vec<f32> {
        let d_late = self.provider.d_late;
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let tokens: Vec<&str> = if tokens.is_empty() { vec![text] } else { tokens };
        tokens
            .into_iter()
            .flat_map(|token| embed_text_with_dimension(token, d_late))
            .collect()
    }
}

/// Deterministic in-memory embedding provider with a fixed compile-time dense
/// dimension (late-interaction width still comes from the provider at
/// runtime).
#[derive(Debug, Clone)]
pub struct InMemoryEmbeddingFixed<const D: usize> {
    inner: InMemoryEmbedding,
}

impl<const D: usize> InMemoryEmbeddingFixed<D> {
    /// Create a deterministic embedder that enforces dense dimension `D`.
    pub fn new(provider: EmbeddingProviderInfo) -> Result<Self> {
        let expected = Self::dimension()?;
        if provider.d_dense != expected {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimension mismatch",
            )
            .with_metadata("expected", expected.to_string())
            .with_metadata("actual", provider.d_dense.to_string()));
        }
        Ok(Self {
            inner: InMemoryEmbedding::new(provider),
        })
    }

    fn dimension() -> Result<u32> {
        u32::try_from(D).map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimension out of range",
            )
        })
    }
}

impl EmbeddingPort for InMemoryEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(
        &self,
        ctx: &RequestContext,
        _request: DetectDimensionRequest,
    ) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_embedding.detect_dimension")?;
            Ok(self.provider.d_dense)
        })
    }

    fn embed(
        &self,
        ctx: &RequestContext,
        request: EmbedRequest,
    ) -> BoxFuture<'_, Result<EmbedOutput>> {
        let ctx = ctx.clone();
        let text = request.text;
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_embedding.embed")?;
            Ok(EmbedOutput {
                dense: EmbeddingVector::from_vec(self.embed_dense(text.as_ref())),
                colbert: Arc::from(self.embed_colbert(text.as_ref())),
                d_late: self.provider.d_late,
            })
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbedOutput>>> {
        let ctx = ctx.clone();
        let texts = request.texts;
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_embedding.embed_batch")?;
            let out = texts
                .into_iter()
                .map(|text| EmbedOutput {
                    dense: EmbeddingVector::from_vec(self.embed_dense(text.as_ref())),
                    colbert: Arc::from(self.embed_colbert(text.as_ref())),
                    d_late: self.provider.d_late,
                })
                .collect();
            Ok(out)
        })
    }
}

impl<const D: usize> EmbeddingPort for InMemoryEmbeddingFixed<D> {
    fn provider(&self) -> &EmbeddingProviderInfo {
        EmbeddingPort::provider(&self.inner)
    }

    fn detect_dimension(
        &self,
        ctx: &RequestContext,
        _request: DetectDimensionRequest,
    ) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_embedding_fixed.detect_dimension")?;
            Self::dimension()
        })
    }

    fn embed(
        &self,
        ctx: &RequestContext,
        request: EmbedRequest,
    ) -> BoxFuture<'_, Result<EmbedOutput>> {
        let future = self.inner.embed(ctx, request);
        Box::pin(async move {
            let output = future.await?;
            let fixed = EmbeddingVectorFixed::<D>::try_from(output.dense)?;
            Ok(EmbedOutput {
                dense: EmbeddingVector::from(fixed),
                ..output
            })
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbedOutput>>> {
        let future = self.inner.embed_batch(ctx, request);
        Box::pin(async move {
            let outputs = future.await?;
            outputs
                .into_iter()
                .map(|output| {
                    let fixed = EmbeddingVectorFixed::<D>::try_from(output.dense)?;
                    Ok(EmbedOutput {
                        dense: EmbeddingVector::from(fixed),
                        ..output
                    })
                })
                .collect()
        })
    }
}

struct CollectionState {
    dimension: u32,
    documents: HashMap<Box<str>, Chunk>,
    /// token -> postings (chunk id, term frequency); rebuilt on demand by
    /// `create_fts_index`, mirroring the local production adapter.
    fts_index: HashMap<Box<str>, Vec<(Box<str>, u32)>>,
}

impl CollectionState {
    fn new(dimension: u32) -> Self {
        Self {
            dimension,
            documents: HashMap::new(),
            fts_index: HashMap::new(),
        }
    }
}

fn tokenize(text: &str) -> Vec<Box<str>> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase().into_boxed_str())
        .collect()
}

/// In-memory vector DB implementation with naive linear-scan dense search and
/// a hand-rolled inverted index for full-text search.
pub struct InMemoryVectorDb {
    provider: VectorDbProviderInfo,
    collections: RwLock<HashMap<CollectionName, CollectionState>>,
}

impl std::fmt::Debug for InMemoryVectorDb {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InMemoryVectorDb")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl InMemoryVectorDb {
    /// Create a new empty in-memory vector DB.
    #[must_use]
    pub fn new(provider: VectorDbProviderInfo) -> Self {
        Self {
            provider,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    fn ensure_dimension(expected: u32, vector: &[f32]) -> Result<()> {
        if vector.len() != expected as usize {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "vector dimension mismatch",
            )
            .with_metadata("expected", expected.to_string())
            .with_metadata("actual", vector.len().to_string()));
        }
        Ok(())
    }
}

/// In-memory vector DB that enforces a fixed compile-time dimension whenever
/// a collection is created.
#[derive(Debug)]
pub struct InMemoryVectorDbFixed<const D: usize> {
    inner: InMemoryVectorDb,
}

impl<const D: usize> InMemoryVectorDbFixed<D> {
    /// Create a new fixed-dimension vector DB.
    #[must_use]
    pub fn new(provider: VectorDbProviderInfo) -> Self {
        Self {
            inner: InMemoryVectorDb::new(provider),
        }
    }

    fn expected_dimension() -> Result<u32> {
        u32::try_from(D).map_err(|_| {
            ErrorEnvelope::expected(ErrorCode::invalid_input(), "vector dimension out of range")
        })
    }

    fn ensure_dimension_matches(dimension: u32) -> Result<u32> {
        let expected = Self::expected_dimension()?;
        if dimension != expected {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "vector dimension mismatch",
            )
            .with_metadata("expected", expected.to_string())
            .with_metadata("actual", dimension.to_string()));
        }
        Ok(expected)
    }
}

impl VectorDbPort for InMemoryVectorDb {
    fn provider(&self) -> &VectorDbProviderInfo {
        &self.provider
    }

    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.create_collection")?;
            let mut state = self.collections.write().await;
            state
                .entry(collection_name)
                .or_insert_with(|| CollectionState::new(dimension));
            Ok(())
        })
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.drop_collection")?;
            let mut state = self.collections.write().await;
            state.remove(&collection_name);
            Ok(())
        })
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.has_collection")?;
            let state = self.collections.read().await;
            Ok(state.contains_key(&collection_name))
        })
    }

    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.list_collections")?;
            let state = self.collections.read().await;
            let mut out: Vec<_> = state.keys().cloned().collect();
            out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Ok(out)
        })
    }

    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.insert")?;
            let mut state = self.collections.write().await;
            let Some(collection) = state.get_mut(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };

            for doc in documents {
                let chunk = doc.chunk;
                Self::ensure_dimension(collection.dimension, &chunk.vector)?;
                let id: Box<str> = chunk.id.to_string().into_boxed_str();
                collection.documents.insert(id, chunk);
            }

            Ok(())
        })
    }

    fn search(
        &self,
        ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> BoxFuture<'_, Result<Vec<VectorSearchResult>>> {
        let ctx = ctx.clone();
        let VectorSearchRequest {
            collection_name,
            query_vector,
            options,
        } = request;
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.search")?;
            let state = self.collections.read().await;
            let Some(collection) = state.get(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };

            Self::ensure_dimension(collection.dimension, query_vector.as_ref())?;

            let top_k = options.top_k.unwrap_or(10).max(1) as usize;
            let threshold = options.threshold;
            let path_prefix = options.path_prefix;

            let mut scored: Vec<VectorSearchResult> = collection
                .documents
                .values()
                .filter(|chunk| {
                    path_prefix
                        .as_ref()
                        .is_none_or(|prefix| chunk.path.starts_with(prefix.as_ref()))
                })
                .map(|chunk| {
                    let score = Self::dot(query_vector.as_ref(), &chunk.vector);
                    VectorSearchResult {
                        document: VectorDocument {
                            chunk: chunk.clone(),
                        },
                        score,
                    }
                })
                .filter(|result| threshold.is_none_or(|t| result.score >= t))
                .collect();

            scored.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.document.chunk.path.cmp(&b.document.chunk.path))
                    .then_with(|| {
                        a.document
                            .chunk
                            .span
                            .start_line()
                            .cmp(&b.document.chunk.span.start_line())
                    })
            });
            scored.truncate(top_k);

            Ok(scored)
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.delete")?;
            let mut state = self.collections.write().await;
            let Some(collection) = state.get_mut(&collection_name) else {
                return Ok(());
            };

            for id in ids {
                collection.documents.remove(id.as_ref());
            }
            Ok(())
        })
    }

    fn query_by_path_prefix(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<VectorDocument>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.query_by_path_prefix")?;
            let state = self.collections.read().await;
            let Some(collection) = state.get(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };
            let limit = limit.map(|value| value.max(1) as usize);
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
            Ok(rows)
        })
    }

    fn persist(
        &self,
        ctx: &RequestContext,
        _collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.persist")?;
            Ok(())
        })
    }

    fn create_fts_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.create_fts_index")?;
            let mut state = self.collections.write().await;
            let Some(collection) = state.get_mut(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };

            let mut index: HashMap<Box<str>, Vec<(Box<str>, u32)>> = HashMap::new();
            for (id, chunk) in &collection.documents {
                let mut term_counts: HashMap<Box<str>, u32> = HashMap::new();
                for token in tokenize(&chunk.content) {
                    *term_counts.entry(token).or_insert(0) += 1;
                }
                for (token, count) in term_counts {
                    index.entry(token).or_default().push((id.clone(), count));
                }
            }
            collection.fts_index = index;
            Ok(())
        })
    }

    fn fts_search(
        &self,
        ctx: &RequestContext,
        request: FtsSearchRequest,
    ) -> BoxFuture<'_, Result<Vec<FtsSearchResult>>> {
        let ctx = ctx.clone();
        let FtsSearchRequest {
            collection_name,
            query,
            options,
        } = request;
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_vectordb.fts_search")?;
            let state = self.collections.read().await;
            let Some(collection) = state.get(&collection_name) else {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    "collection not found",
                ));
            };

            let limit = options.limit.unwrap_or(10).max(1) as usize;
            let path_prefix = options.path_prefix;

            let mut scores: HashMap<&str, f32> = HashMap::new();
            for token in tokenize(&query) {
                let Some(postings) = collection.fts_index.get(token.as_ref()) else {
                    continue;
                };
                for (id, count) in postings {
                    *scores.entry(id.as_ref()).or_insert(0.0) += *count as f32;
                }
            }

            let mut results: Vec<FtsSearchResult> = scores
                .into_iter()
                .filter_map(|(id, score)| {
                    let chunk = collection.documents.get(id)?;
                    if let Some(prefix) = &path_prefix
                        && !chunk.path.starts_with(prefix.as_ref())
                    {
                        return None;
                    }
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
                    .then_with(|| {
                        a.document
                            .chunk
                            .span
                            .start_line()
                            .cmp(&b.document.chunk.span.start_line())
                    })
            });
            results.truncate(limit);
            Ok(results)
        })
    }
}

impl<const D: usize> VectorDbPort for InMemoryVectorDbFixed<D> {
    fn provider(&self) -> &VectorDbProviderInfo {
        VectorDbPort::provider(&self.inner)
    }

    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> BoxFuture<'_, Result<()>> {
        let expected = match Self::ensure_dimension_matches(dimension) {
            Ok(value) => value,
            Err(error) => return Box::pin(async move { Err(error) }),
        };
        self.inner.create_collection(ctx, collection_name, expected)
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.drop_collection(ctx, collection_name)
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        self.inner.has_collection(ctx, collection_name)
    }

    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>> {
        self.inner.list_collections(ctx)
    }

    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.insert(ctx, collection_name, documents)
    }

    fn search(
        &self,
        ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> BoxFuture<'_, Result<Vec<VectorSearchResult>>> {
        self.inner.search(ctx, request)
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.delete(ctx, collection_name, ids)
    }

    fn query_by_path_prefix(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<VectorDocument>>> {
        self.inner
            .query_by_path_prefix(ctx, collection_name, path_prefix, limit)
    }

    fn persist(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.persist(ctx, collection_name)
    }

    fn create_fts_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.create_fts_index(ctx, collection_name)
    }

    fn fts_search(
        &self,
        ctx: &RequestContext,
        request: FtsSearchRequest,
    ) -> BoxFuture<'_, Result<Vec<FtsSearchResult>>> {
        self.inner.fts_search(ctx, request)
    }
}

/// Build a `LogEvent` helper for tests.
#[must_use]
pub fn log_event(level: LogLevel, event: &str, message: &str) -> LogEvent {
    LogEvent {
        event: event.to_owned().into_boxed_str(),
        level,
        message: message.to_owned().into_boxed_str(),
        fields: None,
        error: None,
    }
}

/// Build a single-tag map for tests.
#[must_use]
pub fn tags_1(key: &str, value: &str) -> TelemetryTags {
    let mut tags = TelemetryTags::new();
    tags.insert(
        key.to_owned().into_boxed_str(),
        value.to_owned().into_boxed_str(),
    );
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesearch_domain::{
        ChunkId, ChunkRole, ChunkSpan, ChunkType, ContentHash, EmbeddingProviderId,
        QuantizedColbert, VectorDbProviderId,
    };
    use codesearch_ports::DetectDimensionOptions;

    fn sample_chunk(path: &str) -> Result<Chunk> {
        Ok(Chunk {
            id: ChunkId::new_random(),
            path: path.into(),
            hash: ContentHash::of_bytes(path.as_bytes()),
            content: "hello world".into(),
            display_text: "hello world".into(),
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
            vector: vec![1.0, 0.0, 0.0, 0.0],
            colbert: QuantizedColbert::quantize(&[0.1, 0.2, 0.3], 3),
            pooled_colbert: None,
        })
    }

    #[tokio::test]
    async fn in_memory_embedding_is_deterministic() -> Result<()> {
        let ctx = RequestContext::new_request();
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::new("test"),
            name: "test".into(),
            d_dense: 8,
            d_late: 4,
        };
        let embedder = InMemoryEmbedding::new(provider);

        let d = embedder
            .detect_dimension(&ctx, DetectDimensionOptions::default().into())
            .await?;
        assert_eq!(d, 8);

        let one = embedder.embed(&ctx, "hello world".into()).await?;
        let two = embedder.embed(&ctx, "hello world".into()).await?;

        assert_eq!(one.dense.dimension(), 8);
        assert_eq!(one.dense.as_slice().len(), 8);
        assert_eq!(one.colbert.len(), 2 * 4);
        assert_eq!(one, two, "same input should embed deterministically");

        let batch = embedder
            .embed_batch(
                &ctx,
                EmbedBatchRequest::from(vec!["a".to_string(), "b".to_string()]),
            )
            .await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].dense.dimension(), 8);

        Ok(())
    }

    #[tokio::test]
    async fn in_memory_vectordb_supports_insert_and_search() -> Result<()> {
        let ctx = RequestContext::new_request();
        let provider = VectorDbProviderInfo {
            id: VectorDbProviderId::new("local"),
            name: "local".into(),
        };
        let db = InMemoryVectorDb::new(provider);

        let collection = CollectionName::new("code_chunks_test")?;
        db.create_collection(&ctx, collection.clone(), 4).await?;

        let mut doc_a = sample_chunk("src/lib.rs")?;
        doc_a.vector = vec![1.0, 0.0, 0.0, 0.0];
        let mut doc_b = sample_chunk("src/other.rs")?;
        doc_b.vector = vec![0.0, 1.0, 0.0, 0.0];

        db.insert(
            &ctx,
            collection.clone(),
            vec![
                VectorDocumentForInsert { chunk: doc_a },
                VectorDocumentForInsert { chunk: doc_b },
            ],
        )
        .await?;

        let results = db
            .search(
                &ctx,
                VectorSearchRequest {
                    collection_name: collection,
                    query_vector: Arc::from(vec![1.0, 0.0, 0.0, 0.0]),
                    options: codesearch_ports::VectorSearchOptions {
                        top_k: Some(2),
                        path_prefix: None,
                        threshold: None,
                    },
                },
            )
            .await?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.chunk.path.as_ref(), "src/lib.rs");
        Ok(())
    }

    #[tokio::test]
    async fn in_memory_vectordb_fts_search_ranks_by_term_frequency() -> Result<()> {
        let ctx = RequestContext::new_request();
        let provider = VectorDbProviderInfo {
            id: VectorDbProviderId::new("local"),
            name: "local".into(),
        };
        let db = InMemoryVectorDb::new(provider);
        let collection = CollectionName::new("code_chunks_fts")?;
        db.create_collection(&ctx, collection.clone(), 4).await?;

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

    #[test]
    fn noop_logger_and_telemetry_are_safe() {
        let logger = NoopLogger::default();
        let child = logger.child(LogFields::new());
        child.log(log_event(LogLevel::Info, "event", "message"));

        let telemetry = NoopTelemetry::default();
        telemetry.increment_counter("counter", 1, None);
        telemetry.record_timer_ms("timer", 10, None);
        let timer = telemetry.start_timer("timer2", None);
        timer.stop();
    }
}
