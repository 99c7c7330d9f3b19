//! Semantic search use-case: dense + FTS candidate retrieval fused by
//! reciprocal rank, then optionally reranked by late-interaction MaxSim.

use codesearch_domain::{
    Chunk, RRF_K, SearchOptions, SearchResult, SearchResultKey, compare_search_results,
    maxsim_score, reciprocal_rank_fusion,
};
use codesearch_ports::{
    CollectionName, EmbeddingPort, FtsSearchOptions, FtsSearchRequest, LogFields, LoggerPort,
    TelemetryPort, TelemetryTags, VectorDbPort, VectorDocument, VectorSearchOptions,
    VectorSearchRequest,
};
use codesearch_shared::{ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Input payload for semantic search.
#[derive(Debug, Clone)]
pub struct SemanticSearchInput {
    /// Root identifier for the codebase (for logging only).
    pub codebase_root: Box<str>,
    /// Target collection name.
    pub collection_name: CollectionName,
    /// Query text to embed.
    pub query: Box<str>,
    /// Search options (`top_k`, `candidate_limit`, `no_rerank`, ...).
    pub options: SearchOptions,
}

/// Dependencies required by semantic search.
#[derive(Clone)]
pub struct SemanticSearchDeps {
    /// Embedding adapter.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector database adapter.
    pub vectordb: Arc<dyn VectorDbPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry sink.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

/// Execute semantic search for the given input.
pub async fn semantic_search(
    ctx: &RequestContext,
    deps: &SemanticSearchDeps,
    input: SemanticSearchInput,
) -> Result<Vec<SearchResult>> {
    let started_at = Instant::now();
    let total_tags = tags_base();
    let total_timer = deps
        .telemetry
        .as_ref()
        .map(|telemetry| telemetry.start_timer("backend.search.total", Some(&total_tags)));

    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "backend.search.start",
            "Semantic search started",
            Some(log_fields_start(&input)),
        );
    }

    let result = run_search(ctx, deps, &input, started_at).await;

    if let Some(timer) = total_timer.as_ref() {
        timer.stop();
    }

    match result {
        Ok(results) => Ok(results),
        Err(error) => {
            let duration_ms = duration_ms(started_at);
            if error.is_cancelled() {
                if let Some(telemetry) = deps.telemetry.as_ref() {
                    telemetry.increment_counter("backend.search.aborted", 1, Some(&tags_base()));
                }
                if let Some(logger) = deps.logger.as_ref() {
                    logger.info(
                        "backend.search.aborted",
                        "Semantic search aborted",
                        Some(log_fields_abort(duration_ms)),
                    );
                }
            } else {
                if let Some(telemetry) = deps.telemetry.as_ref() {
                    telemetry.increment_counter("backend.search.failed", 1, Some(&tags_base()));
                }
                if let Some(logger) = deps.logger.as_ref() {
                    logger.error(
                        "backend.search.failed",
                        "Semantic search failed",
                        Some(log_fields_error(duration_ms, &error)),
                    );
                }
            }
            Err(error)
        },
    }
}

async fn run_search(
    ctx: &RequestContext,
    deps: &SemanticSearchDeps,
    input: &SemanticSearchInput,
    started_at: Instant,
) -> Result<Vec<SearchResult>> {
    ctx.ensure_not_cancelled("semantic_search.start")?;

    let has_collection = deps
        .vectordb
        .has_collection(ctx, input.collection_name.clone())
        .await?;
    if !has_collection {
        log_completed(deps, input, 0, started_at);
        return Ok(Vec::new());
    }

    let query_embedding = embed_query(ctx, deps, input).await?;

    let candidates = fetch_candidates(ctx, deps, input, &query_embedding).await?;
    let results = if candidates.is_empty() {
        Vec::new()
    } else if input.options.no_rerank {
        rrf_only_results(candidates)
    } else {
        rerank_candidates(deps, &query_embedding, candidates)
    };

    let mut ordered = results;
    ordered.sort_by(compare_search_results);
    ordered.truncate(usize::try_from(input.options.top_k.max(1)).unwrap_or(usize::MAX));

    if let Some(telemetry) = deps.telemetry.as_ref() {
        telemetry.increment_counter("backend.search.executed", 1, Some(&tags_base()));
    }

    log_completed(deps, input, ordered.len(), started_at);

    Ok(ordered)
}

/// Dense embedding plus the late-interaction token matrix for the query.
struct QueryEmbedding {
    dense: Arc<[f32]>,
    colbert: Arc<[f32]>,
    d_late: u32,
}

async fn embed_query(
    ctx: &RequestContext,
    deps: &SemanticSearchDeps,
    input: &SemanticSearchInput,
) -> Result<QueryEmbedding> {
    ctx.ensure_not_cancelled("semantic_search.embed")?;

    let embed_tags = tags_with("providerId", deps.embedding.provider().id.as_str());
    let embed_timer = deps
        .telemetry
        .as_ref()
        .map(|telemetry| telemetry.start_timer("backend.search.embed", Some(&embed_tags)));
    let output = deps
        .embedding
        .embed(ctx, input.query.clone().into())
        .await?;
    if let Some(timer) = embed_timer.as_ref() {
        timer.stop();
    }

    Ok(QueryEmbedding {
        dense: output.dense.into_vector(),
        colbert: output.colbert,
        d_late: output.d_late,
    })
}

/// A fused candidate: its RRF key, RRF score, and the underlying row if one
/// of the two source lists returned it (both lists return the full document).
struct FusedCandidate {
    key: SearchResultKey,
    rrf_score: f32,
    document: VectorDocument,
}

async fn fetch_candidates(
    ctx: &RequestContext,
    deps: &SemanticSearchDeps,
    input: &SemanticSearchInput,
    query_embedding: &QueryEmbedding,
) -> Result<Vec<FusedCandidate>> {
    ctx.ensure_not_cancelled("semantic_search.vectordb")?;

    let candidate_limit = input.options.candidate_limit.max(1);

    let dense_tags = tags_with_method("search", deps.vectordb.provider().id.as_str());
    let dense_timer = deps
        .telemetry
        .as_ref()
        .map(|telemetry| telemetry.start_timer("backend.search.dense", Some(&dense_tags)));
    let dense_results = deps
        .vectordb
        .search(
            ctx,
            VectorSearchRequest {
                collection_name: input.collection_name.clone(),
                query_vector: Arc::clone(&query_embedding.dense),
                options: VectorSearchOptions {
                    top_k: Some(candidate_limit),
                    path_prefix: input.options.path_prefix.clone(),
                    threshold: input.options.min_score,
                },
            },
        )
        .await?;
    if let Some(timer) = dense_timer.as_ref() {
        timer.stop();
    }

    let fts_tags = tags_with_method("fts_search", deps.vectordb.provider().id.as_str());
    let fts_timer = deps
        .telemetry
        .as_ref()
        .map(|telemetry| telemetry.start_timer("backend.search.fts", Some(&fts_tags)));
    let fts_results = deps
        .vectordb
        .fts_search(
            ctx,
            FtsSearchRequest {
                collection_name: input.collection_name.clone(),
                query: input.query.clone(),
                options: FtsSearchOptions {
                    limit: Some(candidate_limit),
                    path_prefix: input.options.path_prefix.clone(),
                },
            },
        )
        .await
        .unwrap_or_default();
    if let Some(timer) = fts_timer.as_ref() {
        timer.stop();
    }

    let mut documents: HashMap<SearchResultKey, VectorDocument> = HashMap::new();
    let dense_keys: Vec<SearchResultKey> = dense_results
        .into_iter()
        .map(|result| {
            let key = result_key(&result.document.chunk);
            documents.insert(key.clone(), result.document);
            key
        })
        .collect();
    let fts_keys: Vec<SearchResultKey> = fts_results
        .into_iter()
        .map(|result| {
            let key = result_key(&result.document.chunk);
            documents
                .entry(key.clone())
                .or_insert(result.document);
            key
        })
        .collect();

    let fused = reciprocal_rank_fusion(&dense_keys, &fts_keys, RRF_K);

    let candidates = fused
        .into_iter()
        .filter_map(|(key, rrf_score)| {
            documents.get(&key).cloned().map(|document| FusedCandidate {
                key,
                rrf_score,
                document,
            })
        })
        .take(usize::try_from(candidate_limit).unwrap_or(usize::MAX))
        .collect();

    Ok(candidates)
}

fn result_key(chunk: &Chunk) -> SearchResultKey {
    SearchResultKey {
        path: chunk.path.clone(),
        start_line: chunk.span.start_line(),
    }
}

fn rrf_only_results(candidates: Vec<FusedCandidate>) -> Vec<SearchResult> {
    candidates
        .into_iter()
        .map(|candidate| build_search_result(&candidate.document.chunk, candidate.key, candidate.rrf_score))
        .collect()
}

fn rerank_candidates(
    deps: &SemanticSearchDeps,
    query_embedding: &QueryEmbedding,
    candidates: Vec<FusedCandidate>,
) -> Vec<SearchResult> {
    let rerank_tags = tags_base();
    let rerank_timer = deps
        .telemetry
        .as_ref()
        .map(|telemetry| telemetry.start_timer("backend.search.rerank", Some(&rerank_tags)));

    let results = candidates
        .into_iter()
        .map(|candidate| {
            let chunk = &candidate.document.chunk;
            let doc_matrix = chunk.colbert.dequantize();
            let doc_dim = usize::try_from(chunk.colbert.d_late).unwrap_or(0);
            let score = maxsim_score(
                &query_embedding.colbert,
                usize::try_from(query_embedding.d_late).unwrap_or(0),
                &doc_matrix,
                doc_dim,
                None,
            );
            let score = if score > 0.0 { score } else { candidate.rrf_score };
            build_search_result(chunk, candidate.key, score)
        })
        .collect();

    if let Some(timer) = rerank_timer.as_ref() {
        timer.stop();
    }

    results
}

fn build_search_result(chunk: &Chunk, key: SearchResultKey, score: f32) -> SearchResult {
    SearchResult {
        key,
        end_line: chunk.span.end_line(),
        preview: preview_of(chunk),
        language: None,
        score,
        role: chunk.role,
        defined_symbols: chunk.defined_symbols.clone(),
        context: chunk.context.clone(),
    }
}

fn preview_of(chunk: &Chunk) -> Box<str> {
    const PREVIEW_CHARS: usize = 240;
    let text = chunk.display_text.as_ref();
    if text.chars().count() <= PREVIEW_CHARS {
        text.into()
    } else {
        text.chars().take(PREVIEW_CHARS).collect::<String>().into_boxed_str()
    }
}

fn log_completed(
    deps: &SemanticSearchDeps,
    input: &SemanticSearchInput,
    results: usize,
    started_at: Instant,
) {
    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "backend.search.completed",
            "Semantic search completed",
            Some(log_fields_completed(input, results, started_at)),
        );
    }
}

fn duration_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn tags_base() -> TelemetryTags {
    TelemetryTags::new()
}

fn tags_with(key: &str, value: &str) -> TelemetryTags {
    let mut tags = tags_base();
    tags.insert(
        key.to_owned().into_boxed_str(),
        value.to_owned().into_boxed_str(),
    );
    tags
}

fn tags_with_method(method: &str, provider: &str) -> TelemetryTags {
    let mut tags = tags_base();
    tags.insert(
        "method".to_owned().into_boxed_str(),
        method.to_owned().into_boxed_str(),
    );
    tags.insert(
        "providerId".to_owned().into_boxed_str(),
        provider.to_owned().into_boxed_str(),
    );
    tags
}

fn log_fields_start(input: &SemanticSearchInput) -> LogFields {
    let mut fields = LogFields::new();
    fields.insert(
        "codebaseRoot".to_owned().into_boxed_str(),
        Value::String(input.codebase_root.as_ref().to_owned()),
    );
    fields.insert(
        "collectionName".to_owned().into_boxed_str(),
        Value::String(input.collection_name.as_str().to_owned()),
    );
    fields.insert(
        "topK".to_owned().into_boxed_str(),
        Value::from(input.options.top_k),
    );
    fields.insert(
        "candidateLimit".to_owned().into_boxed_str(),
        Value::from(input.options.candidate_limit),
    );
    fields.insert(
        "noRerank".to_owned().into_boxed_str(),
        Value::from(input.options.no_rerank),
    );
    fields.insert(
        "queryLength".to_owned().into_boxed_str(),
        Value::from(input.query.len()),
    );
    fields
}

fn log_fields_completed(input: &SemanticSearchInput, results: usize, started_at: Instant) -> LogFields {
    let mut fields = log_fields_start(input);
    fields.insert(
        "durationMs".to_owned().into_boxed_str(),
        Value::from(duration_ms(started_at)),
    );
    fields.insert("results".to_owned().into_boxed_str(), Value::from(results));
    fields
}

fn log_fields_abort(duration_ms: u64) -> LogFields {
    let mut fields = LogFields::new();
    fields.insert(
        "durationMs".to_owned().into_boxed_str(),
        Value::from(duration_ms),
    );
    fields
}

fn log_fields_error(duration_ms: u64, error: &ErrorEnvelope) -> LogFields {
    let mut fields = log_fields_abort(duration_ms);
    fields.insert(
        "error".to_owned().into_boxed_str(),
        Value::String(error.to_string()),
    );
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesearch_domain::{
        ChunkId, ChunkRole, ChunkSpan, ChunkType, ContentHash, EmbeddingProviderId,
        QuantizedColbert, VectorDbProviderId,
    };
    use codesearch_ports::{
        DetectDimensionRequest, EmbedBatchRequest, EmbedOutput, EmbedRequest, EmbeddingProviderInfo,
        EmbeddingVector, FtsSearchResult, VectorDbProviderInfo, VectorDocumentForInsert,
        VectorSearchResult,
    };
    use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result as SharedResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn sample_chunk(path: &str, start_line: u32, colbert: Vec<f32>, d_late: u32) -> Result<Chunk> {
        Ok(Chunk {
            id: ChunkId::new_random(),
            path: path.into(),
            hash: ContentHash::of_bytes(path.as_bytes()),
            content: format!("fn {path}() {{}}").into_boxed_str(),
            display_text: format!("fn {path}() {{}}").into_boxed_str(),
            span: ChunkSpan::new(start_line, start_line + 1)?,
            chunk_index: 0,
            is_anchor: false,
            chunk_type: ChunkType::Function,
            context_prev: None,
            context_next: None,
            context: Vec::new(),
            complexity: Some(1),
            defined_symbols: Vec::new(),
            referenced_symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            role: ChunkRole::Implementation,
            parent_symbol: None,
            file_skeleton: None,
            vector: vec![0.1, 0.2, 0.3],
            colbert: QuantizedColbert::quantize(&colbert, d_late),
            pooled_colbert: None,
        })
    }

    #[derive(Clone)]
    struct TestEmbedding {
        provider: EmbeddingProviderInfo,
        dense: Arc<[f32]>,
        colbert: Arc<[f32]>,
        d_late: u32,
        calls: Arc<AtomicUsize>,
    }

    impl TestEmbedding {
        fn new(dense: Vec<f32>, colbert: Vec<f32>, d_late: u32) -> Self {
            let provider = EmbeddingProviderInfo {
                id: EmbeddingProviderId::new("test"),
                name: "test".into(),
                d_dense: u32::try_from(dense.len()).unwrap_or_default(),
                d_late,
            };
            Self {
                provider,
                dense: Arc::from(dense),
                colbert: Arc::from(colbert),
                d_late,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EmbeddingPort for TestEmbedding {
        fn provider(&self) -> &EmbeddingProviderInfo {
            &self.provider
        }

        fn detect_dimension(
            &self,
            _ctx: &RequestContext,
            _request: DetectDimensionRequest,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<u32>> {
            let dim = self.provider.d_dense;
            Box::pin(async move { Ok(dim) })
        }

        fn embed(
            &self,
            _ctx: &RequestContext,
            _request: EmbedRequest,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<EmbedOutput>> {
            let dense = Arc::clone(&self.dense);
            let colbert = Arc::clone(&self.colbert);
            let d_late = self.d_late;
            let calls = self.calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(EmbedOutput {
                    dense: EmbeddingVector::new(dense),
                    colbert,
                    d_late,
                })
            })
        }

        fn embed_batch(
            &self,
            _ctx: &RequestContext,
            _request: EmbedBatchRequest,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<Vec<EmbedOutput>>> {
            Box::pin(async move {
                Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "embed_batch not used in tests",
                ))
            })
        }
    }

    #[derive(Clone)]
    struct TestVectorDb {
        provider: VectorDbProviderInfo,
        has_collection: bool,
        dense_results: Vec<VectorSearchResult>,
        fts_results: Vec<FtsSearchResult>,
        search_calls: Arc<AtomicUsize>,
        last_search_options: Arc<Mutex<Option<VectorSearchOptions>>>,
    }

    impl TestVectorDb {
        fn new(dense_results: Vec<VectorSearchResult>, fts_results: Vec<FtsSearchResult>) -> Self {
            let provider = VectorDbProviderInfo {
                id: VectorDbProviderId::new("local"),
                name: "test".into(),
            };
            Self {
                provider,
                has_collection: true,
                dense_results,
                fts_results,
                search_calls: Arc::new(AtomicUsize::new(0)),
                last_search_options: Arc::new(Mutex::new(None)),
            }
        }

        fn last_search_options(&self) -> SharedResult<Option<VectorSearchOptions>> {
            let guard = self.last_search_options.lock().map_err(|_| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "search options lock poisoned",
                    ErrorClass::NonRetriable,
                )
            })?;
            Ok(guard.clone())
        }
    }

    impl VectorDbPort for TestVectorDb {
        fn provider(&self) -> &VectorDbProviderInfo {
            &self.provider
        }

        fn create_collection(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
            _dimension: u32,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn drop_collection(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn has_collection(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<bool>> {
            let has_collection = self.has_collection;
            Box::pin(async move { Ok(has_collection) })
        }

        fn list_collections(
            &self,
            _ctx: &RequestContext,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<Vec<CollectionName>>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn insert(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
            _documents: Vec<VectorDocumentForInsert>,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn search(
            &self,
            _ctx: &RequestContext,
            request: VectorSearchRequest,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<Vec<VectorSearchResult>>> {
            let results = self.dense_results.clone();
            let last_search_options = self.last_search_options.clone();
            let calls = self.search_calls.clone();
            let VectorSearchRequest { options, .. } = request;
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut guard = last_search_options.lock().map_err(|_| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::internal(),
                        "search options lock poisoned",
                        ErrorClass::NonRetriable,
                    )
                })?;
                *guard = Some(options);
                Ok(results)
            })
        }

        fn delete(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
            _ids: Vec<Box<str>>,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn query_by_path_prefix(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
            _path_prefix: Box<str>,
            _limit: Option<u32>,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<Vec<VectorDocument>>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn persist(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn create_fts_index(
            &self,
            _ctx: &RequestContext,
            _collection_name: CollectionName,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn fts_search(
            &self,
            _ctx: &RequestContext,
            _request: codesearch_ports::FtsSearchRequest,
        ) -> codesearch_ports::BoxFuture<'_, SharedResult<Vec<FtsSearchResult>>> {
            let results = self.fts_results.clone();
            Box::pin(async move { Ok(results) })
        }
    }

    fn dense_hit(chunk: Chunk, score: f32) -> VectorSearchResult {
        VectorSearchResult {
            document: VectorDocument { chunk },
            score,
        }
    }

    fn fts_hit(chunk: Chunk, score: f32) -> FtsSearchResult {
        FtsSearchResult {
            document: VectorDocument { chunk },
            score,
        }
    }

    fn base_options() -> SearchOptions {
        SearchOptions {
            top_k: 10,
            min_score: None,
            path_prefix: None,
            candidate_limit: 50,
            no_rerank: true,
        }
    }

    #[tokio::test]
    async fn ordering_and_tiebreakers_are_deterministic() -> SharedResult<()> {
        let dense = vec![
            dense_hit(sample_chunk("b.rs", 1, vec![0.1, 0.1], 2)?, 0.9),
            dense_hit(sample_chunk("a.rs", 5, vec![0.1, 0.1], 2)?, 0.9),
            dense_hit(sample_chunk("a.rs", 1, vec![0.1, 0.1], 2)?, 0.9),
        ];
        let vectordb = Arc::new(TestVectorDb::new(dense, Vec::new()));
        let embedding = Arc::new(TestEmbedding::new(vec![0.1, 0.2, 0.3], vec![0.1, 0.1], 2));
        let deps = SemanticSearchDeps {
            embedding,
            vectordb,
            logger: None,
            telemetry: None,
        };

        let ctx = RequestContext::new_request();
        let input = SemanticSearchInput {
            codebase_root: "/tmp".into(),
            collection_name: CollectionName::new("code_chunks_test")?,
            query: "hello".into(),
            options: base_options(),
        };

        let results = semantic_search(&ctx, &deps, input).await?;
        let ordered_paths: Vec<&str> = results.iter().map(|result| result.key.path.as_ref()).collect();
        assert_eq!(ordered_paths, vec!["a.rs", "a.rs", "b.rs"]);
        Ok(())
    }

    #[tokio::test]
    async fn min_score_is_forwarded_to_vectordb() -> SharedResult<()> {
        let vectordb = Arc::new(TestVectorDb::new(Vec::new(), Vec::new()));
        let embedding = Arc::new(TestEmbedding::new(vec![0.1, 0.2, 0.3], vec![0.1, 0.1], 2));
        let deps = SemanticSearchDeps {
            embedding,
            vectordb: vectordb.clone(),
            logger: None,
            telemetry: None,
        };

        let ctx = RequestContext::new_request();
        let mut options = base_options();
        options.min_score = Some(0.7);
        let input = SemanticSearchInput {
            codebase_root: "/tmp".into(),
            collection_name: CollectionName::new("code_chunks_test")?,
            query: "hello".into(),
            options,
        };

        let _ = semantic_search(&ctx, &deps, input).await?;
        let options = vectordb.last_search_options()?.ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "missing search options",
                ErrorClass::NonRetriable,
            )
        })?;
        assert_eq!(options.threshold, Some(0.7));
        Ok(())
    }

    #[tokio::test]
    async fn abort_stops_before_vectordb_call() -> SharedResult<()> {
        let vectordb = Arc::new(TestVectorDb::new(Vec::new(), Vec::new()));
        let embedding = Arc::new(TestEmbedding::new(vec![0.1, 0.2, 0.3], vec![0.1, 0.1], 2));
        let deps = SemanticSearchDeps {
            embedding: embedding.clone(),
            vectordb: vectordb.clone(),
            logger: None,
            telemetry: None,
        };

        let ctx = RequestContext::new_request();
        ctx.cancel();

        let input = SemanticSearchInput {
            codebase_root: "/tmp".into(),
            collection_name: CollectionName::new("code_chunks_test")?,
            query: "hello".into(),
            options: base_options(),
        };

        let result = semantic_search(&ctx, &deps, input).await;
        assert!(matches!(result, Err(error) if error.is_cancelled()));
        assert_eq!(embedding.calls.load(Ordering::SeqCst), 0);
        assert_eq!(vectordb.search_calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn fts_only_hits_still_surface_via_rrf() -> SharedResult<()> {
        let fts_chunk = sample_chunk("only_in_fts.rs", 1, vec![0.1, 0.1], 2)?;
        let vectordb = Arc::new(TestVectorDb::new(Vec::new(), vec![fts_hit(fts_chunk, 3.0)]));
        let embedding = Arc::new(TestEmbedding::new(vec![0.1, 0.2, 0.3], vec![0.1, 0.1], 2));
        let deps = SemanticSearchDeps {
            embedding,
            vectordb,
            logger: None,
            telemetry: None,
        };

        let ctx = RequestContext::new_request();
        let input = SemanticSearchInput {
            codebase_root: "/tmp".into(),
            collection_name: CollectionName::new("code_chunks_test")?,
            query: "hello".into(),
            options: base_options(),
        };

        let results = semantic_search(&ctx, &deps, input).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.path.as_ref(), "only_in_fts.rs");
        Ok(())
    }

    #[tokio::test]
    async fn maxsim_rerank_prefers_closer_colbert_match() -> SharedResult<()> {
        let close = sample_chunk("close.rs", 1, vec![1.0, 0.0], 2)?;
        let far = sample_chunk("far.rs", 1, vec![0.0, 1.0], 2)?;
        let dense = vec![dense_hit(far, 0.9), dense_hit(close, 0.5)];
        let vectordb = Arc::new(TestVectorDb::new(dense, Vec::new()));
        let embedding = Arc::new(TestEmbedding::new(vec![0.1, 0.2, 0.3], vec![1.0, 0.0], 2));
        let deps = SemanticSearchDeps {
            embedding,
            vectordb,
            logger: None,
            telemetry: None,
        };

        let ctx = RequestContext::new_request();
        let mut options = base_options();
        options.no_rerank = false;
        let input = SemanticSearchInput {
            codebase_root: "/tmp".into(),
            collection_name: CollectionName::new("code_chunks_test")?,
            query: "hello".into(),
            options,
        };

        let results = semantic_search(&ctx, &deps, input).await?;
        assert_eq!(results.first().map(|result| result.key.path.as_ref()), Some("close.rs"));
        Ok(())
    }
}
