//! Integration tests for the semantic search use case.

use codesearch_app::{SemanticSearchDeps, SemanticSearchInput, semantic_search};
use codesearch_domain::{
    Chunk, ChunkId, ChunkRole, ChunkSpan, ChunkType, CollectionName, ContentHash,
    EmbeddingProviderId, QuantizedColbert, SearchOptions, VectorDbProviderId,
};
use codesearch_ports::{
    DetectDimensionOptions, EmbeddingPort, EmbeddingProviderInfo, VectorDbPort,
    VectorDbProviderInfo, VectorDocumentForInsert,
};
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use codesearch_testkit::in_memory::{InMemoryEmbeddingFixed, InMemoryVectorDbFixed};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::test]
async fn search_fixture_repo_with_in_memory_adapters() -> Result<()> {
    let fixture_root =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../testkit/fixtures/search/basic");
    let relative_path = "src/lib.rs";
    let content =
        std::fs::read_to_string(fixture_root.join(relative_path)).map_err(ErrorEnvelope::from)?;

    let embedding = Arc::new(InMemoryEmbeddingFixed::<8>::new(EmbeddingProviderInfo {
        id: EmbeddingProviderId::new("fixture"),
        name: "in-memory".into(),
        d_dense: 8,
        d_late: 4,
    })?);
    let vectordb = Arc::new(InMemoryVectorDbFixed::<8>::new(VectorDbProviderInfo {
        id: VectorDbProviderId::new("local"),
        name: "in-memory".into(),
    }));

    let ctx = RequestContext::new_request();
    let dimension = embedding
        .detect_dimension(&ctx, DetectDimensionOptions::default().into())
        .await?;
    let collection = CollectionName::new("code_chunks_search")?;
    vectordb
        .create_collection(&ctx, collection.clone(), dimension)
        .await?;

    let span = span_for(&content)?;
    let embedding_output = embedding
        .embed(&ctx, content.clone().into_boxed_str().into())
        .await?;

    let chunk = Chunk {
        id: ChunkId::new_random(),
        path: relative_path.into(),
        hash: ContentHash::of_bytes(content.as_bytes()),
        content: content.clone().into_boxed_str(),
        display_text: content.clone().into_boxed_str(),
        span,
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
        vector: embedding_output.dense.as_slice().to_vec(),
        colbert: QuantizedColbert::quantize(
            &embedding_output.colbert,
            embedding_output.d_late,
        ),
        pooled_colbert: None,
    };

    vectordb
        .insert(&ctx, collection.clone(), vec![VectorDocumentForInsert { chunk }])
        .await?;
    vectordb.create_fts_index(&ctx, collection.clone()).await?;

    let deps = SemanticSearchDeps {
        embedding,
        vectordb,
        logger: None,
        telemetry: None,
    };

    let input = SemanticSearchInput {
        codebase_root: fixture_root.to_string_lossy().to_string().into_boxed_str(),
        collection_name: collection,
        query: "needle".into(),
        options: SearchOptions {
            top_k: 5,
            min_score: Some(0.0),
            path_prefix: None,
            candidate_limit: 50,
            no_rerank: false,
        },
    };

    let results = semantic_search(&ctx, &deps, input).await?;
    assert!(
        results
            .iter()
            .any(|result| result.key.path.as_ref() == relative_path),
        "expected results to include fixture path"
    );

    Ok(())
}

fn span_for(content: &str) -> Result<ChunkSpan> {
    let line_count = content.lines().count().max(1);
    let end_line = u32::try_from(line_count - 1).map_err(|_| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            "line count overflow",
            ErrorClass::NonRetriable,
        )
    })?;
    ChunkSpan::new(0, end_line).map_err(ErrorEnvelope::from)
}
