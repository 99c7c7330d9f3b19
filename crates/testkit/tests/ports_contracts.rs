//! Contract-style tests for port traits using in-memory adapters.

use codesearch_domain::{
    Chunk, ChunkId, ChunkRole, ChunkSpan, ChunkType, ContentHash, EmbeddingProviderId,
    QuantizedColbert, VectorDbProviderId,
};
use codesearch_ports::{
    CollectionName, DetectDimensionOptions, EmbedBatchRequest, EmbeddingPort,
    EmbeddingProviderInfo, LoggerPort, TelemetryPort, VectorDbPort, VectorDbProviderInfo,
    VectorDocumentForInsert, VectorSearchOptions, VectorSearchRequest,
};
use codesearch_shared::{RequestContext, Result};
use codesearch_testkit::in_memory::{
    InMemoryEmbeddingFixed, InMemoryVectorDbFixed, NoopLogger, NoopTelemetry,
};
use std::sync::Arc;

fn sample_chunk(path: &str, vector: Vec<f32>) -> Result<Chunk> {
    Ok(Chunk {
        id: ChunkId::new_random(),
        path: path.into(),
        hash: ContentHash::of_bytes(path.as_bytes()),
        content: format!("fn {path}() {{}}").into_boxed_str(),
        display_text: format!("fn {path}() {{}}").into_boxed_str(),
        span: ChunkSpan::new(0, 2)?,
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
        vector,
        colbert: QuantizedColbert::quantize(&[0.1, 0.2, 0.3], 3),
        pooled_colbert: None,
    })
}

#[tokio::test]
async fn embedding_port_contract_smoke() -> Result<()> {
    let ctx = RequestContext::new_request();
    let provider = EmbeddingProviderInfo {
        id: EmbeddingProviderId::new("test"),
        name: "test".into(),
        d_dense: 8,
        d_late: 4,
    };
    let port = InMemoryEmbeddingFixed::<8>::new(provider)?;

    let dim = port
        .detect_dimension(&ctx, DetectDimensionOptions::default().into())
        .await?;
    assert_eq!(dim, 8);

    let output = port.embed(&ctx, "hello".into()).await?;
    assert_eq!(output.dense.as_slice().len(), 8);

    let outputs = port
        .embed_batch(
            &ctx,
            EmbedBatchRequest::from(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
        )
        .await?;
    assert_eq!(outputs.len(), 3);

    Ok(())
}

#[tokio::test]
async fn vectordb_port_contract_smoke() -> Result<()> {
    let ctx = RequestContext::new_request();
    let provider = VectorDbProviderInfo {
        id: VectorDbProviderId::new("local"),
        name: "local".into(),
    };
    let port = InMemoryVectorDbFixed::<4>::new(provider);

    let collection = CollectionName::new("code_chunks_contract")?;
    port.create_collection(&ctx, collection.clone(), 4).await?;

    port.insert(
        &ctx,
        collection.clone(),
        vec![
            VectorDocumentForInsert {
                chunk: sample_chunk("chunk_a", vec![1.0, 0.0, 0.0, 0.0])?,
            },
            VectorDocumentForInsert {
                chunk: sample_chunk("chunk_b", vec![0.0, 1.0, 0.0, 0.0])?,
            },
        ],
    )
    .await?;

    let results = port
        .search(
            &ctx,
            VectorSearchRequest {
                collection_name: collection,
                query_vector: Arc::from(vec![1.0, 0.0, 0.0, 0.0]),
                options: VectorSearchOptions {
                    top_k: Some(1),
                    path_prefix: None,
                    threshold: None,
                },
            },
        )
        .await?;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.chunk.path.as_ref(), "chunk_a");
    Ok(())
}

#[test]
fn noop_observability_ports_do_not_panic() {
    let logger = NoopLogger::default();
    let _child = logger.child(Default::default());

    let telemetry = NoopTelemetry::default();
    telemetry.increment_counter("counter", 1, None);
    telemetry.record_timer_ms("timer", 10, None);
    telemetry.start_timer("timer2", None).stop();
}
