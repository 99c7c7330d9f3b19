//! Integration coverage for chunk, search, and state domain types.

use codesearch_domain::{
    Chunk, ChunkId, ChunkRole, ChunkSpan, ChunkType, ContentHash, IndexStatus, Language,
    ProgressEvent, QuantizedColbert, SearchOptions, SearchQuery, SearchResult, SearchResultKey,
};
use codesearch_shared::{ErrorCode, ErrorEnvelope, Result};

fn sample_chunk() -> Result<Chunk> {
    let span = ChunkSpan::new(0, 1).map_err(ErrorEnvelope::from)?;
    Ok(Chunk {
        id: ChunkId::new_random(),
        path: "src/lib.rs".into(),
        hash: ContentHash::of_bytes(b"fn main() {}"),
        content: "fn main() {}".into(),
        display_text: "fn main() {}".into(),
        span,
        chunk_index: 0,
        is_anchor: true,
        chunk_type: ChunkType::Block,
        context_prev: None,
        context_next: None,
        context: Vec::new(),
        complexity: None,
        defined_symbols: vec!["main".into()],
        referenced_symbols: Vec::new(),
        imports: Vec::new(),
        exports: Vec::new(),
        role: ChunkRole::Implementation,
        parent_symbol: None,
        file_skeleton: None,
        vector: vec![1.0, 0.0, 0.0, 0.0],
        colbert: QuantizedColbert::quantize(&[0.1, 0.2, 0.3, 0.4], 4),
        pooled_colbert: None,
    })
}

#[test]
fn chunk_composes_with_search_query_and_options() -> Result<()> {
    let chunk = sample_chunk()?;

    let query = SearchQuery {
        query: "semantic search".into(),
    };
    let options = SearchOptions {
        top_k: 5,
        min_score: Some(0.5),
        path_prefix: Some("src/".into()),
        candidate_limit: 50,
        no_rerank: false,
    };

    let result = SearchResult {
        key: SearchResultKey {
            path: chunk.path.clone(),
            start_line: chunk.span.start_line(),
        },
        end_line: chunk.span.end_line(),
        preview: chunk.display_text.clone(),
        language: Some(Language::Rust),
        score: 0.9,
        role: chunk.role,
        defined_symbols: chunk.defined_symbols.clone(),
        context: chunk.context.clone(),
    };

    assert_eq!(query.query.as_ref(), "semantic search");
    assert_eq!(options.top_k, 5);
    assert_eq!(result.key.path.as_ref(), "src/lib.rs");
    assert_eq!(result.defined_symbols, vec![Box::<str>::from("main")]);
    Ok(())
}

#[test]
fn progress_event_and_index_status_round_trip_through_json() -> Result<()> {
    let status = IndexStatus::Failed {
        error: ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad input"),
    };
    let event = ProgressEvent::status(status);

    let value = serde_json::to_value(&event).map_err(|error| {
        ErrorEnvelope::expected(ErrorCode::internal(), error.to_string())
    })?;
    let expected = serde_json::json!({
        "type": "status",
        "status": {
            "status": "failed",
            "error": {
                "kind": "Expected",
                "class": "NonRetriable",
                "code": { "namespace": "core", "code": "invalid_input" },
                "message": "bad input"
            }
        }
    });
    assert_eq!(value, expected);
    assert_eq!(event, ProgressEvent::status(IndexStatus::Failed {
        error: ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad input"),
    }));
    Ok(())
}
