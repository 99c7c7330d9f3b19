//! Phase 02 domain E2E tests.

use codesearch_domain::{
    Chunk, ChunkId, ChunkRole, ChunkSpan, ChunkType, CodebaseId, CollectionName, ContentHash,
    Language, QuantizedColbert, SearchOptions, SearchQuery, SearchResult, SearchResultKey,
    compare_search_results,
};
use std::error::Error;
use std::path::Path;

#[test]
fn phase2_domain_end_to_end() -> Result<(), Box<dyn Error>> {
    let codebase_root = Path::new("/tmp/example-codebase");
    let codebase_id = CodebaseId::derive(codebase_root);
    let codebase_id_again = CodebaseId::derive(codebase_root);
    assert_eq!(codebase_id, codebase_id_again);

    let collection_name = CollectionName::new(format!("code_chunks_{codebase_id}"))?;
    assert!(collection_name.as_str().starts_with("code_chunks_"));

    let span = ChunkSpan::new(0, 2)?;
    let chunk = Chunk {
        id: ChunkId::new_random(),
        path: "src/lib.rs".into(),
        hash: ContentHash::of_bytes(b"fn main() {}\n"),
        content: "fn main() {}\n".into(),
        display_text: "fn main() {}\n".into(),
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
        vector: vec![0.1, 0.2, 0.3, 0.4],
        colbert: QuantizedColbert::quantize(&[0.1, 0.2, 0.3, 0.4], 4),
        pooled_colbert: None,
    };
    assert_eq!(chunk.span.to_line_span()?.start_line(), 1);

    let query = SearchQuery {
        query: "search".into(),
    };
    let options = SearchOptions {
        top_k: 3,
        min_score: Some(0.5_f32),
        path_prefix: None,
        candidate_limit: 50,
        no_rerank: false,
    };
    assert!(!query.query.is_empty());
    assert_eq!(options.top_k, 3);

    let mut results = vec![
        SearchResult {
            key: SearchResultKey {
                path: "b.rs".into(),
                start_line: 5,
            },
            end_line: 7,
            preview: "b".into(),
            language: Some(Language::Rust),
            score: 0.9_f32,
            role: ChunkRole::Implementation,
            defined_symbols: Vec::new(),
            context: Vec::new(),
        },
        SearchResult {
            key: SearchResultKey {
                path: "a.rs".into(),
                start_line: 10,
            },
            end_line: 12,
            preview: "a2".into(),
            language: Some(Language::Rust),
            score: 0.9_f32,
            role: ChunkRole::Implementation,
            defined_symbols: Vec::new(),
            context: Vec::new(),
        },
        SearchResult {
            key: SearchResultKey {
                path: "a.rs".into(),
                start_line: 2,
            },
            end_line: 3,
            preview: "a1".into(),
            language: Some(Language::Rust),
            score: 0.9_f32,
            role: ChunkRole::Implementation,
            defined_symbols: Vec::new(),
            context: Vec::new(),
        },
    ];

    results.sort_by(compare_search_results);

    let ordered: Vec<(&str, u32)> = results
        .iter()
        .map(|result| (result.key.path.as_ref(), result.key.start_line))
        .collect();
    assert_eq!(ordered, vec![("a.rs", 2), ("a.rs", 10), ("b.rs", 5)]);

    Ok(())
}
