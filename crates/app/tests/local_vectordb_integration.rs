//! Integration test for local vector DB adapter.

use codesearch_adapters::fs::LocalFileSystem;
use codesearch_adapters::ignore::IgnoreMatcher;
use codesearch_adapters::splitter::TreeSitterSplitter;
use codesearch_adapters::vectordb_local::LocalVectorDb;
use codesearch_app::{
    IndexCodebaseDeps, IndexCodebaseInput, IndexCodebaseStatus, SemanticSearchDeps,
    SemanticSearchInput, index_codebase, semantic_search,
};
use codesearch_config::SnapshotStorageMode;
use codesearch_domain::{EmbeddingProviderId, IndexMode, SearchOptions};
use codesearch_ports::{CollectionName, EmbeddingPort, EmbeddingProviderInfo, VectorDbPort};
use codesearch_shared::{RequestContext, Result};
use codesearch_testkit::in_memory::{InMemoryEmbeddingFixed, NoopLogger, NoopTelemetry};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

#[tokio::test]
async fn index_and_search_with_local_vectordb() -> Result<()> {
    let codebase_root = workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join("local-index")
        .join("basic");

    let embedding: Arc<dyn EmbeddingPort> =
        Arc::new(InMemoryEmbeddingFixed::<8>::new(EmbeddingProviderInfo {
            id: EmbeddingProviderId::new("fixture"),
            name: "fixture".into(),
            d_dense: 8,
            d_late: 4,
        })?);
    let vectordb: Arc<dyn VectorDbPort> = Arc::new(LocalVectorDb::new(
        codebase_root.clone(),
        SnapshotStorageMode::Disabled,
    )?);

    let deps = IndexCodebaseDeps {
        embedding: Arc::clone(&embedding),
        vectordb: Arc::clone(&vectordb),
        splitter: Arc::new(TreeSitterSplitter::default()),
        filesystem: Arc::new(LocalFileSystem::new(None)),
        path_policy: Arc::new(codesearch_adapters::fs::LocalPathPolicy::new()),
        ignore: Arc::new(IgnoreMatcher::new()),
        logger: Some(Arc::new(NoopLogger::default())),
        telemetry: Some(Arc::new(NoopTelemetry::default())),
    };

    let input = IndexCodebaseInput {
        codebase_root: codebase_root.clone(),
        collection_name: CollectionName::new("code_chunks_local")?,
        index_mode: IndexMode::Hybrid,
        supported_extensions: Some(vec![".rs".into()]),
        ignore_patterns: None,
        file_list: None,
        force_reindex: true,
        on_progress: None,
        embedding_batch_size: NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN),
        chunk_limit: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
        max_files: None,
        max_file_size_bytes: None,
        max_buffered_chunks: None,
        max_buffered_embeddings: None,
        max_in_flight_files: Some(NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN)),
        max_in_flight_embedding_batches: Some(NonZeroUsize::MIN),
        max_in_flight_inserts: Some(NonZeroUsize::MIN),
    };

    let ctx = RequestContext::new_request();
    let output = index_codebase(&ctx, &deps, input).await?;
    assert_eq!(output.status, IndexCodebaseStatus::Completed);

    let search_deps = SemanticSearchDeps {
        embedding,
        vectordb,
        logger: None,
        telemetry: None,
    };
    let results = semantic_search(
        &ctx,
        &search_deps,
        SemanticSearchInput {
            codebase_root: codebase_root.display().to_string().into_boxed_str(),
            collection_name: CollectionName::new("code_chunks_local")?,
            query: "local-index".into(),
            options: SearchOptions {
                top_k: 3,
                min_score: Some(0.1),
                path_prefix: None,
                candidate_limit: 50,
                no_rerank: false,
            },
        },
    )
    .await?;

    assert!(!results.is_empty());
    Ok(())
}
