//! Vector DB adapter selection and initialization.

use crate::InfraResult;
use codesearch_adapters::vectordb::fixed::FixedDimensionVectorDb;
use codesearch_adapters::vectordb_local::LocalVectorDb;
use codesearch_config::{SnapshotStorageMode, ValidatedBackendConfig};
use codesearch_ports::VectorDbPort;
use codesearch_shared::{ErrorCode, ErrorEnvelope};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Local,
}

/// Build a vector DB port using config settings.
pub async fn build_vectordb_port(
    config: &ValidatedBackendConfig,
    codebase_root: &Path,
    snapshot_storage: SnapshotStorageMode,
) -> InfraResult<Arc<dyn VectorDbPort>> {
    let provider = parse_provider(config.vector_db.provider.as_deref())?;
    match provider {
        ProviderKind::Local => {
            let adapter = LocalVectorDb::new(codebase_root.to_path_buf(), snapshot_storage)?;
            Ok(wrap_vectordb_fixed(config.embedding.dimension, adapter))
        },
    }
}

fn parse_provider(value: Option<&str>) -> InfraResult<ProviderKind> {
    let raw = value.unwrap_or("local").trim();
    let normalized = raw.to_ascii_lowercase();
    match normalized.as_str() {
        "local" => Ok(ProviderKind::Local),
        _ => Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("unsupported vector DB provider: {raw}"),
        )
        .with_metadata("provider", raw.to_string())),
    }
}

const FIXED_VECTOR_DIMENSIONS: &[u32] = &[8, 384, 768, 1024, 1536];

fn wrap_vectordb_fixed<P: VectorDbPort + 'static>(
    dimension: Option<u32>,
    port: P,
) -> Arc<dyn VectorDbPort> {
    let dimension = dimension.filter(|value| FIXED_VECTOR_DIMENSIONS.contains(value));
    match dimension {
        Some(8) => Arc::new(FixedDimensionVectorDb::<P, 8>::new(port)),
        Some(384) => Arc::new(FixedDimensionVectorDb::<P, 384>::new(port)),
        Some(768) => Arc::new(FixedDimensionVectorDb::<P, 768>::new(port)),
        Some(1024) => Arc::new(FixedDimensionVectorDb::<P, 1024>::new(port)),
        Some(1536) => Arc::new(FixedDimensionVectorDb::<P, 1536>::new(port)),
        _ => Arc::new(port),
    }
}
