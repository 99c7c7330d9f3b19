//! Embedding adapter selection and local fallback wiring.

use crate::InfraResult;
use codesearch_adapters::cache::{
    CachingEmbedding, DiskCacheProvider, EmbeddingCache, EmbeddingCacheConfig,
};
use codesearch_adapters::embedding::fixed::FixedDimensionEmbedding;
use codesearch_adapters::embedding::process_pool::{ProcessPoolConfig, ProcessPoolEmbedding};
use codesearch_adapters::embedding_test::TestEmbedding;
use codesearch_config::{
    BackendEnv, EmbeddingCacheDiskProvider, EmbeddingRoutingMode, ValidatedBackendConfig,
};
use codesearch_ports::{EmbeddingPort, TelemetryPort};
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RetryPolicy};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

const DEFAULT_TEST_EMBEDDING_DIMENSION: u32 = 8;
const FIXED_EMBEDDING_DIMENSIONS: &[u32] =
    &[DEFAULT_TEST_EMBEDDING_DIMENSION, 384, 768, 1024, 1536];
const DEFAULT_ONNX_REPO: &str = "Xenova/all-MiniLM-L6-v2";
const CONTEXT_DIR: &str = ".context";
const MODELS_DIR: &str = "models";
const ONNX_MODELS_DIR: &str = "onnx";
const ONNX_CACHE_DIR: &str = "onnx-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Auto,
    Test,
    Onnx,
}

/// Build an embedding port using config and env overrides.
pub fn build_embedding_port(
    config: &ValidatedBackendConfig,
    env: &BackendEnv,
    codebase_root: &Path,
) -> InfraResult<Arc<dyn EmbeddingPort>> {
    build_embedding_port_with_telemetry(config, env, codebase_root, None)
}

/// Build an embedding port and attach telemetry hooks when provided.
pub fn build_embedding_port_with_telemetry(
    config: &ValidatedBackendConfig,
    env: &BackendEnv,
    codebase_root: &Path,
    telemetry: Option<Arc<dyn TelemetryPort>>,
) -> InfraResult<Arc<dyn EmbeddingPort>> {
    let provider = parse_provider(config.embedding.provider.as_deref())?;
    let allow_test_fallback = env.embedding_test_fallback.unwrap_or(false);

    if let Some(mode) = config.embedding.routing.mode
        && mode != EmbeddingRoutingMode::LocalFirst
    {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!(
                "embedding routing mode {mode} requires a remote provider, which this build does not support"
            ),
        ));
    }

    let port: Arc<dyn EmbeddingPort> = match provider {
        ProviderKind::Test => wrap_embedding_fixed(
            Some(embed_dimension(config)),
            TestEmbedding::new(embed_dimension(config))?,
        ),
        ProviderKind::Onnx | ProviderKind::Auto => {
            build_onnx(config, codebase_root, allow_test_fallback)?
        },
    };

    wrap_with_resilience(port, config, codebase_root, telemetry)
}

fn wrap_with_resilience(
    port: Arc<dyn EmbeddingPort>,
    config: &ValidatedBackendConfig,
    codebase_root: &Path,
    telemetry: Option<Arc<dyn TelemetryPort>>,
) -> InfraResult<Arc<dyn EmbeddingPort>> {
    let cache_namespace = build_cache_namespace(&port, config);
    let cache_config = build_cache_config(config, codebase_root)?;
    let cache = EmbeddingCache::new(&cache_config)?;
    let retry_policy = RetryPolicy {
        max_attempts: config.core.retry.max_attempts,
        base_delay_ms: config.core.retry.base_delay_ms,
        max_delay_ms: config.core.retry.max_delay_ms,
        jitter_ratio_pct: config.core.retry.jitter_ratio_pct,
    };
    let timeout_ms = config.embedding.timeout_ms;
    let max_in_flight = config
        .core
        .max_in_flight_embedding_batches
        .and_then(|value| usize::try_from(value).ok());

    Ok(Arc::new(CachingEmbedding::new(
        port,
        cache,
        cache_namespace,
        retry_policy,
        timeout_ms,
        max_in_flight,
        telemetry,
    )))
}

fn build_cache_namespace(
    port: &Arc<dyn EmbeddingPort>,
    config: &ValidatedBackendConfig,
) -> Box<str> {
    let provider = port.provider().id.as_str();
    let model = config.embedding.model.as_deref().unwrap_or("");
    let base_url = config.embedding.base_url.as_deref().unwrap_or("");
    let dimension = config.embedding.dimension.unwrap_or(0);

    format!("provider={provider};model={model};base_url={base_url};dimension={dimension}")
        .into_boxed_str()
}

fn build_cache_config(
    config: &ValidatedBackendConfig,
    codebase_root: &Path,
) -> InfraResult<EmbeddingCacheConfig> {
    let cache_config = &config.embedding.cache;
    let disk_provider = map_disk_provider(cache_config.disk_provider);
    let disk_path = if cache_config.disk_enabled && disk_provider == DiskCacheProvider::Sqlite {
        Some(
            cache_config
                .disk_path
                .as_deref()
                .map_or_else(|| default_cache_path(codebase_root), PathBuf::from),
        )
    } else {
        None
    };

    let max_entries = usize::try_from(cache_config.max_entries).map_err(|_| {
        ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "embedding cache maxEntries is too large",
        )
    })?;

    Ok(EmbeddingCacheConfig {
        enabled: cache_config.enabled,
        max_entries,
        max_bytes: cache_config.max_bytes,
        disk_enabled: cache_config.disk_enabled,
        disk_provider,
        disk_path,
        disk_connection: cache_config.disk_connection.clone(),
        disk_table: cache_config.disk_table.clone(),
        disk_max_bytes: Some(cache_config.disk_max_bytes),
    })
}

fn map_disk_provider(provider: Option<EmbeddingCacheDiskProvider>) -> DiskCacheProvider {
    match provider.unwrap_or(EmbeddingCacheDiskProvider::Sqlite) {
        EmbeddingCacheDiskProvider::Sqlite => DiskCacheProvider::Sqlite,
        EmbeddingCacheDiskProvider::Postgres => DiskCacheProvider::Postgres,
        EmbeddingCacheDiskProvider::Mysql => DiskCacheProvider::Mysql,
        EmbeddingCacheDiskProvider::Mssql => DiskCacheProvider::Mssql,
    }
}

fn default_cache_path(codebase_root: &Path) -> PathBuf {
    codebase_root
        .join(CONTEXT_DIR)
        .join("cache")
        .join("embeddings")
        .join("cache.db")
}

fn build_onnx(
    config: &ValidatedBackendConfig,
    codebase_root: &Path,
    allow_test_fallback: bool,
) -> InfraResult<Arc<dyn EmbeddingPort>> {
    match try_build_onnx(config, codebase_root) {
        Ok(Some(local)) => Ok(local),
        Ok(None) => fallback_or_missing(config, allow_test_fallback),
        Err(error) if allow_test_fallback && is_onnx_assets_missing(&error) => {
            Ok(wrap_embedding_fixed(
                Some(embed_dimension(config)),
                TestEmbedding::new(embed_dimension(config))?,
            ))
        },
        Err(error) => Err(error),
    }
}

fn try_build_onnx(
    config: &ValidatedBackendConfig,
    codebase_root: &Path,
) -> InfraResult<Option<Arc<dyn EmbeddingPort>>> {
    let (preferred_dir, legacy_dir) = resolve_onnx_model_dirs(codebase_root, &config.embedding);
    let model_filename = config.embedding.onnx.model_filename.as_deref();
    let tokenizer_filename = config.embedding.onnx.tokenizer_filename.as_deref();
    let mut model_dir = preferred_dir.clone();

    if !onnx_assets_present(&model_dir, model_filename, tokenizer_filename)
        && let Some(legacy) = legacy_dir.as_ref()
        && onnx_assets_present(legacy, model_filename, tokenizer_filename)
    {
        model_dir.clone_from(legacy);
    }

    if !onnx_assets_present(&model_dir, model_filename, tokenizer_filename) {
        if !config.embedding.onnx.download_on_missing {
            return Err(onnx_assets_missing_error(
                &model_dir,
                model_filename,
                tokenizer_filename,
            ));
        }
        if model_dir != preferred_dir {
            model_dir.clone_from(&preferred_dir);
        }
        let repo = config
            .embedding
            .onnx
            .repo
            .as_deref()
            .unwrap_or(DEFAULT_ONNX_REPO);
        let warnings = download_onnx_assets(repo, &model_dir)?;
        for warning in warnings {
            eprintln!("warning: {warning}");
        }
    }

    if !onnx_assets_present(&model_dir, model_filename, tokenizer_filename) {
        return Ok(None);
    }

    let worker_count = usize::try_from(config.embedding.onnx.session_pool_size)
        .unwrap_or(1)
        .max(1);
    let dimension = config.embedding.dimension;
    let mut pool_config = ProcessPoolConfig::new(resolve_worker_binary()?, worker_count, model_dir);
    pool_config.model_filename = config.embedding.onnx.model_filename.clone();
    pool_config.tokenizer_filename = config.embedding.onnx.tokenizer_filename.clone();
    pool_config.dimension = dimension;

    Ok(Some(wrap_embedding_fixed(
        dimension,
        spawn_process_pool(pool_config)?,
    )))
}

/// Locate the `codesearch-embedding-worker` binary: first next to the
/// current executable (the layout produced by `cargo build`/install), then
/// on `PATH` as a fallback for unusual deployments.
fn resolve_worker_binary() -> InfraResult<PathBuf> {
    const BINARY_NAME: &str = if cfg!(windows) {
        "codesearch-embedding-worker.exe"
    } else {
        "codesearch-embedding-worker"
    };

    if let Ok(current_exe) = std::env::current_exe()
        && let Some(dir) = current_exe.parent()
    {
        let candidate = dir.join(BINARY_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Ok(PathBuf::from(BINARY_NAME))
}

/// Spawn the out-of-process worker pool. Runs the async spawn sequence on a
/// dedicated current-thread runtime, mirroring how `cli_local::run_async_with_ctx`
/// bridges sync CLI entry points into async work.
fn spawn_process_pool(config: ProcessPoolConfig) -> InfraResult<ProcessPoolEmbedding> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("failed to start embedding worker pool runtime: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
    runtime.block_on(ProcessPoolEmbedding::spawn(config))
}

fn onnx_assets_present(
    model_dir: &Path,
    model_filename: Option<&str>,
    tokenizer_filename: Option<&str>,
) -> bool {
    let model_path = resolve_model_path(model_dir, model_filename);
    let tokenizer_path = resolve_tokenizer_path(model_dir, tokenizer_filename);
    model_path.exists() && tokenizer_path.exists()
}

fn onnx_assets_missing_error(
    model_dir: &Path,
    model_filename: Option<&str>,
    tokenizer_filename: Option<&str>,
) -> ErrorEnvelope {
    let tokenizer_path = resolve_tokenizer_path(model_dir, tokenizer_filename);
    let hint = "Set SCA_EMBEDDING_ONNX_MODEL_DIR or enable embedding.onnx.downloadOnMissing=true.";
    let message = model_filename.map_or_else(
        || {
            let nested = model_dir.join("onnx").join("model.onnx");
            let root = model_dir.join("model.onnx");
            format!(
                "ONNX assets not found. Expected model at {} or {} and tokenizer at {}. {hint}",
                nested.display(),
                root.display(),
                tokenizer_path.display()
            )
        },
        |filename| {
            let model_path = model_dir.join(filename);
            format!(
                "ONNX assets not found. Expected model at {} and tokenizer at {}. {hint}",
                model_path.display(),
                tokenizer_path.display()
            )
        },
    );
    ErrorEnvelope::expected(ErrorCode::new("embedding", "onnx_assets_missing"), message)
        .with_metadata("model_dir", model_dir.to_string_lossy().to_string())
        .with_metadata(
            "tokenizer_path",
            tokenizer_path.to_string_lossy().to_string(),
        )
}

fn resolve_model_path(model_dir: &Path, model_filename: Option<&str>) -> PathBuf {
    if let Some(filename) = model_filename {
        return model_dir.join(filename);
    }
    let nested = model_dir.join("onnx").join("model.onnx");
    if nested.exists() {
        return nested;
    }
    model_dir.join("model.onnx")
}

fn resolve_tokenizer_path(model_dir: &Path, tokenizer_filename: Option<&str>) -> PathBuf {
    let filename = tokenizer_filename.unwrap_or("tokenizer.json");
    model_dir.join(filename)
}

fn resolve_onnx_model_dirs(
    codebase_root: &Path,
    config: &codesearch_config::EmbeddingConfig,
) -> (PathBuf, Option<PathBuf>) {
    if let Some(model_dir) = config.onnx.model_dir.as_deref() {
        let path = PathBuf::from(model_dir);
        if path.is_absolute() {
            return (path, None);
        }
        return (codebase_root.join(path), None);
    }
    let repo = config.onnx.repo.as_deref().unwrap_or(DEFAULT_ONNX_REPO);
    let slug = repo.replace('/', "-");
    let models_root = codebase_root
        .join(CONTEXT_DIR)
        .join(MODELS_DIR)
        .join(ONNX_MODELS_DIR);
    let preferred = models_root.join(&slug);
    let legacy = codebase_root
        .join(CONTEXT_DIR)
        .join(ONNX_CACHE_DIR)
        .join(&slug);
    (preferred, Some(legacy))
}

fn download_onnx_assets(repo: &str, model_dir: &Path) -> InfraResult<Vec<String>> {
    std::fs::create_dir_all(model_dir).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::io(),
            format!("failed to create ONNX cache directory: {error}"),
        )
        .with_metadata("path", model_dir.to_string_lossy().to_string())
    })?;

    let required = ["onnx/model.onnx", "tokenizer.json"];
    let optional = [
        "tokenizer_config.json",
        "config.json",
        "special_tokens_map.json",
        "vocab.txt",
    ];

    for filename in required {
        if let Err(error) = run_hf_download(repo, filename, model_dir) {
            eprintln!(
                "error: required ONNX asset download failed (repo={repo}, file={filename}): {error}"
            );
            return Err(error);
        }
    }
    let mut warnings = Vec::new();
    for filename in optional {
        if let Err(error) = run_hf_download(repo, filename, model_dir) {
            warnings.push(format!(
                "optional ONNX asset download failed (repo={repo}, file={filename}): {error}"
            ));
        }
    }

    Ok(warnings)
}

fn run_hf_download(repo: &str, filename: &str, model_dir: &Path) -> InfraResult<()> {
    match run_hf_command("hf", repo, filename, model_dir) {
        Ok(()) => Ok(()),
        Err(error) => {
            if error.kind == std::io::ErrorKind::NotFound {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "hf CLI is required for local ONNX downloads. Install `hf`.",
                )
                .with_metadata("cli", "hf")
                .with_metadata("repo", repo.to_string())
                .with_metadata("file", filename.to_string()));
            }
            Err(error.into())
        },
    }
}

fn run_hf_command(
    cli_name: &str,
    repo: &str,
    filename: &str,
    model_dir: &Path,
) -> Result<(), HfCommandError> {
    let output = Command::new(cli_name)
        .arg("download")
        .arg(repo)
        .arg(filename)
        .arg("--local-dir")
        .arg(model_dir)
        .output()
        .map_err(|error| HfCommandError {
            kind: error.kind(),
            message: format!("failed to run {cli_name}: {error}"),
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(HfCommandError {
        kind: std::io::ErrorKind::Other,
        message: format!("{cli_name} download failed for {repo}/{filename}: {stderr}"),
    })
}

#[derive(Debug)]
struct HfCommandError {
    kind: std::io::ErrorKind,
    message: String,
}

impl From<HfCommandError> for ErrorEnvelope {
    fn from(error: HfCommandError) -> Self {
        Self::unexpected(
            ErrorCode::new("embedding", "onnx_download_failed"),
            error.message,
            ErrorClass::NonRetriable,
        )
    }
}

fn parse_provider(value: Option<&str>) -> InfraResult<ProviderKind> {
    let raw = value.unwrap_or("auto").trim();
    let normalized = raw.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" => Ok(ProviderKind::Auto),
        "test" => Ok(ProviderKind::Test),
        "onnx" | "local" => Ok(ProviderKind::Onnx),
        _ => Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!(
                "unsupported embedding provider: {raw} (only `onnx`/`local` and `test` are supported)"
            ),
        )
        .with_metadata("provider", raw.to_string())),
    }
}

fn missing_provider_error() -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::invalid_input(),
        "embedding provider onnx is not configured",
    )
}

fn is_onnx_assets_missing(error: &ErrorEnvelope) -> bool {
    error.code.namespace() == "embedding" && error.code.code() == "onnx_assets_missing"
}

fn fallback_or_missing(
    config: &ValidatedBackendConfig,
    allow_test_fallback: bool,
) -> InfraResult<Arc<dyn EmbeddingPort>> {
    if allow_test_fallback {
        return Ok(wrap_embedding_fixed(
            Some(embed_dimension(config)),
            TestEmbedding::new(embed_dimension(config))?,
        ));
    }
    Err(missing_provider_error())
}

fn embed_dimension(config: &ValidatedBackendConfig) -> u32 {
    config
        .embedding
        .dimension
        .unwrap_or(DEFAULT_TEST_EMBEDDING_DIMENSION)
}

fn wrap_embedding_fixed<P: EmbeddingPort + 'static>(
    dimension: Option<u32>,
    port: P,
) -> Arc<dyn EmbeddingPort> {
    let dimension = dimension.filter(|value| FIXED_EMBEDDING_DIMENSIONS.contains(value));
    match dimension {
        Some(8) => Arc::new(FixedDimensionEmbedding::<P, 8>::new(port)),
        Some(384) => Arc::new(FixedDimensionEmbedding::<P, 384>::new(port)),
        Some(768) => Arc::new(FixedDimensionEmbedding::<P, 768>::new(port)),
        Some(1024) => Arc::new(FixedDimensionEmbedding::<P, 1024>::new(port)),
        Some(1536) => Arc::new(FixedDimensionEmbedding::<P, 1536>::new(port)),
        _ => Arc::new(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesearch_ports::DetectDimensionOptions;
    use codesearch_shared::RequestContext;

    #[tokio::test]
    async fn fixed_embedding_wrapper_reports_expected_dimension() -> InfraResult<()> {
        let ctx = RequestContext::new_request();
        let inner = TestEmbedding::new(768)?;
        let port = wrap_embedding_fixed(Some(768), inner);
        let dimension = port
            .detect_dimension(&ctx, DetectDimensionOptions::default().into())
            .await?;
        assert_eq!(dimension, 768);
        Ok(())
    }

    #[tokio::test]
    async fn fixed_embedding_wrapper_skips_unknown_dimension() -> InfraResult<()> {
        let ctx = RequestContext::new_request();
        let inner = TestEmbedding::new(777)?;
        let port = wrap_embedding_fixed(Some(777), inner);
        let dimension = port
            .detect_dimension(&ctx, DetectDimensionOptions::default().into())
            .await?;
        assert_eq!(dimension, 777);
        Ok(())
    }

    #[test]
    fn parse_provider_rejects_remote_names() {
        assert!(parse_provider(Some("openai")).is_err());
        assert!(parse_provider(Some("gemini")).is_err());
    }
}
