//! Deterministic embedding adapter used for tests.

use codesearch_ports::{
    DetectDimensionRequest, EmbedBatchRequest, EmbedOutput, EmbedRequest, EmbeddingPort,
    EmbeddingProviderId, EmbeddingProviderInfo, EmbeddingVector,
};
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const TEST_TOKEN_COUNT: usize = 4;

/// Deterministic embedding adapter for local testing.
#[derive(Clone)]
pub struct TestEmbedding {
    provider: EmbeddingProviderInfo,
    dimension: u32,
}

impl TestEmbedding {
    /// Build a deterministic test embedder with a fixed dense and late-interaction width.
    pub fn new(dimension: u32) -> Result<Self> {
        if dimension == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimension must be positive",
            ));
        }
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::new("test"),
            name: "test".into(),
            d_dense: dimension,
            d_late: dimension,
        };
        Ok(Self {
            provider,
            dimension,
        })
    }

    fn dimension_checked(&self) -> Result<u32> {
        if self.dimension == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimension must be positive",
            ));
        }
        Ok(self.dimension)
    }

    fn dimension_usize(&self) -> Result<usize> {
        usize::try_from(self.dimension_checked()?).map_err(|_| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "embedding dimension overflow",
                ErrorClass::NonRetriable,
            )
        })
    }

    fn vector_for(&self, text: &str, salt: u64) -> Result<Vec<f32>> {
        let dimension = self.dimension_usize()?;
        let mut vector = Vec::with_capacity(dimension);
        let mut counter = 0u64;

        while vector.len() < dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(b":");
            hasher.update(salt.to_le_bytes());
            hasher.update(b":");
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest {
                vector.push(f32::from(byte) / 255.0);
                if vector.len() == dimension {
                    break;
                }
            }
            counter = counter.saturating_add(1);
        }

        Ok(vector)
    }

    fn output_for(&self, text: &str) -> Result<EmbedOutput> {
        let dense = self.vector_for(text, 0)?;
        let hidden = dense.len();
        let mut colbert = Vec::with_capacity(hidden * TEST_TOKEN_COUNT);
        for token_idx in 0..TEST_TOKEN_COUNT as u64 {
            colbert.extend(self.vector_for(text, token_idx + 1)?);
        }
        Ok(EmbedOutput {
            dense: EmbeddingVector::new(Arc::from(dense)),
            colbert: Arc::from(colbert),
            d_late: self.dimension,
        })
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
    ) -> codesearch_ports::BoxFuture<'_, Result<u32>> {
        let dimension = self.dimension_checked();
        Box::pin(async move { dimension })
    }

    fn embed(
        &self,
        _ctx: &RequestContext,
        request: EmbedRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<EmbedOutput>> {
        let output = self.output_for(request.text.as_ref());
        Box::pin(async move { output })
    }

    fn embed_batch(
        &self,
        _ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> codesearch_ports::BoxFuture<'_, Result<Vec<EmbedOutput>>> {
        let outputs = request
            .texts
            .iter()
            .map(|text| self.output_for(text.as_ref()))
            .collect::<Result<Vec<_>>>();
        Box::pin(async move { outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::TestEmbedding;
    use codesearch_ports::EmbeddingPort;
    use codesearch_shared::{RequestContext, Result};

    #[tokio::test]
    async fn test_embedder_is_deterministic() -> Result<()> {
        let embedder = TestEmbedding::new(8)?;
        let ctx = RequestContext::new_request();
        let a = embedder.embed(&ctx, "hello".into()).await?;
        let b = embedder.embed(&ctx, "hello".into()).await?;
        assert_eq!(a.dense.vector(), b.dense.vector());
        assert_eq!(a.dense.dimension(), 8);
        assert_eq!(a.colbert.len(), 8 * 4);
        Ok(())
    }
}
