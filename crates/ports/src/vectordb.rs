//! Vector store boundary contract.
//!
//! Unlike the upstream hybrid-ANN-service shape this descends from, there is
//! a single local store per codebase and no dense/sparse sub-query split:
//! reciprocal-rank fusion between dense and full-text candidates happens one
//! layer up, in the searcher, so this port only needs dense ANN search plus
//! row lookup/insert/delete. Candidate rows carry their full [`Chunk`]
//! (vector and late-interaction matrix included) because the searcher's
//! MaxSim rerank stage needs them.

use crate::BoxFuture;
use codesearch_domain::Chunk;
use codesearch_shared::{RequestContext, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Stable identifier for a vector store backend implementation (e.g. `hnsw-local`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorDbProviderId(Box<str>);

impl VectorDbProviderId {
    /// Build a provider id from a string-like value.
    #[must_use]
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VectorDbProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDbProviderInfo {
    /// Stable provider identifier.
    pub id: VectorDbProviderId,
    /// Human-readable provider name.
    pub name: Box<str>,
}

pub use codesearch_domain::CollectionName;

/// A chunk row for insert (vector and colbert matrix required).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocumentForInsert {
    /// The chunk to store, including its dense/colbert payloads.
    pub chunk: Chunk,
}

/// A chunk row returned from dense search or a row query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    /// The stored chunk.
    pub chunk: Chunk,
}

/// Options for dense vector search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSearchOptions {
    /// Maximum number of results to return.
    pub top_k: Option<u32>,
    /// Only return rows whose `path` starts with this prefix.
    pub path_prefix: Option<Box<str>>,
    /// Optional score threshold.
    pub threshold: Option<f32>,
}

/// Owned request for dense vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchRequest {
    /// Target collection name.
    pub collection_name: CollectionName,
    /// Dense query vector.
    pub query_vector: Arc<[f32]>,
    /// Search options.
    pub options: VectorSearchOptions,
}

/// Dense vector search result.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    /// Result document.
    pub document: VectorDocument,
    /// Cosine similarity score.
    pub score: f32,
}

/// Options for full-text keyword search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FtsSearchOptions {
    /// Maximum number of results to return.
    pub limit: Option<u32>,
    /// Only return rows whose `path` starts with this prefix.
    pub path_prefix: Option<Box<str>>,
}

/// Owned request for full-text keyword search.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsSearchRequest {
    /// Target collection name.
    pub collection_name: CollectionName,
    /// Keyword query text.
    pub query: Box<str>,
    /// Search options.
    pub options: FtsSearchOptions,
}

/// Full-text keyword search result.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsSearchResult {
    /// Result document.
    pub document: VectorDocument,
    /// Relevance score (summed term frequency of matched query terms).
    pub score: f32,
}

/// Boundary contract for vector storage + retrieval.
pub trait VectorDbPort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &VectorDbProviderInfo;

    /// Create a collection for a codebase.
    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> BoxFuture<'_, Result<()>>;

    /// Drop a collection (best-effort).
    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Return true when the collection exists.
    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<bool>>;

    /// List available collections.
    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>>;

    /// Upsert chunk rows into a collection.
    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Perform a dense vector search.
    fn search(
        &self,
        ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> BoxFuture<'_, Result<Vec<VectorSearchResult>>>;

    /// Delete rows by chunk id.
    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Query rows by path prefix (used by the sync engine to find a file's
    /// existing rows before re-chunking, and by anchor-chunk lookups).
    fn query_by_path_prefix(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<VectorDocument>>>;

    /// Flush any in-memory index state to the on-disk snapshot.
    fn persist(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Build (or refresh) the full-text index on `content`. Idempotent.
    fn create_fts_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Keyword search on `content`.
    fn fts_search(
        &self,
        ctx: &RequestContext,
        request: FtsSearchRequest,
    ) -> BoxFuture<'_, Result<Vec<FtsSearchResult>>>;
}

/// Lending-style vector DB port using GAT futures.
pub trait VectorDbPortLend: Send + Sync {
    /// Future type returned by this port.
    type Future<'a, T>: Future<Output = Result<T>> + Send + 'a
    where
        Self: 'a,
        T: 'a;

    /// Provider info for this implementation.
    fn provider(&self) -> &VectorDbProviderInfo;

    /// Create a collection for a codebase.
    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> Self::Future<'_, ()>;

    /// Drop a collection (best-effort).
    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> Self::Future<'_, ()>;

    /// Return true when the collection exists.
    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> Self::Future<'_, bool>;

    /// List available collections.
    fn list_collections(&self, ctx: &RequestContext) -> Self::Future<'_, Vec<CollectionName>>;

    /// Upsert chunk rows into a collection.
    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> Self::Future<'_, ()>;

    /// Perform a dense vector search.
    fn search(
        &self,
        ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> Self::Future<'_, Vec<VectorSearchResult>>;

    /// Delete rows by chunk id.
    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> Self::Future<'_, ()>;

    /// Query rows by path prefix.
    fn query_by_path_prefix(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> Self::Future<'_, Vec<VectorDocument>>;

    /// Flush any in-memory index state to the on-disk snapshot.
    fn persist(&self, ctx: &RequestContext, collection_name: CollectionName) -> Self::Future<'_, ()>;

    /// Build (or refresh) the full-text index on `content`. Idempotent.
    fn create_fts_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> Self::Future<'_, ()>;

    /// Keyword search on `content`.
    fn fts_search(
        &self,
        ctx: &RequestContext,
        request: FtsSearchRequest,
    ) -> Self::Future<'_, Vec<FtsSearchResult>>;
}

impl<T> VectorDbPortLend for T
where
    T: VectorDbPort + ?Sized,
{
    type Future<'a, U>
        = BoxFuture<'a, Result<U>>
    where
        T: 'a,
        U: 'a;

    fn provider(&self) -> &VectorDbProviderInfo {
        VectorDbPort::provider(self)
    }

    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        dimension: u32,
    ) -> Self::Future<'_, ()> {
        VectorDbPort::create_collection(self, ctx, collection_name, dimension)
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> Self::Future<'_, ()> {
        VectorDbPort::drop_collection(self, ctx, collection_name)
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> Self::Future<'_, bool> {
        VectorDbPort::has_collection(self, ctx, collection_name)
    }

    fn list_collections(&self, ctx: &RequestContext) -> Self::Future<'_, Vec<CollectionName>> {
        VectorDbPort::list_collections(self, ctx)
    }

    fn insert(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        documents: Vec<VectorDocumentForInsert>,
    ) -> Self::Future<'_, ()> {
        VectorDbPort::insert(self, ctx, collection_name, documents)
    }

    fn search(
        &self,
        ctx: &RequestContext,
        request: VectorSearchRequest,
    ) -> Self::Future<'_, Vec<VectorSearchResult>> {
        VectorDbPort::search(self, ctx, request)
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        ids: Vec<Box<str>>,
    ) -> Self::Future<'_, ()> {
        VectorDbPort::delete(self, ctx, collection_name, ids)
    }

    fn query_by_path_prefix(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
        path_prefix: Box<str>,
        limit: Option<u32>,
    ) -> Self::Future<'_, Vec<VectorDocument>> {
        VectorDbPort::query_by_path_prefix(self, ctx, collection_name, path_prefix, limit)
    }

    fn persist(&self, ctx: &RequestContext, collection_name: CollectionName) -> Self::Future<'_, ()> {
        VectorDbPort::persist(self, ctx, collection_name)
    }

    fn create_fts_index(
        &self,
        ctx: &RequestContext,
        collection_name: CollectionName,
    ) -> Self::Future<'_, ()> {
        VectorDbPort::create_fts_index(self, ctx, collection_name)
    }

    fn fts_search(
        &self,
        ctx: &RequestContext,
        request: FtsSearchRequest,
    ) -> Self::Future<'_, Vec<FtsSearchResult>> {
        VectorDbPort::fts_search(self, ctx, request)
    }
}
