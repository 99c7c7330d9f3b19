//! Splitter / chunking boundary contract.

use crate::BoxFuture;
use codesearch_domain::{ANCHOR_CHUNK_INDEX, ChunkRole, ChunkType, FileSkeleton, Language, LineSpan};
use codesearch_shared::{RequestContext, Result};

/// A code chunk produced by a splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    /// Chunk content.
    pub content: Box<str>,
    /// Line span (1-indexed).
    pub span: LineSpan,
    /// Optional language hint.
    pub language: Option<Language>,
    /// Optional file path hint.
    pub file_path: Option<Box<str>>,
    /// Ordering within the file; the anchor chunk uses `ANCHOR_CHUNK_INDEX`.
    pub chunk_index: i32,
    /// Whether this is the file's synthetic anchor chunk.
    pub is_anchor: bool,
    /// Structural kind, derived from the syntax node this chunk came from.
    pub chunk_type: ChunkType,
    /// Breadcrumb trail, e.g. `["File: x.ts", "Class: Foo", "Method: bar"]`.
    pub context: Vec<Box<str>>,
    /// Cyclomatic complexity (functions/methods only).
    pub complexity: Option<u32>,
    /// Symbols defined by this chunk.
    pub defined_symbols: Vec<Box<str>>,
    /// Symbols referenced (called) by this chunk.
    pub referenced_symbols: Vec<Box<str>>,
    /// Imports introduced by this chunk (anchor chunks only).
    pub imports: Vec<Box<str>>,
    /// Exports introduced by this chunk (anchor chunks only).
    pub exports: Vec<Box<str>>,
    /// Coarse behavioral role.
    pub role: ChunkRole,
    /// Enclosing class/module name, if any.
    pub parent_symbol: Option<Box<str>>,
    /// Compressed file view; present only on the anchor chunk.
    pub file_skeleton: Option<FileSkeleton>,
}

impl CodeChunk {
    /// Build a plain, unclassified block chunk (the historical shape: a
    /// gap-filling span or sliding-window fallback with no symbol metadata).
    #[must_use]
    pub fn block(
        content: Box<str>,
        span: LineSpan,
        language: Option<Language>,
        file_path: Option<Box<str>>,
        chunk_index: i32,
    ) -> Self {
        Self {
            content,
            span,
            language,
            file_path,
            chunk_index,
            is_anchor: false,
            chunk_type: ChunkType::Block,
            context: Vec::new(),
            complexity: None,
            defined_symbols: Vec::new(),
            referenced_symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            role: ChunkRole::Implementation,
            parent_symbol: None,
            file_skeleton: None,
        }
    }

    /// Build the file's synthetic anchor chunk.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn anchor(
        content: Box<str>,
        span: LineSpan,
        language: Option<Language>,
        file_path: Option<Box<str>>,
        imports: Vec<Box<str>>,
        exports: Vec<Box<str>>,
        file_skeleton: FileSkeleton,
    ) -> Self {
        Self {
            content,
            span,
            language,
            file_path,
            chunk_index: ANCHOR_CHUNK_INDEX,
            is_anchor: true,
            chunk_type: ChunkType::Block,
            context: Vec::new(),
            complexity: None,
            defined_symbols: Vec::new(),
            referenced_symbols: Vec::new(),
            imports,
            exports,
            role: ChunkRole::Definition,
            parent_symbol: None,
            file_skeleton: Some(file_skeleton),
        }
    }
}

/// Options for splitting.
#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    /// Optional file path hint.
    pub file_path: Option<Box<str>>,
}

/// Boundary contract for chunking/splitting content for indexing.
pub trait SplitterPort: Send + Sync {
    /// Split code into chunks using the provided language hint.
    fn split(
        &self,
        ctx: &RequestContext,
        code: Box<str>,
        language: Language,
        options: SplitOptions,
    ) -> BoxFuture<'_, Result<Vec<CodeChunk>>>;

    /// Configure the target chunk size for this splitter instance.
    fn set_chunk_size(&self, chunk_size: usize);

    /// Configure the target overlap between adjacent chunks.
    fn set_chunk_overlap(&self, chunk_overlap: usize);
}
