//! The atomic indexed unit: [`Chunk`] and its supporting enums.

use crate::primitives::{ChunkId, ContentHash};
use crate::spans::ChunkSpan;
use codesearch_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard upper bound for chunk content length, enforced by the Chunker's
/// char-limit splitting pass rather than here; kept as a sanity ceiling for
/// deserialized rows coming back from the store.
pub const MAX_CHUNK_CHARS: usize = 20_000;

/// Ordering sentinel used by [`Chunk::chunk_index`] for anchor chunks.
pub const ANCHOR_CHUNK_INDEX: i32 = -1;

/// Validation failures for a [`Chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkValidationError {
    /// `path` was empty after trimming.
    EmptyPath,
    /// content length exceeded [`MAX_CHUNK_CHARS`].
    ContentTooLarge {
        /// Observed length.
        length: usize,
    },
    /// dense vector length did not match the store-wide dimension.
    VectorDimensionMismatch {
        /// Observed length.
        observed: usize,
        /// Expected length.
        expected: usize,
    },
}

impl fmt::Display for ChunkValidationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath => formatter.write_str("chunk path must be non-empty"),
            Self::ContentTooLarge { length } => write!(
                formatter,
                "chunk content length {length} exceeds max {MAX_CHUNK_CHARS}"
            ),
            Self::VectorDimensionMismatch { observed, expected } => write!(
                formatter,
                "chunk vector length {observed} does not match expected dimension {expected}"
            ),
        }
    }
}

impl std::error::Error for ChunkValidationError {}

impl From<ChunkValidationError> for ErrorEnvelope {
    fn from(error: ChunkValidationError) -> Self {
        Self::expected(ErrorCode::new("domain", "invalid_chunk"), error.to_string())
    }
}

/// Structural kind of a chunk, derived from the syntax node it was extracted
/// from (or `block` for gap-filling spans and sliding-window fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// A standalone function definition.
    Function,
    /// A method defined on a class/interface/struct.
    Method,
    /// A class (or struct/record) container.
    Class,
    /// An interface or trait definition.
    Interface,
    /// A type alias / type definition.
    TypeAlias,
    /// A gap-filling span (imports, module statements, or fallback text).
    Block,
}

impl ChunkType {
    /// Whether this chunk type is a "container" that may hold member chunks.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Class | Self::Interface)
    }
}

/// Coarse behavioral role of a chunk, derived from complexity and distinct
/// callee count by the Skeletonizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkRole {
    /// High complexity and high fan-out: coordinates other code.
    Orchestration,
    /// Ordinary function/method body.
    Implementation,
    /// Pure declaration with no executable body (types, interfaces, anchors).
    Definition,
}

/// Compressed, signature-preserving view of an entire file. Present only on
/// anchor chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSkeleton {
    /// The rendered skeleton text.
    pub text: Box<str>,
    /// Whether the language had a dedicated skeletonizer, or this is a
    /// diagnostic line-preview fallback.
    pub is_fallback: bool,
}

/// The packed int8 late-interaction ("ColBERT-style") matrix for a chunk,
/// of logical shape `[token_count, d_late]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedColbert {
    /// Row-major packed `i8` values, `token_count * d_late` long.
    #[serde(with = "colbert_bytes")]
    pub packed: Box<[i8]>,
    /// Dequantization scale: `f = i8 * scale / 127`.
    pub scale_bits: u32,
    /// Width of each token row (`d_late`).
    pub d_late: u32,
}

impl QuantizedColbert {
    /// Dequantization scale as `f32`.
    #[must_use]
    pub fn scale(&self) -> f32 {
        f32::from_bits(self.scale_bits)
    }

    /// Number of token rows packed into this matrix.
    #[must_use]
    pub fn token_count(&self) -> usize {
        if self.d_late == 0 {
            0
        } else {
            self.packed.len() / self.d_late as usize
        }
    }

    /// Dequantize back to `f32`, row-major, same shape as the packed matrix.
    #[must_use]
    pub fn dequantize(&self) -> Vec<f32> {
        let scale = self.scale();
        self.packed
            .iter()
            .map(|value| f32::from(*value) * scale / 127.0)
            .collect()
    }

    /// Quantize a row-major `f32` matrix of width `d_late` into packed int8.
    ///
    /// Scale is the per-matrix max absolute value; an all-zero matrix gets a
    /// scale of `1.0` so dequantization never divides by zero.
    #[must_use]
    pub fn quantize(matrix: &[f32], d_late: u32) -> Self {
        let max_abs = matrix.iter().fold(0.0_f32, |acc, value| acc.max(value.abs()));
        let scale = if max_abs > 0.0 { max_abs } else { 1.0 };
        let packed = matrix
            .iter()
            .map(|value| {
                let scaled = (value / scale * 127.0).round();
                scaled.clamp(-127.0, 127.0) as i8
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            packed,
            scale_bits: scale.to_bits(),
            d_late,
        }
    }
}

mod colbert_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg, reason = "serde with-module signature requires &Box<[i8]>")]
    pub fn serialize<S: Serializer>(value: &Box<[i8]>, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes: Vec<u8> = value.iter().map(|signed| *signed as u8).collect();
        bytes.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Box<[i8]>, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Ok(bytes.into_iter().map(|byte| byte as i8).collect())
    }
}

/// The atomic indexed unit: a contiguous slice of a source file plus its
/// dense embedding, late-interaction matrix, and extracted symbol metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Globally unique identifier, assigned at creation time.
    pub id: ChunkId,
    /// Project-relative file path, forward-slash normalized.
    pub path: Box<str>,
    /// SHA-256 of the source file's bytes; identical for every chunk of a
    /// given file revision.
    pub hash: ContentHash,
    /// Text fed to the embedder (breadcrumb header + code).
    pub content: Box<str>,
    /// Richer text for UI rendering; may equal `content`.
    pub display_text: Box<str>,
    /// Inclusive, 0-indexed line span in the source.
    pub span: ChunkSpan,
    /// Ordering within the file; anchor chunks use [`ANCHOR_CHUNK_INDEX`].
    pub chunk_index: i32,
    /// Whether this is the file's synthetic anchor chunk.
    pub is_anchor: bool,
    /// Structural kind.
    pub chunk_type: ChunkType,
    /// Display text of the immediately preceding chunk, for stitching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_prev: Option<Box<str>>,
    /// Display text of the immediately following chunk, for stitching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_next: Option<Box<str>>,
    /// Breadcrumb trail, e.g. `["File: x.ts", "Class: Foo", "Method: bar"]`.
    pub context: Vec<Box<str>>,
    /// Cyclomatic complexity (functions/methods only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    /// Symbols defined by this chunk.
    pub defined_symbols: Vec<Box<str>>,
    /// Symbols referenced (called) by this chunk.
    pub referenced_symbols: Vec<Box<str>>,
    /// Imports introduced by this chunk (anchor chunks only, typically).
    pub imports: Vec<Box<str>>,
    /// Exports introduced by this chunk (anchor chunks only, typically).
    pub exports: Vec<Box<str>>,
    /// Coarse behavioral role.
    pub role: ChunkRole,
    /// Enclosing class/module name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_symbol: Option<Box<str>>,
    /// Compressed file view; present only on anchor chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_skeleton: Option<FileSkeleton>,
    /// Dense embedding, unit-normalized, fixed length `d_dense`.
    pub vector: Vec<f32>,
    /// Packed int8 late-interaction matrix.
    pub colbert: QuantizedColbert,
    /// Mean-pooled, unit-normalized late-interaction vector (coarse prefilter).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pooled_colbert: Option<Vec<f32>>,
}

impl Chunk {
    /// Validate this chunk's own invariants (SPEC_FULL §8 properties 6/7,
    /// restricted to what a single row can check in isolation; cross-row
    /// invariants like anchor uniqueness are checked by [`exactly_one_anchor`]
    /// over a whole file's rows).
    pub fn validate(&self, d_dense: usize) -> Result<(), ChunkValidationError> {
        if self.path.trim().is_empty() {
            return Err(ChunkValidationError::EmptyPath);
        }
        if self.content.len() > MAX_CHUNK_CHARS {
            return Err(ChunkValidationError::ContentTooLarge {
                length: self.content.len(),
            });
        }
        if self.vector.len() != d_dense {
            return Err(ChunkValidationError::VectorDimensionMismatch {
                observed: self.vector.len(),
                expected: d_dense,
            });
        }
        Ok(())
    }
}

/// Validate the anchor-uniqueness invariant across a file's rows (SPEC_FULL
/// §8 property 1).
#[must_use]
pub fn exactly_one_anchor(chunks: &[Chunk]) -> bool {
    chunks.iter().filter(|chunk| chunk.is_anchor).count() == 1
}

/// Validate the hash-agreement invariant across a file's rows (SPEC_FULL §8
/// property 2).
#[must_use]
pub fn all_share_hash(chunks: &[Chunk]) -> bool {
    let Some(first) = chunks.first() else {
        return true;
    };
    chunks.iter().all(|chunk| chunk.hash == first.hash)
}
