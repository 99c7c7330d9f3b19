//! Embedding adapter implementations.

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub mod process_pool;

/// Wire protocol shared with the `codesearch-embedding-worker` binary.
pub mod protocol;

pub mod fixed;
