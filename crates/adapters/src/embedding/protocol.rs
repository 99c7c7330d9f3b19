//! Framed wire protocol between the pool adapter and `embedding-worker` child processes.
//!
//! Each message is a `u32` big-endian byte length followed by a JSON payload.
//! This is shared (via source inclusion, see `bins/embedding-worker`) rather
//! than a separate crate so the worker binary stays a thin shell around
//! [`crate::embedding::onnx::OnnxEmbedding`].

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default per-task timeout before a worker is considered hung.
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 120_000;
/// Number of times a timed-out/crashed batch is requeued to a fresh worker.
pub const MAX_RETRIES: u32 = 1;
/// Grace period granted to a worker after `Shutdown` before it is SIGKILLed.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

const MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

/// Configuration sent to a worker immediately after it is spawned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInit {
    /// Directory containing tokenizer + ONNX model artifacts.
    pub model_dir: Box<str>,
    /// Optional model filename override.
    pub model_filename: Option<Box<str>>,
    /// Optional tokenizer filename override.
    pub tokenizer_filename: Option<Box<str>>,
    /// Optional expected embedding dimension.
    pub dimension: Option<u32>,
}

/// A message sent from the pool to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerRequestPayload {
    /// First message on a fresh worker: load the model.
    Init(WorkerInit),
    /// Embed a batch of texts.
    EmbedBatch {
        /// Texts to embed, in request order.
        texts: Vec<Box<str>>,
    },
    /// Ask the worker to exit cleanly.
    Shutdown,
}

/// Envelope wrapping a [`WorkerRequestPayload`] with a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequestEnvelope {
    /// Correlates a request with its eventual response.
    pub id: u64,
    /// The request payload.
    pub payload: WorkerRequestPayload,
}

/// Wire form of [`codesearch_ports::EmbedOutput`] (`Arc<[f32]>` isn't directly
/// `Serialize`-friendly across a process boundary, so this carries plain `Vec`s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedOutputWire {
    /// Dense, unit-normalized embedding.
    pub dense: Vec<f32>,
    /// Row-major late-interaction matrix, `token_count * d_late` long.
    pub colbert: Vec<f32>,
    /// Width of each late-interaction row.
    pub d_late: u32,
}

/// A message sent from a worker back to the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerResponsePayload {
    /// The model finished loading and the worker is ready for work.
    Ready {
        /// Detected or configured dense dimension.
        d_dense: u32,
        /// Detected or configured late-interaction dimension.
        d_late: u32,
    },
    /// Emitted periodically while a batch is still being processed, so the
    /// pool can distinguish "slow" from "hung" and reset its deadline.
    Heartbeat,
    /// Successful batch result, in request order.
    Result {
        /// One output per input text.
        outputs: Vec<EmbedOutputWire>,
    },
    /// The worker failed to process the request (non-fatal to the process).
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

/// Envelope wrapping a [`WorkerResponsePayload`] with a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponseEnvelope {
    /// Correlation id matching the originating [`WorkerRequestEnvelope`].
    pub id: u64,
    /// The response payload.
    pub payload: WorkerResponsePayload,
}

/// Write a length-prefixed JSON frame: `u32` big-endian length then the body.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Read one length-prefixed JSON frame. Returns `Ok(None)` on a clean EOF
/// between frames (the peer closed its write half).
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {},
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let value = serde_json::from_slice(&body)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    Ok(Some(value))
}
