//! Out-of-process embedding worker pool (SPEC_FULL §4.5).
//!
//! Each worker slot is a long-lived `codesearch-embedding-worker` child
//! process speaking the framed protocol in [`crate::embedding::protocol`]
//! over its stdin/stdout. A dedicated actor task owns each slot: it spawns
//! the child, hands it one batch at a time, and resets a per-task deadline
//! every time the child reports a [`WorkerResponsePayload::Heartbeat`]. A
//! worker that goes quiet past `task_timeout`, or whose process exits
//! mid-task, is killed and respawned; the batch that was in flight is
//! requeued onto a different slot once (`MAX_RETRIES`) before the caller
//! sees an error. Process-per-worker is mandatory here: unlike
//! [`crate::embedding::onnx::OnnxEmbedding`], which runs ONNX sessions
//! in-process, this adapter never touches the model directly — it only
//! speaks the wire protocol to children it supervises.

use crate::embedding::protocol::{
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_TASK_TIMEOUT_MS, EmbedOutputWire, MAX_RETRIES,
    WorkerInit, WorkerRequestEnvelope, WorkerRequestPayload, WorkerResponseEnvelope,
    WorkerResponsePayload, read_frame, write_frame,
};
use codesearch_ports::{
    BoxFuture, DetectDimensionRequest, EmbedBatchRequest, EmbedOutput, EmbedRequest,
    EmbeddingPort, EmbeddingProviderId, EmbeddingProviderInfo, EmbeddingVector,
};
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

/// Configuration for the out-of-process embedding worker pool.
#[derive(Debug, Clone)]
pub struct ProcessPoolConfig {
    /// Path to the `codesearch-embedding-worker` binary.
    pub worker_binary: PathBuf,
    /// Number of worker processes to keep alive.
    pub worker_count: usize,
    /// Directory containing tokenizer + ONNX model artifacts.
    pub model_dir: PathBuf,
    /// Optional model filename override.
    pub model_filename: Option<Box<str>>,
    /// Optional tokenizer filename override.
    pub tokenizer_filename: Option<Box<str>>,
    /// Optional expected embedding dimension.
    pub dimension: Option<u32>,
    /// How long a worker may go without a heartbeat before it's considered hung.
    pub task_timeout: Duration,
    /// Grace period for a worker to exit after `Shutdown` before SIGKILL.
    pub shutdown_grace: Duration,
}

impl ProcessPoolConfig {
    /// Build a config with the pool's documented defaults for timeout and
    /// shutdown grace.
    #[must_use]
    pub fn new(worker_binary: PathBuf, worker_count: usize, model_dir: PathBuf) -> Self {
        Self {
            worker_binary,
            worker_count: worker_count.max(1),
            model_dir,
            model_filename: None,
            tokenizer_filename: None,
            dimension: None,
            task_timeout: Duration::from_millis(DEFAULT_TASK_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }

    fn init_message(&self) -> WorkerInit {
        WorkerInit {
            model_dir: self.model_dir.to_string_lossy().into_owned().into_boxed_str(),
            model_filename: self.model_filename.clone(),
            tokenizer_filename: self.tokenizer_filename.clone(),
            dimension: self.dimension,
        }
    }
}

struct EmbedWorkItem {
    texts: Vec<Box<str>>,
    respond: oneshot::Sender<Result<Vec<EmbedOutput>>>,
}

/// A process-per-worker embedding adapter.
pub struct ProcessPoolEmbedding {
    provider: EmbeddingProviderInfo,
    slots: Vec<mpsc::UnboundedSender<EmbedWorkItem>>,
    next_slot: AtomicUsize,
}

impl ProcessPoolEmbedding {
    /// Spawn the worker pool: one bootstrap child to learn the provider's
    /// dense/late dimensions, then `worker_count` long-lived slot actors.
    pub async fn spawn(config: ProcessPoolConfig) -> Result<Self> {
        let provider = detect_provider(&config).await?;

        let mut slots = Vec::with_capacity(config.worker_count);
        for slot_id in 0..config.worker_count {
            let (tx, rx) = mpsc::unbounded_channel();
            let config = config.clone();
            tokio::spawn(run_slot(slot_id, config, rx));
            slots.push(tx);
        }

        Ok(Self {
            provider,
            slots,
            next_slot: AtomicUsize::new(0),
        })
    }

    fn pick_slot(&self, skip: Option<usize>) -> usize {
        let start = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        if self.slots.len() <= 1 {
            return start;
        }
        match skip {
            Some(skip) if skip == start => (start + 1) % self.slots.len(),
            _ => start,
        }
    }

    async fn dispatch(&self, texts: Vec<Box<str>>) -> Result<Vec<EmbedOutput>> {
        let mut last_error = None;
        let mut used_slot = None;
        for _ in 0..=MAX_RETRIES {
            let slot = self.pick_slot(used_slot);
            used_slot = Some(slot);
            let (tx, rx) = oneshot::channel();
            let Some(sender) = self.slots.get(slot) else {
                return Err(pool_error("embedding worker pool has no slots"));
            };
            if sender
                .send(EmbedWorkItem {
                    texts: texts.clone(),
                    respond: tx,
                })
                .is_err()
            {
                last_error = Some(pool_error("embedding worker slot actor has shut down"));
                continue;
            }
            match rx.await {
                Ok(result) => match result {
                    Ok(outputs) => return Ok(outputs),
                    Err(error) => last_error = Some(error),
                },
                Err(_) => last_error = Some(pool_error("embedding worker slot dropped the request")),
            }
        }
        Err(last_error.unwrap_or_else(|| pool_error("embedding batch failed with no diagnostics")))
    }
}

impl EmbeddingPort for ProcessPoolEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(
        &self,
        ctx: &RequestContext,
        _request: DetectDimensionRequest,
    ) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        let dimension = self.provider.d_dense;
        Box::pin(async move {
            ctx.ensure_not_cancelled("process_pool_embedding.detect_dimension")?;
            Ok(dimension)
        })
    }

    fn embed(
        &self,
        ctx: &RequestContext,
        request: EmbedRequest,
    ) -> BoxFuture<'_, Result<EmbedOutput>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("process_pool_embedding.embed")?;
            let outputs = self.dispatch(vec![request.text]).await?;
            outputs.into_iter().next().ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "missing embedding worker output",
                    ErrorClass::NonRetriable,
                )
            })
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbedOutput>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("process_pool_embedding.embed_batch")?;
            self.dispatch(request.texts).await
        })
    }
}

fn pool_error(message: impl Into<String>) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "process_pool_failed"),
        message,
        ErrorClass::Retriable,
    )
}

async fn detect_provider(config: &ProcessPoolConfig) -> Result<EmbeddingProviderInfo> {
    let mut handle = spawn_and_init(config).await?;
    let ready = recv_ready(&mut handle).await;
    shutdown_child(&mut handle, config.shutdown_grace).await;
    let (d_dense, d_late) = ready?;
    Ok(EmbeddingProviderInfo {
        id: EmbeddingProviderId::new("onnx-process-pool"),
        name: "ONNX (process pool)".into(),
        d_dense,
        d_late,
    })
}

struct WorkerHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_request_id: u64,
}

impl WorkerHandle {
    fn next_id(&mut self) -> u64 {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.next_request_id
    }
}

async fn spawn_and_init(config: &ProcessPoolConfig) -> Result<WorkerHandle> {
    let mut child = Command::new(&config.worker_binary)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "worker_spawn_failed"),
                format!("failed to spawn embedding worker: {error}"),
                ErrorClass::Retriable,
            )
        })?;

    let stdin = child.stdin.take().ok_or_else(|| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            "embedding worker missing stdin handle",
            ErrorClass::NonRetriable,
        )
    })?;
    let stdout = child.stdout.take().ok_or_else(|| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            "embedding worker missing stdout handle",
            ErrorClass::NonRetriable,
        )
    })?;

    let mut handle = WorkerHandle {
        child,
        stdin,
        stdout: BufReader::new(stdout),
        next_request_id: 0,
    };

    let id = handle.next_id();
    write_frame(
        &mut handle.stdin,
        &WorkerRequestEnvelope {
            id,
            payload: WorkerRequestPayload::Init(config.init_message()),
        },
    )
    .await
    .map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "worker_init_failed"),
            format!("failed writing init frame to embedding worker: {error}"),
            ErrorClass::Retriable,
        )
    })?;

    Ok(handle)
}

async fn recv_ready(handle: &mut WorkerHandle) -> Result<(u32, u32)> {
    let frame = read_frame::<_, WorkerResponseEnvelope>(&mut handle.stdout)
        .await
        .map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "worker_init_failed"),
                format!("failed reading ready frame from embedding worker: {error}"),
                ErrorClass::Retriable,
            )
        })?;
    match frame {
        Some(envelope) => match envelope.payload {
            WorkerResponsePayload::Ready { d_dense, d_late } => Ok((d_dense, d_late)),
            _ => Err(pool_error("embedding worker sent an unexpected first message")),
        },
        None => Err(pool_error("embedding worker exited before becoming ready")),
    }
}

async fn shutdown_child(handle: &mut WorkerHandle, grace: Duration) {
    let _ = write_frame(
        &mut handle.stdin,
        &WorkerRequestEnvelope {
            id: handle.next_id(),
            payload: WorkerRequestPayload::Shutdown,
        },
    )
    .await;
    let _ = handle.stdin.shutdown().await;
    request_terminate(&handle.child).await;
    if tokio::time::timeout(grace, handle.child.wait()).await.is_err() {
        let _ = handle.child.start_kill();
        let _ = handle.child.wait().await;
    }
}

#[cfg(unix)]
async fn request_terminate(child: &Child) {
    // SIGTERM first via the `kill` CLI; `shutdown_child` escalates to
    // SIGKILL through `Child::start_kill` after the grace period.
    if let Some(pid) = child.id() {
        let _ = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

#[cfg(not(unix))]
async fn request_terminate(_child: &Child) {}

async fn run_slot(
    slot_id: usize,
    config: ProcessPoolConfig,
    mut inbox: mpsc::UnboundedReceiver<EmbedWorkItem>,
) {
    'spawn: loop {
        let mut handle = match spawn_and_init(&config).await {
            Ok(handle) => handle,
            Err(error) => {
                eprintln!("embedding worker slot {slot_id}: spawn failed: {error}");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue 'spawn;
            },
        };

        if let Err(error) = recv_ready(&mut handle).await {
            eprintln!("embedding worker slot {slot_id}: init failed: {error}");
            shutdown_child(&mut handle, config.shutdown_grace).await;
            tokio::time::sleep(Duration::from_millis(500)).await;
            continue 'spawn;
        }

        loop {
            let Some(item) = inbox.recv().await else {
                shutdown_child(&mut handle, config.shutdown_grace).await;
                return;
            };

            match process_one(&mut handle, &config, &item.texts).await {
                Ok(outputs) => {
                    let _ = item.respond.send(Ok(outputs));
                },
                Err(error) => {
                    let fatal = error.is_fatal;
                    let _ = item.respond.send(Err(error.envelope));
                    if fatal {
                        eprintln!(
                            "embedding worker slot {slot_id}: worker hung or crashed, respawning"
                        );
                        let _ = handle.child.start_kill();
                        let _ = handle.child.wait().await;
                        continue 'spawn;
                    }
                },
            }
        }
    }
}

struct SlotError {
    envelope: ErrorEnvelope,
    is_fatal: bool,
}

async fn process_one(
    handle: &mut WorkerHandle,
    config: &ProcessPoolConfig,
    texts: &[Box<str>],
) -> std::result::Result<Vec<EmbedOutput>, SlotError> {
    let id = handle.next_id();
    write_frame(
        &mut handle.stdin,
        &WorkerRequestEnvelope {
            id,
            payload: WorkerRequestPayload::EmbedBatch {
                texts: texts.to_vec(),
            },
        },
    )
    .await
    .map_err(|error| SlotError {
        envelope: pool_error(format!("failed writing batch to embedding worker: {error}")),
        is_fatal: true,
    })?;

    loop {
        let frame = tokio::time::timeout(config.task_timeout, read_frame::<_, WorkerResponseEnvelope>(&mut handle.stdout)).await;
        let frame = match frame {
            Ok(Ok(frame)) => frame,
            Ok(Err(error)) => {
                return Err(SlotError {
                    envelope: pool_error(format!("failed reading from embedding worker: {error}")),
                    is_fatal: true,
                });
            },
            Err(_) => {
                return Err(SlotError {
                    envelope: ErrorEnvelope::expected_with_class(
                        ErrorCode::timeout(),
                        "embedding worker timed out without a heartbeat",
                        ErrorClass::Retriable,
                    ),
                    is_fatal: true,
                });
            },
        };

        match frame {
            Some(envelope) if envelope.id == id => match envelope.payload {
                WorkerResponsePayload::Heartbeat => continue,
                WorkerResponsePayload::Result { outputs } => {
                    return Ok(outputs.into_iter().map(from_wire).collect());
                },
                WorkerResponsePayload::Error { message } => {
                    return Err(SlotError {
                        envelope: pool_error(format!("embedding worker reported an error: {message}")),
                        is_fatal: false,
                    });
                },
                WorkerResponsePayload::Ready { .. } => continue,
            },
            Some(_) => continue,
            None => {
                return Err(SlotError {
                    envelope: pool_error("embedding worker exited mid-batch"),
                    is_fatal: true,
                });
            },
        }
    }
}

fn from_wire(output: EmbedOutputWire) -> EmbedOutput {
    EmbedOutput {
        dense: EmbeddingVector::from_vec(output.dense),
        colbert: Arc::<[f32]>::from(output.colbert),
        d_late: output.d_late,
    }
}
