//! Out-of-process embedding worker.
//!
//! One instance of this binary backs one slot in the embedding worker pool
//! ([`codesearch_adapters::embedding::process_pool`]). It speaks the framed
//! protocol in [`codesearch_adapters::embedding::protocol`] over stdin/stdout:
//! the parent sends an `Init` message with model paths, then a stream of
//! `EmbedBatch` requests, each answered with a `Result` (or `Error`) and,
//! for batches that take a while, periodic `Heartbeat`s so the parent's
//! per-task timeout doesn't fire on merely-slow work.
//!
//! Exits 0 on a clean `Shutdown` or stdin EOF, non-zero on a fatal error
//! (e.g. the model failed to load) so the parent's process-exit watcher can
//! tell a crash apart from a graceful exit.

use codesearch_adapters::embedding::onnx::{OnnxEmbedding, OnnxEmbeddingConfig};
use codesearch_adapters::embedding::protocol::{
    EmbedOutputWire, WorkerRequestEnvelope, WorkerRequestPayload, WorkerResponseEnvelope,
    WorkerResponsePayload, read_frame, write_frame,
};
use codesearch_ports::EmbedOutput;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{BufReader, BufWriter, Stdout};

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2_000);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(message) = run().await {
        eprintln!("codesearch-embedding-worker: {message}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = BufWriter::new(tokio::io::stdout());

    let init = match read_frame::<_, WorkerRequestEnvelope>(&mut stdin)
        .await
        .map_err(|error| format!("failed reading init frame: {error}"))?
    {
        Some(envelope) => envelope,
        None => return Ok(()),
    };

    let init_id = init.id;
    let WorkerRequestPayload::Init(init) = init.payload else {
        return Err("first message must be Init".to_owned());
    };

    let config = OnnxEmbeddingConfig {
        model_dir: PathBuf::from(init.model_dir.as_ref()),
        model_filename: init.model_filename,
        tokenizer_filename: init.tokenizer_filename,
        dimension: init.dimension,
        session_pool_size: 1,
    };
    let embedding = Arc::new(
        OnnxEmbedding::new(&config).map_err(|error| format!("failed to load model: {error}"))?,
    );
    let provider = codesearch_ports::EmbeddingPort::provider(embedding.as_ref()).clone();

    write_frame(
        &mut stdout,
        &WorkerResponseEnvelope {
            id: init_id,
            payload: WorkerResponsePayload::Ready {
                d_dense: provider.d_dense,
                d_late: provider.d_late,
            },
        },
    )
    .await
    .map_err(|error| format!("failed writing ready frame: {error}"))?;

    loop {
        let request = read_frame::<_, WorkerRequestEnvelope>(&mut stdin)
            .await
            .map_err(|error| format!("failed reading request frame: {error}"))?;
        let Some(request) = request else {
            return Ok(());
        };

        match request.payload {
            WorkerRequestPayload::Shutdown => return Ok(()),
            WorkerRequestPayload::Init(_) => {
                respond_error(&mut stdout, request.id, "worker already initialized").await?;
            },
            WorkerRequestPayload::EmbedBatch { texts } => {
                handle_embed_batch(&mut stdout, Arc::clone(&embedding), request.id, texts).await?;
            },
        }
    }
}

async fn handle_embed_batch(
    stdout: &mut BufWriter<Stdout>,
    embedding: Arc<OnnxEmbedding>,
    id: u64,
    texts: Vec<Box<str>>,
) -> Result<(), String> {
    let task = tokio::task::spawn_blocking(move || embedding.embed_texts_blocking(&texts));
    tokio::pin!(task);

    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await;

    let result = loop {
        tokio::select! {
            outcome = &mut task => {
                break outcome.map_err(|error| format!("embedding task panicked: {error}"));
            }
            _ = interval.tick() => {
                write_frame(
                    stdout,
                    &WorkerResponseEnvelope { id, payload: WorkerResponsePayload::Heartbeat },
                )
                .await
                .map_err(|error| format!("failed writing heartbeat frame: {error}"))?;
            }
        }
    };

    match result {
        Ok(Ok(outputs)) => {
            let outputs = outputs.into_iter().map(to_wire).collect();
            write_frame(
                stdout,
                &WorkerResponseEnvelope {
                    id,
                    payload: WorkerResponsePayload::Result { outputs },
                },
            )
            .await
            .map_err(|error| format!("failed writing result frame: {error}"))
        },
        Ok(Err(error)) => respond_error(stdout, id, &error.to_string()).await,
        Err(message) => respond_error(stdout, id, &message).await,
    }
}

async fn respond_error(stdout: &mut BufWriter<Stdout>, id: u64, message: &str) -> Result<(), String> {
    write_frame(
        stdout,
        &WorkerResponseEnvelope {
            id,
            payload: WorkerResponsePayload::Error {
                message: message.to_owned(),
            },
        },
    )
    .await
    .map_err(|error| format!("failed writing error frame: {error}"))
}

fn to_wire(output: EmbedOutput) -> EmbedOutputWire {
    EmbedOutputWire {
        dense: output.dense.as_slice().to_vec(),
        colbert: output.colbert.to_vec(),
        d_late: output.d_late,
    }
}

