//! Index a codebase by scanning, splitting, embedding, and inserting chunks.

mod change_detector;
mod embedder;
mod inserter;
mod scanner;
mod splitter;
mod types;

#[cfg(test)]
pub(crate) use change_detector::{delete_file_chunks_by_relative_path, normalize_change_set};
pub(crate) use change_detector::{
    delete_modified_files, delete_removed_files, detect_changes, emit_progress, total_changes,
};
pub use types::{
    EmbedStageStats, IndexCodebaseDeps, IndexCodebaseInput, IndexCodebaseOutput,
    IndexCodebaseStatus, IndexProgress, IndexStageStats, InsertStageStats, ScanStageStats,
    SplitStageStats,
};

use crate::generated::{INDEX_PIPELINE_TRANSITIONS, IndexPipelineState};
use embedder::{drain_one_embedding_batch, flush_pending_batches, schedule_embedding_batch};
use inserter::drain_one_insert_batch;
use scanner::file_extension_of;
use codesearch_domain::{ChunkValidationError, IndexMode, MAX_CHUNK_CHARS};
use codesearch_ports::DetectDimensionOptions;
use codesearch_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use types::{
    FileResult, IndexPipeline, IndexPipelineFsm, IndexRunContext, IndexStageStatsCollector,
    IndexState, IndexWorkerPools, IndexingLimits, PendingChunk, ProgressTracker,
};

struct Prepared;
struct Scanned;
struct Embedded;
struct Inserted;
struct Completed;

impl IndexPipeline<Prepared> {
    const fn new() -> Self {
        Self {
            fsm: IndexPipelineFsm::new(),
            _state: PhantomData,
        }
    }

    fn scanned(self) -> Result<IndexPipeline<Scanned>> {
        self.transition(IndexPipelineState::Scanned)
    }
}

impl IndexPipeline<Scanned> {
    fn embedded(self) -> Result<IndexPipeline<Embedded>> {
        self.transition(IndexPipelineState::Embedded)
    }
}

impl IndexPipeline<Embedded> {
    fn inserted(self) -> Result<IndexPipeline<Inserted>> {
        self.transition(IndexPipelineState::Inserted)
    }
}

impl IndexPipeline<Inserted> {
    fn completed(self) -> Result<IndexPipeline<Completed>> {
        self.transition(IndexPipelineState::Completed)
    }
}

impl<S> IndexPipeline<S> {
    fn transition<T>(self, next: IndexPipelineState) -> Result<IndexPipeline<T>> {
        let mut fsm = self.fsm;
        fsm.transition(next)?;
        Ok(IndexPipeline {
            fsm,
            _state: PhantomData,
        })
    }
}

impl IndexPipelineFsm {
    fn transition(&mut self, next: IndexPipelineState) -> Result<()> {
        if is_allowed_transition(self.state, next) {
            self.state = next;
            return Ok(());
        }
        Err(ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!(
                "invalid index pipeline transition: {} -> {}",
                self.state.as_str(),
                next.as_str()
            ),
            ErrorClass::NonRetriable,
        ))
    }
}

fn is_allowed_transition(from: IndexPipelineState, to: IndexPipelineState) -> bool {
    INDEX_PIPELINE_TRANSITIONS
        .iter()
        .any(|(source, target)| *source == from && *target == to)
}

/// Index a codebase using the provided dependencies and input.
pub async fn index_codebase(
    ctx: &RequestContext,
    deps: &IndexCodebaseDeps,
    input: IndexCodebaseInput,
) -> Result<IndexCodebaseOutput> {
    ctx.ensure_not_cancelled("index_codebase")?;

    let pipeline = IndexPipeline::<Prepared>::new();
    let mut progress = ProgressTracker::new(input.on_progress.clone());
    let stats = Arc::new(IndexStageStatsCollector::new());

    progress.emit("Preparing collection...", 0, 100, Some(0));
    ensure_collection(ctx, deps, &input).await?;

    progress.emit("Scanning files...", 0, 100, Some(5));
    let scan_started = Instant::now();
    let files = scanner::load_index_files(ctx, deps, &input).await?;
    stats.record_scan(
        u64::try_from(files.len()).unwrap_or(u64::MAX),
        scan_started.elapsed(),
    );
    let pipeline = pipeline.scanned()?;

    if files.is_empty() {
        progress.emit("No files to index", 100, 100, Some(100));
        let _pipeline = pipeline.embedded()?.inserted()?.completed()?;
        return Ok(IndexCodebaseOutput {
            indexed_files: 0,
            total_chunks: 0,
            status: IndexCodebaseStatus::Completed,
            stage_stats: stats.snapshot(),
        });
    }

    let limits = IndexingLimits::from_input(&input);
    let pools = IndexWorkerPools::new(ctx, &limits)?;
    let run_ctx = IndexRunContext::new(ctx, deps, &input, &files, &limits, &pools, stats);

    let output = run_indexing(&run_ctx, &mut progress, pipeline).await;

    pools.stop().await;

    let (pipeline, output) = output?;
    let _pipeline = pipeline.completed()?;

    if matches!(input.index_mode, IndexMode::Hybrid) {
        deps.vectordb
            .create_fts_index(ctx, input.collection_name.clone())
            .await?;
    }

    Ok(output)
}

async fn run_indexing(
    ctx: &IndexRunContext<'_>,
    progress: &mut ProgressTracker,
    pipeline: IndexPipeline<Scanned>,
) -> Result<(IndexPipeline<Inserted>, IndexCodebaseOutput)> {
    let mut state = IndexState::new();

    process_files(ctx, &mut state, progress).await?;
    let pipeline = pipeline.embedded()?;
    finalize_batches(ctx, &mut state).await?;
    let pipeline = pipeline.inserted()?;

    Ok((
        pipeline,
        IndexCodebaseOutput {
            indexed_files: state.indexed_files,
            total_chunks: state.total_chunks,
            status: state.status,
            stage_stats: ctx.stats.snapshot(),
        },
    ))
}

async fn process_files<'a>(
    ctx: &IndexRunContext<'a>,
    state: &mut IndexState<'a>,
    progress: &mut ProgressTracker,
) -> Result<()> {
    for file_index in 0..ctx.files.len() {
        ctx.ctx
            .ensure_not_cancelled("index_codebase.process_file")?;

        while state.next_to_submit < ctx.files.len()
            && state.inflight.len() < ctx.limits.prefetch_limit
        {
            splitter::submit_file_task(&ctx.file_tasks, &mut state.inflight, state.next_to_submit)?;
            state.next_to_submit += 1;
        }

        splitter::submit_file_task(&ctx.file_tasks, &mut state.inflight, file_index)?;

        let task = state.inflight.remove(&file_index).ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "missing file task",
                ErrorClass::NonRetriable,
            )
        })?;
        let result = task.await?;

        if state.total_chunks >= ctx.limits.chunk_limit.get() {
            state.status = IndexCodebaseStatus::LimitReached;
            break;
        }

        let FileResult::Ok {
            relative_path,
            language,
            chunks,
        } = result
        else {
            continue;
        };

        for chunk in chunks {
            ctx.ctx.ensure_not_cancelled("index_codebase.chunk_loop")?;

            if state.total_chunks >= ctx.limits.chunk_limit.get() {
                state.status = IndexCodebaseStatus::LimitReached;
                break;
            }

            if chunk.content.len() > MAX_CHUNK_CHARS {
                return Err(ErrorEnvelope::from(ChunkValidationError::ContentTooLarge {
                    length: chunk.content.len(),
                }));
            }
            state.batch.pending.push(PendingChunk::from_code_chunk(
                chunk,
                relative_path.clone(),
                language,
                file_extension_of(relative_path.as_ref()),
            ));
            state.total_chunks += 1;

            if state.batch.pending.len() >= ctx.limits.embedding_batch_size.get() {
                flush_pending_batches(&ctx.batch, &mut state.batch).await?;
            }
        }

        if state.status == IndexCodebaseStatus::LimitReached {
            break;
        }

        state.indexed_files += 1;
        progress.emit(
            &format!(
                "Processing files ({}/{})...",
                file_index + 1,
                ctx.files.len()
            ),
            (file_index + 1) as u64,
            ctx.files.len() as u64,
            None,
        );
    }

    Ok(())
}

async fn finalize_batches<'a>(ctx: &IndexRunContext<'a>, state: &mut IndexState<'a>) -> Result<()> {
    flush_pending_batches(&ctx.batch, &mut state.batch).await?;

    if !state.batch.pending.is_empty() {
        let tail = std::mem::take(&mut state.batch.pending);
        schedule_embedding_batch(&ctx.batch, &mut state.batch, tail);
    }

    while state.batch.next_batch_to_insert < state.batch.embedding_tasks.len() {
        drain_one_embedding_batch(&ctx.batch, &mut state.batch).await?;
    }

    while state.batch.next_insert_to_await < state.batch.insert_tasks.len() {
        drain_one_insert_batch(&ctx.batch, &mut state.batch).await?;
    }

    Ok(())
}

async fn ensure_collection(
    ctx: &RequestContext,
    deps: &IndexCodebaseDeps,
    input: &IndexCodebaseInput,
) -> Result<()> {
    let exists = deps
        .vectordb
        .has_collection(ctx, input.collection_name.clone())
        .await?;

    if exists && input.force_reindex {
        deps.vectordb
            .drop_collection(ctx, input.collection_name.clone())
            .await?;
    }

    if exists && !input.force_reindex {
        return Ok(());
    }

    let dimension = deps
        .embedding
        .detect_dimension(ctx, DetectDimensionOptions::default().into())
        .await?;

    deps.vectordb
        .create_collection(ctx, input.collection_name.clone(), dimension)
        .await?;

    Ok(())
}
