use common::{
    error::AppError,
    storage::types::{document::Chunk, index_record::IndexRecord},
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::chunker::chunk_text_by_tokens;

use super::{
    context::{PendingChunk, PipelineContext},
    state::{Embedded, Failed, IngestionMachine, Prepared, Ready, Uploaded},
};

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub fn prepare_chunks(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Prepared>, AppError> {
    if let Err(err) = chunk_documents(ctx) {
        return Err(fail(machine.abort(), "prepare", ctx, err));
    }

    machine
        .prepare()
        .map_err(|(_, guard)| map_guard_error("prepare", &guard))
}

fn chunk_documents(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    let max_tokens = ctx.pipeline_config.tuning.chunk_max_tokens;

    for document in std::mem::take(&mut ctx.documents) {
        let parent_id = Uuid::new_v4().to_string();
        let mut sequence_number: u32 = 0;

        for text in chunk_text_by_tokens(&document.text, max_tokens)? {
            if text.trim().is_empty() {
                continue;
            }
            ctx.pending.push(PendingChunk {
                chunk: Chunk {
                    parent_id: parent_id.clone(),
                    sequence_number,
                    text,
                },
                document_title: document.title.clone(),
            });
            sequence_number = sequence_number.saturating_add(1);
        }

        debug!(
            run_id = %ctx.run_id,
            title = %document.title,
            %parent_id,
            chunk_count = sequence_number,
            "document chunked"
        );
    }

    info!(run_id = %ctx.run_id, chunk_count = ctx.pending.len(), "chunks prepared");
    Ok(())
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn embed_chunks(
    machine: IngestionMachine<(), Prepared>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Embedded>, AppError> {
    if let Err(err) = embed_pending(ctx).await {
        return Err(fail(machine.abort(), "embed", ctx, err));
    }

    machine
        .embed()
        .map_err(|(_, guard)| map_guard_error("embed", &guard))
}

async fn embed_pending(ctx: &mut PipelineContext<'_>) -> Result<(), AppError> {
    let manual_type = ctx.pipeline_config.tuning.manual_type.clone();

    for PendingChunk {
        chunk,
        document_title,
    } in std::mem::take(&mut ctx.pending)
    {
        let embedding = match ctx.services.embed_chunk(&chunk.text).await {
            Ok(embedding) => embedding,
            Err(err) if ctx.pipeline_config.skip_failed_embeddings => {
                warn!(
                    run_id = %ctx.run_id,
                    title = %document_title,
                    sequence_number = chunk.sequence_number,
                    error = %err,
                    "skipping chunk without embedding"
                );
                ctx.skipped_chunks = ctx.skipped_chunks.saturating_add(1);
                continue;
            }
            Err(err) => return Err(err),
        };

        ctx.records.push(IndexRecord::new(
            chunk,
            &document_title,
            embedding,
            &manual_type,
            ctx.processed_at,
        ));
    }

    debug!(
        run_id = %ctx.run_id,
        record_count = ctx.records.len(),
        skipped_chunks = ctx.skipped_chunks,
        "chunks embedded"
    );
    Ok(())
}

#[instrument(level = "trace", skip_all, fields(run_id = %ctx.run_id))]
pub async fn upload_records(
    machine: IngestionMachine<(), Embedded>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Uploaded>, AppError> {
    if ctx.records.is_empty() {
        info!(run_id = %ctx.run_id, "no records to upload");
    } else {
        match ctx.services.upload_records(&ctx.records).await {
            Ok(uploaded) => ctx.uploaded = uploaded,
            Err(err) => return Err(fail(machine.abort(), "upload", ctx, err)),
        }
        info!(run_id = %ctx.run_id, uploaded = ctx.uploaded, "records uploaded");
    }

    machine
        .upload()
        .map_err(|(_, guard)| map_guard_error("upload", &guard))
}

/// Records the `Failed` transition on the context, or reports why it was refused.
fn fail<M>(
    aborted: Result<IngestionMachine<(), Failed>, (M, GuardError)>,
    stage: &'static str,
    ctx: &mut PipelineContext<'_>,
    err: AppError,
) -> AppError {
    match aborted {
        Ok(_failed) => ctx.abort(stage, err),
        Err((_, guard)) => map_guard_error("abort", &guard),
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}
