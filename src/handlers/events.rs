//! Trigger endpoints. Each POST is one invocation of one voicemail handler.
//!
//! - audio: always answers 200 with the batch summary; per-record failures are
//!   reported in the summary, not by status
//! - recording: always answers 200 with the transcription outcome
//! - transcript: answers with an error status when packaging fails so the
//!   trigger redelivers the event

use crate::error::{AppError, AppResult};
use crate::middleware::InvocationId;
use crate::state::AppState;
use crate::voicemail::{ObjectCreatedEvent, PackagingResult, QueueBatch, TranscribeOutcome};
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};

pub async fn voicemail_audio(
    req: HttpRequest,
    state: web::Data<AppState>,
    batch: web::Json<QueueBatch>,
) -> AppResult<HttpResponse> {
    let batch = batch.into_inner();
    info!(
        invocation_id = ?InvocationId::of(&req),
        records = batch.records.len(),
        "Voicemail audio batch received"
    );

    let summary = {
        let mut handler = state.pipelines.audio.lock().await;
        handler.handle(batch).await
    };
    state.record_batch(&summary);

    Ok(HttpResponse::Ok().json(summary))
}

pub async fn voicemail_recording(
    state: web::Data<AppState>,
    event: web::Json<ObjectCreatedEvent>,
) -> AppResult<HttpResponse> {
    let outcome = state.pipelines.transcriber.handle(&event).await;
    match &outcome {
        TranscribeOutcome::Started { .. } => state.record_transcription(true),
        TranscribeOutcome::Failed { .. } => state.record_transcription(false),
        TranscribeOutcome::Skipped { .. } => {}
    }

    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn voicemail_transcript(
    req: HttpRequest,
    state: web::Data<AppState>,
    event: web::Json<ObjectCreatedEvent>,
) -> AppResult<HttpResponse> {
    match state.pipelines.packaging.handle(&event).await {
        Ok(result) => {
            if let PackagingResult::Completed(report) = &result {
                state.record_packaging(report.routing_attempts.len(), report.routed);
            }
            Ok(HttpResponse::Ok().json(result))
        }
        Err(e) => {
            warn!(
                invocation_id = ?InvocationId::of(&req),
                key = event.key(),
                "Packaging failed; returning an error so the event is redelivered"
            );
            state.record_packaging_failure();
            Err(AppError::from(e))
        }
    }
}
