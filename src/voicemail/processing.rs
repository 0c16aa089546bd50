//! # Audio Processing
//!
//! Handles one queue batch of contact trace records. Each voicemail record is
//! read from its media stream, re-encoded to WAV and published, strictly one
//! record after another. A record that fails is reported in the batch summary
//! and the batch moves on; nothing here fails the whole invocation.
//!
//! ## Per-record results (`record<N>result`):
//! - `Failed to extract record and/or decode`
//! - `ContactID: <id> - IGNORE - voicemail already processed`
//! - `ContactID: <id> - IGNORE - voicemail flag not valid`
//! - `ContactID: <id> - Failed to extract KVS info`
//! - `ContactID: <id> - Failed to extract vm tags`
//! - `ContactID: <id> - Failed to write audio to storage`
//! - `ContactID: <id> - Write complete`

use crate::audio::PcmEncoder;
use crate::error::VoicemailResult;
use crate::media::{FragmentReader, MediaFragmentRequest};
use crate::voicemail::publisher::{ArtifactPublisher, VoicemailRecordingArtifact};
use crate::voicemail::record::{CallAttributes, ContactTraceRecord, QueueBatch, StreamLocation, VoicemailFlag};
use crate::voicemail::session::InvocationContext;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

/// Summary returned at the end of an invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub status: String,
    /// `record<N>result` entries in batch order
    pub record_results: Map<String, Value>,
    #[serde(skip)]
    pub processed: usize,
    #[serde(skip)]
    pub total: usize,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.total - self.processed
    }
}

enum RecordOutcome {
    Processed(String),
    Failed(String),
}

pub struct AudioProcessingHandler {
    reader: FragmentReader,
    encoder: PcmEncoder,
    publisher: ArtifactPublisher,
    context: InvocationContext,
}

impl AudioProcessingHandler {
    pub fn new(reader: FragmentReader, encoder: PcmEncoder, publisher: ArtifactPublisher) -> Self {
        Self {
            reader,
            encoder,
            publisher,
            context: InvocationContext::new(),
        }
    }

    /// Process every record in the batch, in order.
    pub async fn handle(&mut self, batch: QueueBatch) -> BatchSummary {
        let total = batch.records.len();
        let mut processed = 0;
        let mut record_results = Map::new();

        for (index, record) in batch.records.iter().enumerate() {
            let number = index + 1;
            let outcome = self.process_record(number, &record.kinesis.data).await;
            let result = match outcome {
                RecordOutcome::Processed(result) => {
                    processed += 1;
                    result
                }
                RecordOutcome::Failed(result) => result,
            };
            record_results.insert(format!("record{}result", number), Value::String(result));
        }

        let summary = BatchSummary {
            status: format!("Complete. Processed {} of {} records.", processed, total),
            record_results,
            processed,
            total,
        };
        info!(
            processed,
            total,
            published = self.context.records_published(),
            results = ?summary.record_results,
            "Voicemail audio processing complete"
        );
        summary
    }

    async fn process_record(&mut self, number: usize, data: &str) -> RecordOutcome {
        let record = match ContactTraceRecord::decode(data) {
            Ok(record) => record,
            Err(e) => {
                error!(record = number, error = %e, "Record extraction failed");
                return RecordOutcome::Failed("Failed to extract record and/or decode".to_string());
            }
        };
        let contact_id = record.contact_id.clone();

        match record.voicemail_flag() {
            VoicemailFlag::AlreadyProcessed => {
                debug!(record = number, contact_id = %contact_id, "Voicemail already processed");
                return RecordOutcome::Processed(format!(
                    "ContactID: {} - IGNORE - voicemail already processed",
                    contact_id
                ));
            }
            VoicemailFlag::Invalid => {
                debug!(record = number, contact_id = %contact_id, "Not a voicemail record");
                return RecordOutcome::Processed(format!(
                    "ContactID: {} - IGNORE - voicemail flag not valid",
                    contact_id
                ));
            }
            VoicemailFlag::Pending => {
                info!(record = number, contact_id = %contact_id, "Processing voicemail");
            }
        }

        let location = match record.stream_location() {
            Ok(location) => location,
            Err(e) => {
                error!(record = number, contact_id = %contact_id, error = %e, "Could not identify media stream");
                return RecordOutcome::Failed(format!("ContactID: {} - Failed to extract KVS info", contact_id));
            }
        };

        let attributes = match record.call_attributes() {
            Ok(attributes) => attributes,
            Err(e) => {
                error!(record = number, contact_id = %contact_id, error = %e, "Could not extract recording tags");
                return RecordOutcome::Failed(format!("ContactID: {} - Failed to extract vm tags", contact_id));
            }
        };

        match self.reconstruct(&contact_id, location, attributes).await {
            Ok(artifact) => {
                info!(
                    record = number,
                    contact_id = %contact_id,
                    key = %artifact.key,
                    duration_seconds = artifact.tags.duration_seconds,
                    "Write complete"
                );
                RecordOutcome::Processed(format!("ContactID: {} - Write complete", contact_id))
            }
            Err(e) => {
                error!(record = number, contact_id = %contact_id, error = %e, "Could not write audio to storage");
                RecordOutcome::Failed(format!(
                    "ContactID: {} - Failed to write audio to storage",
                    contact_id
                ))
            }
        }
    }

    /// Pull, encode and publish one voicemail. The write has completed when this returns.
    async fn reconstruct(
        &mut self,
        contact_id: &str,
        location: StreamLocation,
        attributes: CallAttributes,
    ) -> VoicemailResult<VoicemailRecordingArtifact> {
        let mut session = self.context.begin_record(contact_id, attributes.tag_prefix());
        let request = MediaFragmentRequest::new(location.stream_address, location.start_fragment);

        let report = self
            .reader
            .read_into(&request, &location.stop_fragment, session.accumulator())
            .await?;
        if report.blocks == 0 {
            warn!(contact_id, end = ?report.end, "No audio found for voicemail; publishing an empty recording");
        }

        session.publish(&self.encoder, &self.publisher).await
    }

    #[cfg(test)]
    pub fn context(&self) -> &InvocationContext {
        &self.context
    }
}
