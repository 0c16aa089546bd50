//! # Invocation Context
//!
//! Accumulation state for one audio-processing invocation: the audio blocks
//! and the tag buffer of the record in flight.
//!
//! Only one record can be in flight at a time. [`InvocationContext::begin_record`]
//! borrows the context mutably for the lifetime of the returned [`RecordSession`],
//! and the session is consumed by [`RecordSession::publish`], which resets the
//! context only after the storage write has completed. The next record cannot
//! start until the previous session is gone.

use crate::audio::{AudioAccumulator, PcmEncoder};
use crate::error::VoicemailResult;
use crate::voicemail::publisher::{ArtifactPublisher, VoicemailRecordingArtifact};
use tracing::debug;

#[derive(Debug, Default)]
pub struct InvocationContext {
    audio: AudioAccumulator,
    tag_buffer: String,
    records_published: usize,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a record. Leftovers from a record that failed before publishing are dropped.
    pub fn begin_record(&mut self, call_id: &str, tag_prefix: String) -> RecordSession<'_> {
        if !self.is_clean() {
            debug!(
                stale_blocks = self.audio.len(),
                stale_tag_bytes = self.tag_buffer.len(),
                "Discarding state left by an unpublished record"
            );
            self.reset();
        }
        self.tag_buffer = tag_prefix;
        RecordSession {
            context: self,
            call_id: call_id.to_string(),
        }
    }

    /// True when no record state is held.
    pub fn is_clean(&self) -> bool {
        self.audio.is_empty() && self.tag_buffer.is_empty()
    }

    #[cfg(test)]
    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    #[cfg(test)]
    pub fn tag_buffer_len(&self) -> usize {
        self.tag_buffer.len()
    }

    pub fn records_published(&self) -> usize {
        self.records_published
    }

    fn reset(&mut self) {
        self.audio.clear();
        self.tag_buffer.clear();
    }
}

/// The one record currently being processed.
pub struct RecordSession<'a> {
    context: &'a mut InvocationContext,
    call_id: String,
}

impl RecordSession<'_> {
    pub fn accumulator(&mut self) -> &mut AudioAccumulator {
        &mut self.context.audio
    }

    /// Encode the accumulated audio, write it, and reset the context once the
    /// write has completed. On failure the state stays until the next record begins.
    pub async fn publish(
        self,
        encoder: &PcmEncoder,
        publisher: &ArtifactPublisher,
    ) -> VoicemailResult<VoicemailRecordingArtifact> {
        debug!(
            contact_id = %self.call_id,
            blocks = self.context.audio.len(),
            audio_bytes = self.context.audio.total_bytes(),
            "Encoding recording"
        );
        let container = encoder.encode(self.context.audio.blocks())?;

        let artifact = publisher
            .publish(&self.call_id, &self.context.tag_buffer, container)
            .await?;

        self.context.reset();
        self.context.records_published += 1;
        Ok(artifact)
    }
}
