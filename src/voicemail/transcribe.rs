//! # Transcription Starter
//!
//! Runs when a recording lands in storage: reads the recording's language tag
//! and starts a transcription job that writes `<transcripts_prefix>/<call id>.json`
//! back into the same bucket. Failures are logged and reported, never re-thrown;
//! a recording that cannot be transcribed does not need redelivery.

use crate::storage::{KeyLayout, ObjectStore};
use crate::transcription::{JobMedia, TranscriptionJobRequest, TranscriptionService};
use crate::voicemail::publisher::TAG_LANGUAGE;
use crate::voicemail::record::ObjectCreatedEvent;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TranscribeOutcome {
    Skipped { key: String },
    Started { job_name: String, language: String },
    Failed { key: String, reason: String },
}

pub struct RecordingTranscriber {
    store: Arc<dyn ObjectStore>,
    transcription: Arc<dyn TranscriptionService>,
    layout: KeyLayout,
    default_language: String,
}

impl RecordingTranscriber {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcription: Arc<dyn TranscriptionService>,
        layout: KeyLayout,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transcription,
            layout,
            default_language: default_language.into(),
        }
    }

    pub async fn handle(&self, event: &ObjectCreatedEvent) -> TranscribeOutcome {
        let bucket = event.bucket();
        let key = event.key();

        if !self.layout.is_recording_key(key) {
            debug!(key, "Not a recording; skipping");
            return TranscribeOutcome::Skipped { key: key.to_string() };
        }
        let call_id = match self.layout.call_id_from_recording(key) {
            Ok(call_id) => call_id,
            Err(e) => {
                debug!(key, error = %e, "Recording outside the voicemail layout; skipping");
                return TranscribeOutcome::Skipped { key: key.to_string() };
            }
        };

        let tags = match self.store.get_object_tagging(bucket, key).await {
            Ok(tags) => tags,
            Err(e) => {
                error!(contact_id = %call_id, key, error = %e, "Failed to read recording tags");
                return TranscribeOutcome::Failed {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
            }
        };

        let language = tags
            .get(TAG_LANGUAGE)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.default_language.as_str())
            .to_string();
        let request = TranscriptionJobRequest {
            transcription_job_name: call_id.clone(),
            language_code: language.clone(),
            media_format: "wav".to_string(),
            media: JobMedia {
                media_file_uri: format!("s3://{}/{}", bucket, key),
            },
            output_bucket_name: bucket.to_string(),
            output_key: self.layout.transcript_key(&call_id),
        };

        match self.transcription.start_job(&request).await {
            Ok(()) => {
                info!(contact_id = %call_id, language = %language, "Transcription started");
                TranscribeOutcome::Started {
                    job_name: call_id,
                    language,
                }
            }
            Err(e) => {
                error!(contact_id = %call_id, error = %e, "Failed to start transcription");
                TranscribeOutcome::Failed {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryObjectStore;
    use crate::storage::TagSet;
    use crate::transcription::fixtures::RecordingTranscriptionService;

    fn transcriber(
        store: Arc<MemoryObjectStore>,
        service: Arc<RecordingTranscriptionService>,
    ) -> RecordingTranscriber {
        RecordingTranscriber::new(
            store,
            service,
            KeyLayout::new("voicemail_recordings", "voicemail_transcripts"),
            "en-US",
        )
    }

    #[tokio::test]
    async fn test_starts_job_with_tagged_language() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(
            "vm",
            "voicemail_recordings/abc123.wav",
            b"RIFF",
            TagSet::parse("vm_lang=fr-FR&vm_duration=3"),
        );
        let service = Arc::new(RecordingTranscriptionService::default());

        let outcome = transcriber(store, service.clone())
            .handle(&ObjectCreatedEvent::new("vm", "voicemail_recordings/abc123.wav"))
            .await;

        assert_eq!(
            outcome,
            TranscribeOutcome::Started {
                job_name: "abc123".to_string(),
                language: "fr-FR".to_string()
            }
        );
        let started = service.started.lock().unwrap();
        assert_eq!(started[0].media.media_file_uri, "s3://vm/voicemail_recordings/abc123.wav");
        assert_eq!(started[0].output_bucket_name, "vm");
        assert_eq!(started[0].output_key, "voicemail_transcripts/abc123.json");
        assert_eq!(started[0].media_format, "wav");
    }

    #[tokio::test]
    async fn test_language_defaults_when_untagged() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("vm", "voicemail_recordings/x.wav", b"RIFF", TagSet::new());
        let service = Arc::new(RecordingTranscriptionService::default());

        let outcome = transcriber(store, service)
            .handle(&ObjectCreatedEvent::new("vm", "voicemail_recordings/x.wav"))
            .await;
        assert!(matches!(outcome, TranscribeOutcome::Started { language, .. } if language == "en-US"));
    }

    #[tokio::test]
    async fn test_non_wav_keys_are_skipped() {
        let service = Arc::new(RecordingTranscriptionService::default());
        let outcome = transcriber(Arc::new(MemoryObjectStore::new()), service.clone())
            .handle(&ObjectCreatedEvent::new("vm", "voicemail_transcripts/x.json"))
            .await;
        assert!(matches!(outcome, TranscribeOutcome::Skipped { .. }));
        assert!(service.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_raised() {
        let service = Arc::new(RecordingTranscriptionService::default());
        let outcome = transcriber(Arc::new(MemoryObjectStore::new()), service)
            .handle(&ObjectCreatedEvent::new("vm", "voicemail_recordings/missing.wav"))
            .await;
        assert!(matches!(outcome, TranscribeOutcome::Failed { .. }));

        let store = Arc::new(MemoryObjectStore::new());
        store.insert("vm", "voicemail_recordings/y.wav", b"RIFF", TagSet::new());
        let failing = Arc::new(RecordingTranscriptionService {
            fail: true,
            ..Default::default()
        });
        let outcome = transcriber(store, failing)
            .handle(&ObjectCreatedEvent::new("vm", "voicemail_recordings/y.wav"))
            .await;
        assert!(matches!(outcome, TranscribeOutcome::Failed { reason, .. } if reason.contains("quota")));
    }
}
