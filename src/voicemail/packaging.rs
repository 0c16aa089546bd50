//! # Voicemail Packaging
//!
//! Runs when a transcript lands in storage and turns the call record into a
//! finished, routed voicemail.
//!
//! ## Steps:
//! 1. Derive the recording key and call id from the transcript key
//! 2. Read the recording's tags and convert its timestamps to epoch milliseconds
//! 3. Read the transcript and take its first transcript string
//! 4. Mark the call record as a realized voicemail (location, duration, times)
//! 5. Post the transcript as a message on the call
//! 6. Route the call, retrying a fixed number of times with a fixed delay
//! 7. Close the call record (empty update)
//! 8. Delete the transcription job
//!
//! Any error in steps 1-8 stops the run, is logged with the call id and is
//! returned to the caller so the trigger's own redelivery applies. A routing
//! call that keeps failing is not an error: the last attempt's result is kept.

use crate::config::AppConfig;
use crate::error::VoicemailResult;
use crate::integration::{InvocationOutcome, TelephonyClient, VoiceCallUpdate, VoicemailMessage};
use crate::storage::{KeyLayout, ObjectStore};
use crate::transcription::{Transcript, TranscriptionService};
use crate::voicemail::publisher::RecordingTags;
use crate::voicemail::record::ObjectCreatedEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry policy for the routing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RoutingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.voicemail.routing_max_attempts.max(1),
            retry_delay: config.routing_retry_delay(),
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// One routing attempt. `delay_seconds` is the wait that preceded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingAttempt {
    pub attempt_number: u32,
    pub delay_seconds: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingReport {
    pub contact_id: String,
    pub recording_key: String,
    pub routed: bool,
    pub routing_attempts: Vec<RoutingAttempt>,
    /// Integration results in call order
    pub outcomes: Vec<InvocationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PackagingResult {
    Skipped { key: String },
    Completed(PackagingReport),
}

pub struct PackagingOrchestrator {
    store: Arc<dyn ObjectStore>,
    telephony: TelephonyClient,
    transcription: Arc<dyn TranscriptionService>,
    layout: KeyLayout,
    routing: RoutingPolicy,
}

impl PackagingOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        telephony: TelephonyClient,
        transcription: Arc<dyn TranscriptionService>,
        layout: KeyLayout,
        routing: RoutingPolicy,
    ) -> Self {
        Self {
            store,
            telephony,
            transcription,
            layout,
            routing,
        }
    }

    pub async fn handle(&self, event: &ObjectCreatedEvent) -> VoicemailResult<PackagingResult> {
        let bucket = event.bucket();
        let key = event.key();

        if !self.layout.is_transcript_key(key) {
            debug!(key, "Not a transcript; skipping");
            return Ok(PackagingResult::Skipped { key: key.to_string() });
        }

        let contact_id = match self.layout.call_id_from_transcript(key) {
            Ok(contact_id) => contact_id,
            Err(e) => {
                error!(key, error = %e, "Voicemail packaging failed");
                return Err(e);
            }
        };
        info!(contact_id = %contact_id, key, "Packaging voicemail");

        match self.package(bucket, key, &contact_id).await {
            Ok(report) => {
                info!(
                    contact_id = %contact_id,
                    routed = report.routed,
                    attempts = report.routing_attempts.len(),
                    "Voicemail packaging completed"
                );
                Ok(PackagingResult::Completed(report))
            }
            Err(e) => {
                error!(contact_id = %contact_id, error = %e, "Voicemail packaging failed");
                Err(e)
            }
        }
    }

    async fn package(&self, bucket: &str, key: &str, contact_id: &str) -> VoicemailResult<PackagingReport> {
        let recording_key = self.layout.recording_key_for_transcript(key)?;

        let tag_set = self.store.get_object_tagging(bucket, &recording_key).await?;
        let tags = RecordingTags::from_tag_set(&tag_set, &recording_key)?;
        let (start_time, end_time) = tags.message_window()?;

        let transcript_object = self.store.get_object(bucket, key).await?;
        let transcript = Transcript::parse(&transcript_object.body)?;
        let text = transcript.first_text()?.to_string();
        debug!(
            contact_id,
            job = transcript.job_name.as_deref().unwrap_or(contact_id),
            transcript_chars = text.len(),
            "Transcript read"
        );

        let mut outcomes = Vec::with_capacity(4);

        let realized = self
            .telephony
            .update_voice_call(
                contact_id,
                &VoiceCallUpdate::Realized {
                    recording_location: tags.recording_url.clone(),
                    total_recording_duration: tags.duration_seconds,
                    start_time: tags.init_timestamp.clone(),
                    end_time: tags.end_timestamp.clone(),
                },
            )
            .await?;
        log_function_error(contact_id, "updateVoiceCall", &realized);
        outcomes.push(realized);

        let message = VoicemailMessage {
            start_time,
            end_time,
            content: text,
        };
        let sent = self.telephony.send_message(contact_id, &message).await?;
        log_function_error(contact_id, "sendMessage", &sent);
        outcomes.push(sent);

        let (routing_attempts, routing_outcome) = self.route(contact_id, &tags.dialed_number).await;
        let routed = routing_attempts.last().map(|a| a.success).unwrap_or(false);
        if let Some(outcome) = routing_outcome {
            outcomes.push(outcome);
        }

        let closed = self
            .telephony
            .update_voice_call(contact_id, &VoiceCallUpdate::Close)
            .await?;
        log_function_error(contact_id, "updateVoiceCall", &closed);
        outcomes.push(closed);

        self.transcription.delete_job(contact_id).await?;

        Ok(PackagingReport {
            contact_id: contact_id.to_string(),
            recording_key,
            routed,
            routing_attempts,
            outcomes,
        })
    }

    /// Bounded routing loop: up to `max_attempts` calls, `retry_delay` apart,
    /// stopping at the first call without a function-level error. A transport
    /// failure counts as a failed attempt.
    async fn route(
        &self,
        contact_id: &str,
        dialed_number: &str,
    ) -> (Vec<RoutingAttempt>, Option<InvocationOutcome>) {
        let mut attempts = Vec::new();
        let mut last_outcome = None;

        for attempt_number in 1..=self.routing.max_attempts {
            let delay_seconds = if attempt_number > 1 {
                tokio::time::sleep(self.routing.retry_delay).await;
                self.routing.retry_delay.as_secs()
            } else {
                0
            };

            let (success, error) = match self.telephony.execute_omni_flow(contact_id, dialed_number).await {
                Ok(outcome) => {
                    let result = (outcome.is_success(), outcome.function_error.clone());
                    last_outcome = Some(outcome);
                    result
                }
                Err(e) => (false, Some(e.to_string())),
            };

            attempts.push(RoutingAttempt {
                attempt_number,
                delay_seconds,
                success,
                error: error.clone(),
            });

            if success {
                info!(contact_id, attempt = attempt_number, dialed_number, "Voicemail routed");
                break;
            }
            warn!(
                contact_id,
                attempt = attempt_number,
                max_attempts = self.routing.max_attempts,
                error = error.as_deref().unwrap_or("unknown"),
                "Routing attempt failed"
            );
        }

        if !attempts.last().map(|a| a.success).unwrap_or(false) {
            warn!(
                contact_id,
                attempts = attempts.len(),
                "Routing did not succeed; keeping the last result"
            );
        }
        (attempts, last_outcome)
    }
}

fn log_function_error(contact_id: &str, method: &str, outcome: &InvocationOutcome) {
    if let Some(error) = &outcome.function_error {
        warn!(contact_id, method, error = %error, status = outcome.status_code, "Integration call reported an error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoicemailError;
    use crate::integration::fixtures::{RecordingIntegration, RoutingReply};
    use crate::storage::memory::MemoryObjectStore;
    use crate::storage::TagSet;
    use crate::transcription::fixtures::RecordingTranscriptionService;
    use tokio::time::Instant;

    const TRANSCRIPT_KEY: &str = "voicemail_transcripts/abc123.json";
    const RECORDING_KEY: &str = "voicemail_recordings/abc123.wav";

    struct Harness {
        store: Arc<MemoryObjectStore>,
        integration: Arc<RecordingIntegration>,
        transcription: Arc<RecordingTranscriptionService>,
        orchestrator: PackagingOrchestrator,
    }

    fn harness(integration: RecordingIntegration) -> Harness {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(
            "vm",
            RECORDING_KEY,
            b"RIFF",
            TagSet::parse(
                "vm_lang=en-US&vm_dialedNumber=%2B15551234567&vm_initTimestamp=2021-01-27T22%3A13%3A33Z&vm_endTimestamp=2021-01-27T22%3A14%3A01Z&vm_duration=28&vm_recordingUrl=vm%2Fvoicemail_recordings%2Fabc123.wav",
            ),
        );
        store.insert(
            "vm",
            TRANSCRIPT_KEY,
            br#"{"jobName":"abc123","results":{"transcripts":[{"transcript":"Please call me back."}]}}"#,
            TagSet::new(),
        );

        let integration = Arc::new(integration);
        let transcription = Arc::new(RecordingTranscriptionService::default());
        let orchestrator = PackagingOrchestrator::new(
            store.clone(),
            TelephonyClient::new(integration.clone()),
            transcription.clone(),
            KeyLayout::new("voicemail_recordings", "voicemail_transcripts"),
            RoutingPolicy {
                max_attempts: 4,
                retry_delay: Duration::from_secs(60),
            },
        );
        Harness {
            store,
            integration,
            transcription,
            orchestrator,
        }
    }

    fn event() -> ObjectCreatedEvent {
        ObjectCreatedEvent::new("vm", TRANSCRIPT_KEY)
    }

    fn report(result: PackagingResult) -> PackagingReport {
        match result {
            PackagingResult::Completed(report) => report,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_calls_every_step_in_order() {
        let h = harness(RecordingIntegration::default());
        let report = report(h.orchestrator.handle(&event()).await.unwrap());

        assert_eq!(report.contact_id, "abc123");
        assert_eq!(report.recording_key, RECORDING_KEY);
        assert!(report.routed);
        assert_eq!(
            h.integration.methods(),
            vec!["updateVoiceCall", "sendMessage", "executeOmniFlow", "updateVoiceCall"]
        );
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(*h.transcription.deleted.lock().unwrap(), vec!["abc123".to_string()]);

        let requests = h.integration.requests.lock().unwrap();
        assert_eq!(requests[0].field_values["recordingLocation"], "vm/voicemail_recordings/abc123.wav");
        assert_eq!(requests[0].field_values["totalRecordingDuration"], 28);
        assert_eq!(requests[1].field_values["content"], "Please call me back.");
        assert_eq!(requests[1].field_values["startTime"], 1611785613000i64);
        assert_eq!(requests[1].field_values["endTime"], 1611785641000i64);
        assert_eq!(requests[2].field_values["dialedNumber"], "+15551234567");
        assert_eq!(requests[3].field_values, serde_json::json!({}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_succeeds_on_fourth_attempt() {
        let h = harness(RecordingIntegration::with_routing(vec![
            RoutingReply::FunctionError,
            RoutingReply::FunctionError,
            RoutingReply::FunctionError,
            RoutingReply::Succeed,
        ]));

        let started = Instant::now();
        let report = report(h.orchestrator.handle(&event()).await.unwrap());

        assert_eq!(h.integration.calls_to("executeOmniFlow"), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(180));
        assert!(report.routed);
        let numbers: Vec<u32> = report.routing_attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(report.routing_attempts[0].delay_seconds, 0);
        assert_eq!(report.routing_attempts[3].delay_seconds, 60);
        assert!(report.routing_attempts[3].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_gives_up_after_max_attempts_without_failing() {
        let h = harness(RecordingIntegration::with_routing(vec![RoutingReply::FunctionError]));

        let report = report(h.orchestrator.handle(&event()).await.unwrap());

        assert_eq!(h.integration.calls_to("executeOmniFlow"), 4);
        assert!(!report.routed);
        assert_eq!(report.routing_attempts.len(), 4);
        assert!(report.routing_attempts.iter().all(|a| !a.success));
        // Close and job deletion still happen
        assert_eq!(h.integration.calls_to("updateVoiceCall"), 2);
        assert_eq!(h.transcription.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_transport_errors_are_retried() {
        let h = harness(RecordingIntegration::with_routing(vec![
            RoutingReply::TransportError,
            RoutingReply::Succeed,
        ]));

        let report = report(h.orchestrator.handle(&event()).await.unwrap());
        assert_eq!(report.routing_attempts.len(), 2);
        assert!(report.routing_attempts[0].error.as_deref().unwrap().contains("connection reset"));
        assert!(report.routed);
    }

    #[tokio::test]
    async fn test_non_transcript_keys_are_skipped() {
        let h = harness(RecordingIntegration::default());
        let result = h
            .orchestrator
            .handle(&ObjectCreatedEvent::new("vm", RECORDING_KEY))
            .await
            .unwrap();
        assert!(matches!(result, PackagingResult::Skipped { .. }));
        assert!(h.integration.methods().is_empty());
    }

    #[tokio::test]
    async fn test_missing_recording_aborts_and_raises() {
        let h = harness(RecordingIntegration::default());
        let err = h
            .orchestrator
            .handle(&ObjectCreatedEvent::new("vm", "voicemail_transcripts/unknown.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoicemailError::Storage { .. }));
        assert!(h.integration.methods().is_empty());
    }

    #[tokio::test]
    async fn test_step_failure_aborts_remaining_steps() {
        let h = harness(RecordingIntegration::failing("sendMessage"));

        let err = h.orchestrator.handle(&event()).await.unwrap_err();
        assert!(matches!(err, VoicemailError::Integration { .. }));
        assert_eq!(h.integration.methods(), vec!["updateVoiceCall", "sendMessage"]);
        assert!(h.transcription.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_timestamp_aborts_before_any_crm_call() {
        let h = harness(RecordingIntegration::default());
        h.store.insert(
            "vm",
            RECORDING_KEY,
            b"RIFF",
            TagSet::parse(
                "vm_lang=en-US&vm_dialedNumber=%2B15551234567&vm_initTimestamp=2021-01-27T22%3A13%3A33Z&vm_endTimestamp=not-a-time&vm_duration=28&vm_recordingUrl=vm%2Fvoicemail_recordings%2Fabc123.wav",
            ),
        );

        let err = h.orchestrator.handle(&event()).await.unwrap_err();
        assert!(matches!(err, VoicemailError::Extraction(_)));
        assert!(h.integration.methods().is_empty());
        assert!(h.transcription.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_transcript_aborts() {
        let h = harness(RecordingIntegration::default());
        h.store.insert("vm", TRANSCRIPT_KEY, b"{\"results\":{}}", TagSet::new());

        let err = h.orchestrator.handle(&event()).await.unwrap_err();
        assert!(matches!(err, VoicemailError::Transcript(_)));
        assert!(h.integration.methods().is_empty());
    }
}
