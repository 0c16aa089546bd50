//! Typed wrappers around the three integration methods the voicemail flow uses.

use crate::error::VoicemailResult;
use crate::integration::{IntegrationRequest, InvocationOutcome, TelephonyIntegration};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const UPDATE_VOICE_CALL: &str = "updateVoiceCall";
pub const SEND_MESSAGE: &str = "sendMessage";
pub const EXECUTE_OMNI_FLOW: &str = "executeOmniFlow";

/// Voice call record update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCallUpdate {
    /// Turn the call record into a voicemail and keep the conversation open
    Realized {
        recording_location: String,
        total_recording_duration: u64,
        start_time: String,
        end_time: String,
    },
    /// Empty update that finalizes the record
    Close,
}

/// Transcript delivered as a conversation message. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicemailMessage {
    pub start_time: i64,
    pub end_time: i64,
    pub content: String,
}

#[derive(Clone)]
pub struct TelephonyClient {
    integration: Arc<dyn TelephonyIntegration>,
}

impl TelephonyClient {
    pub fn new(integration: Arc<dyn TelephonyIntegration>) -> Self {
        Self { integration }
    }

    pub async fn update_voice_call(
        &self,
        contact_id: &str,
        update: &VoiceCallUpdate,
    ) -> VoicemailResult<InvocationOutcome> {
        let field_values = match update {
            VoiceCallUpdate::Realized {
                recording_location,
                total_recording_duration,
                start_time,
                end_time,
            } => json!({
                "recordingLocation": recording_location,
                "totalRecordingDuration": total_recording_duration,
                "startTime": start_time,
                "endTime": end_time,
                "callOrigin": "Voicemail",
                "isActiveCall": true,
            }),
            VoiceCallUpdate::Close => json!({}),
        };
        self.call(IntegrationRequest::new(UPDATE_VOICE_CALL, contact_id, field_values))
            .await
    }

    pub async fn send_message(
        &self,
        contact_id: &str,
        message: &VoicemailMessage,
    ) -> VoicemailResult<InvocationOutcome> {
        let field_values = json!({
            "messageId": contact_id,
            "startTime": message.start_time,
            "endTime": message.end_time,
            "content": message.content,
            "participantId": "END_USER",
            "senderType": "END_USER",
        });
        self.call(IntegrationRequest::new(SEND_MESSAGE, contact_id, field_values))
            .await
    }

    pub async fn execute_omni_flow(
        &self,
        contact_id: &str,
        dialed_number: &str,
    ) -> VoicemailResult<InvocationOutcome> {
        let field_values = json!({ "dialedNumber": dialed_number });
        self.call(IntegrationRequest::new(EXECUTE_OMNI_FLOW, contact_id, field_values))
            .await
    }

    async fn call(&self, request: IntegrationRequest) -> VoicemailResult<InvocationOutcome> {
        let outcome = self.integration.invoke(&request).await?;
        debug!(
            method = %request.method_name,
            contact_id = %request.contact_id,
            status = outcome.status_code,
            function_error = ?outcome.function_error,
            "Integration call returned"
        );
        Ok(outcome)
    }
}
