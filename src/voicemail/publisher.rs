//! # Artifact Publisher
//!
//! Writes a finished recording to `<recordings_prefix>/<call id>.wav` with the
//! per-call tag string, the duration and the recording location attached as
//! flat tags. The packaging step reads these same tags back.

use crate::audio::encoder::AUDIO_MIME_TYPE;
use crate::audio::PcmContainer;
use crate::error::{VoicemailError, VoicemailResult};
use crate::storage::{encode_component, KeyLayout, ObjectStore, PutObjectRequest, TagSet};
use chrono::DateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const TAG_LANGUAGE: &str = "vm_lang";
pub const TAG_DIALED_NUMBER: &str = "vm_dialedNumber";
pub const TAG_INIT_TIMESTAMP: &str = "vm_initTimestamp";
pub const TAG_END_TIMESTAMP: &str = "vm_endTimestamp";
pub const TAG_DURATION: &str = "vm_duration";
pub const TAG_RECORDING_URL: &str = "vm_recordingUrl";

/// Tags carried by a published recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingTags {
    pub language: Option<String>,
    pub dialed_number: String,
    pub init_timestamp: String,
    pub end_timestamp: String,
    pub duration_seconds: u64,
    /// `<bucket>/<key>` of the recording
    pub recording_url: String,
}

impl RecordingTags {
    /// Read recording tags back from an object's tag set.
    pub fn from_tag_set(tags: &TagSet, key: &str) -> VoicemailResult<Self> {
        let required = |name: &str| {
            tags.get(name).map(str::to_string).ok_or_else(|| {
                VoicemailError::Extraction(format!("recording {} is missing tag {}", key, name))
            })
        };

        let duration = required(TAG_DURATION)?;
        let duration_seconds = duration.trim().parse::<u64>().map_err(|_| {
            VoicemailError::Extraction(format!(
                "recording {} has a non-numeric duration: {:?}",
                key, duration
            ))
        })?;

        Ok(Self {
            language: tags.get(TAG_LANGUAGE).map(str::to_string),
            dialed_number: required(TAG_DIALED_NUMBER)?,
            init_timestamp: required(TAG_INIT_TIMESTAMP)?,
            end_timestamp: required(TAG_END_TIMESTAMP)?,
            duration_seconds,
            recording_url: required(TAG_RECORDING_URL)?,
        })
    }

    /// Start and end of the voicemail as epoch milliseconds.
    pub fn message_window(&self) -> VoicemailResult<(i64, i64)> {
        Ok((epoch_millis(&self.init_timestamp)?, epoch_millis(&self.end_timestamp)?))
    }
}

/// Tags carry RFC 3339 timestamps; a bare integer is taken as milliseconds already.
fn epoch_millis(timestamp: &str) -> VoicemailResult<i64> {
    let trimmed = timestamp.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.timestamp_millis());
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| VoicemailError::Extraction(format!("unreadable timestamp tag: {:?}", timestamp)))
}

/// A recording written by the publisher. Never modified after the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicemailRecordingArtifact {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub tags: RecordingTags,
}

pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    layout: KeyLayout,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, layout: KeyLayout) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            layout,
        }
    }

    /// Store `container` for `call_id`; resolves once the object is written.
    pub async fn publish(
        &self,
        call_id: &str,
        tag_prefix: &str,
        container: PcmContainer,
    ) -> VoicemailResult<VoicemailRecordingArtifact> {
        let key = self.layout.recording_key(call_id);
        let recording_url = format!("{}/{}", self.bucket, key);

        let mut tagging = String::new();
        if !tag_prefix.is_empty() {
            tagging.push_str(tag_prefix.trim_end_matches('&'));
            tagging.push('&');
        }
        tagging.push_str(&format!(
            "{}={}&{}={}",
            TAG_DURATION,
            container.duration_seconds,
            TAG_RECORDING_URL,
            encode_component(&recording_url)
        ));

        let tags = TagSet::parse(&tagging);
        let data_length = container.data_length;

        self.store
            .put_object(PutObjectRequest {
                bucket: self.bucket.clone(),
                key: key.clone(),
                body: container.bytes,
                content_type: AUDIO_MIME_TYPE.to_string(),
                tagging,
            })
            .await?;

        info!(
            contact_id = call_id,
            key = %key,
            data_length,
            duration_seconds = container.duration_seconds,
            "Recording published"
        );

        Ok(VoicemailRecordingArtifact {
            bucket: self.bucket.clone(),
            key: key.clone(),
            content_type: AUDIO_MIME_TYPE.to_string(),
            tags: RecordingTags {
                language: tags.get(TAG_LANGUAGE).map(str::to_string),
                dialed_number: tags.get(TAG_DIALED_NUMBER).unwrap_or_default().to_string(),
                init_timestamp: tags.get(TAG_INIT_TIMESTAMP).unwrap_or_default().to_string(),
                end_timestamp: tags.get(TAG_END_TIMESTAMP).unwrap_or_default().to_string(),
                duration_seconds: container.duration_seconds,
                recording_url,
            },
        })
    }
}
