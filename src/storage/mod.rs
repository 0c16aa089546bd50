//! # Object Storage
//!
//! Durable blob storage with flat string tags, plus the key naming convention
//! shared by the recording publisher, the transcription starter and the
//! packaging step.
//!
//! ## Key Layout:
//! ```text
//! <recordings_prefix>/<call id>.wav     written by the audio publisher
//! <transcripts_prefix>/<call id>.json   written by the transcription service
//! ```
//! The packaging step finds a recording from its transcript purely by swapping
//! the prefix and extension, so both sides must agree on these prefixes.

pub mod fs;
#[cfg(test)]
pub mod memory;

use crate::config::StorageConfig;
use crate::error::{VoicemailError, VoicemailResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub use fs::FsObjectStore;

const RECORDING_EXTENSION: &str = ".wav";
const TRANSCRIPT_EXTENSION: &str = ".json";

/// A single object write.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    /// Flat `k=v&k=v` tag string with URL-encoded values
    pub tagging: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolves only once the object and its tags are durably written.
    async fn put_object(&self, request: PutObjectRequest) -> VoicemailResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> VoicemailResult<StoredObject>;

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> VoicemailResult<TagSet>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Ordered flat tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `k=v&k=v` tag string, decoding keys and values.
    pub fn parse(tagging: &str) -> Self {
        let tags = form_urlencoded::parse(tagging.as_bytes())
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| Tag {
                key: key.into_owned(),
                value: value.into_owned(),
            })
            .collect();
        Self { tags }
    }

    /// Encode back into a tag string.
    #[cfg(test)]
    pub fn encode(&self) -> String {
        self.tags
            .iter()
            .map(|tag| format!("{}={}", encode_component(&tag.key), encode_component(&tag.value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    /// Replace an existing tag's value or append a new tag.
    #[cfg(test)]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|tag| tag.key == key) {
            Some(tag) => tag.value = value,
            None => self.tags.push(Tag { key, value }),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }
}

/// Percent-encode one tag key or value. Encodes `/`, `:`, `+` and spaces.
pub fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Object key conventions for recordings and transcripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    recordings_prefix: String,
    transcripts_prefix: String,
}

impl KeyLayout {
    pub fn new(recordings_prefix: &str, transcripts_prefix: &str) -> Self {
        Self {
            recordings_prefix: recordings_prefix.trim_matches('/').to_string(),
            transcripts_prefix: transcripts_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.recordings_prefix, &config.transcripts_prefix)
    }

    pub fn recording_key(&self, call_id: &str) -> String {
        format!("{}/{}{}", self.recordings_prefix, call_id, RECORDING_EXTENSION)
    }

    pub fn transcript_key(&self, call_id: &str) -> String {
        format!("{}/{}{}", self.transcripts_prefix, call_id, TRANSCRIPT_EXTENSION)
    }

    pub fn is_recording_key(&self, key: &str) -> bool {
        key.ends_with(RECORDING_EXTENSION)
    }

    pub fn is_transcript_key(&self, key: &str) -> bool {
        key.ends_with(TRANSCRIPT_EXTENSION)
    }

    /// `voicemail_transcripts/abc123.json` → `abc123`
    pub fn call_id_from_transcript(&self, key: &str) -> VoicemailResult<String> {
        strip_layout(key, &self.transcripts_prefix, TRANSCRIPT_EXTENSION)
    }

    /// `voicemail_recordings/abc123.wav` → `abc123`
    pub fn call_id_from_recording(&self, key: &str) -> VoicemailResult<String> {
        strip_layout(key, &self.recordings_prefix, RECORDING_EXTENSION)
    }

    /// Companion recording key for a transcript key, by prefix and extension substitution.
    pub fn recording_key_for_transcript(&self, key: &str) -> VoicemailResult<String> {
        let call_id = self.call_id_from_transcript(key)?;
        Ok(self.recording_key(&call_id))
    }
}

fn strip_layout(key: &str, prefix: &str, extension: &str) -> VoicemailResult<String> {
    let call_id = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|rest| rest.strip_suffix(extension))
        .ok_or_else(|| {
            VoicemailError::InvalidKey(format!(
                "{} is not of the form {}/<call id>{}",
                key, prefix, extension
            ))
        })?;

    if call_id.is_empty() || call_id.contains('/') {
        return Err(VoicemailError::InvalidKey(format!(
            "{} does not name a single call",
            key
        )));
    }
    Ok(call_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> KeyLayout {
        KeyLayout::new("voicemail_recordings", "voicemail_transcripts")
    }

    #[test]
    fn test_transcript_key_derivation() {
        let layout = layout();
        let key = "voicemail_transcripts/abc123.json";
        assert_eq!(
            layout.recording_key_for_transcript(key).unwrap(),
            "voicemail_recordings/abc123.wav"
        );
        assert_eq!(layout.call_id_from_transcript(key).unwrap(), "abc123");
    }

    #[test]
    fn test_keys_round_trip_through_call_id() {
        let layout = layout();
        let key = layout.recording_key("c-42");
        assert_eq!(key, "voicemail_recordings/c-42.wav");
        assert_eq!(layout.call_id_from_recording(&key).unwrap(), "c-42");
        assert_eq!(layout.transcript_key("c-42"), "voicemail_transcripts/c-42.json");
    }

    #[test]
    fn test_foreign_keys_are_rejected() {
        let layout = layout();
        assert!(layout.call_id_from_transcript("other/abc.json").is_err());
        assert!(layout.call_id_from_transcript("voicemail_transcripts/abc.wav").is_err());
        assert!(layout.call_id_from_transcript("voicemail_transcripts/.json").is_err());
        assert!(layout.call_id_from_transcript("voicemail_transcripts/a/b.json").is_err());
        assert!(layout.call_id_from_transcript("voicemail_transcriptsabc.json").is_err());
    }

    #[test]
    fn test_prefix_slashes_are_normalized() {
        let layout = KeyLayout::new("/voicemail_recordings/", "voicemail_transcripts/");
        assert_eq!(layout.recording_key("x"), "voicemail_recordings/x.wav");
    }

    #[test]
    fn test_tag_string_parsing() {
        let tags = TagSet::parse(
            "vm_lang=en-US&vm_dialedNumber=%2B15551234567&vm_initTimestamp=2021-01-27T22%3A13%3A33Z&vm_recordingUrl=bucket%2Fvoicemail_recordings%2Fabc.wav",
        );
        assert_eq!(tags.len(), 4);
        assert_eq!(tags.get("vm_lang"), Some("en-US"));
        assert_eq!(tags.get("vm_dialedNumber"), Some("+15551234567"));
        assert_eq!(tags.get("vm_initTimestamp"), Some("2021-01-27T22:13:33Z"));
        assert_eq!(tags.get("vm_recordingUrl"), Some("bucket/voicemail_recordings/abc.wav"));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn test_tag_encoding_keeps_order_and_escapes() {
        let mut tags = TagSet::new();
        tags.insert("b", "one two");
        tags.insert("a", "x/y+z");
        tags.insert("b", "three");
        assert_eq!(tags.encode(), "b=three&a=x%2Fy%2Bz");
        assert_eq!(TagSet::parse(&tags.encode()), tags);
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("a b"), "a%20b");
        assert_eq!(encode_component("+1 (555)"), "%2B1%20%28555%29");
        assert_eq!(encode_component("bucket/key.wav"), "bucket%2Fkey.wav");
    }
}
