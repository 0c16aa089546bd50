//! # Trigger Events and Contact Records
//!
//! Shapes of the events that start each voicemail stage, and the extraction
//! rules applied to a contact trace record before any audio is pulled.
//!
//! ## Voicemail Flag (`vm_flag` attribute):
//! - `"1"` with `vm_lang` and `vm_from` set: a voicemail waiting to be processed
//! - `"0"`: already processed, ignored
//! - anything else, or missing: not a valid voicemail, ignored

use crate::audio::FragmentNumber;
use crate::error::{VoicemailError, VoicemailResult};
use crate::storage::encode_component;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Queue batch delivered to the audio-processing stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub kinesis: QueuePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePayload {
    /// Base64 text of a JSON contact trace record
    pub data: String,
}

/// Object-created notification for the transcription and packaging stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCreatedEvent {
    pub detail: ObjectCreatedDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCreatedDetail {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
}

impl ObjectCreatedEvent {
    #[cfg(test)]
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            detail: ObjectCreatedDetail {
                bucket: BucketRef {
                    name: bucket.to_string(),
                },
                object: ObjectRef {
                    key: key.to_string(),
                },
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.detail.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.detail.object.key
    }
}

/// The parts of a contact trace record the voicemail flow reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactTraceRecord {
    pub contact_id: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    #[serde(default)]
    pub recordings: Vec<RecordingLocation>,
    #[serde(default)]
    pub system_endpoint: Option<SystemEndpoint>,
    #[serde(default)]
    pub initiation_timestamp: Option<String>,
    #[serde(default)]
    pub disconnect_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordingLocation {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub fragment_start_number: Option<Value>,
    #[serde(default)]
    pub fragment_stop_number: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemEndpoint {
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoicemailFlag {
    Pending,
    AlreadyProcessed,
    Invalid,
}

/// Where to read a voicemail's audio from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocation {
    pub stream_address: String,
    pub start_fragment: FragmentNumber,
    pub stop_fragment: FragmentNumber,
}

/// Per-call values written into the recording's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAttributes {
    pub language: String,
    pub dialed_number: String,
    pub init_timestamp: String,
    pub end_timestamp: String,
}

impl CallAttributes {
    /// `vm_lang=..&vm_dialedNumber=..&vm_initTimestamp=..&vm_endTimestamp=..`, values URL-encoded.
    pub fn tag_prefix(&self) -> String {
        format!(
            "vm_lang={}&vm_dialedNumber={}&vm_initTimestamp={}&vm_endTimestamp={}",
            encode_component(&self.language),
            encode_component(&self.dialed_number),
            encode_component(&self.init_timestamp),
            encode_component(&self.end_timestamp),
        )
    }
}

impl ContactTraceRecord {
    /// Decode one queue record's payload.
    pub fn decode(data: &str) -> VoicemailResult<Self> {
        let raw = general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| VoicemailError::Extraction(format!("payload is not base64: {}", e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| VoicemailError::Extraction(format!("payload is not a contact record: {}", e)))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn voicemail_flag(&self) -> VoicemailFlag {
        match self.attribute("vm_flag").unwrap_or("99") {
            "0" => VoicemailFlag::AlreadyProcessed,
            "1" if self.attribute("vm_lang").is_some() && self.attribute("vm_from").is_some() => {
                VoicemailFlag::Pending
            }
            _ => VoicemailFlag::Invalid,
        }
    }

    pub fn stream_location(&self) -> VoicemailResult<StreamLocation> {
        let recording = self
            .recordings
            .first()
            .ok_or_else(|| VoicemailError::Extraction("record has no recordings".to_string()))?;
        let stream_address = recording
            .location
            .clone()
            .filter(|l| l.contains('/'))
            .ok_or_else(|| VoicemailError::Extraction("recording has no stream location".to_string()))?;

        Ok(StreamLocation {
            stream_address,
            start_fragment: fragment_number(recording.fragment_start_number.as_ref(), "start")?,
            stop_fragment: fragment_number(recording.fragment_stop_number.as_ref(), "stop")?,
        })
    }

    pub fn call_attributes(&self) -> VoicemailResult<CallAttributes> {
        let missing = |what: &str| VoicemailError::Extraction(format!("record is missing {}", what));

        Ok(CallAttributes {
            language: self.attribute("vm_lang").ok_or_else(|| missing("vm_lang"))?.to_string(),
            dialed_number: self
                .system_endpoint
                .as_ref()
                .and_then(|e| e.address.clone())
                .ok_or_else(|| missing("SystemEndpoint.Address"))?,
            init_timestamp: self
                .initiation_timestamp
                .clone()
                .ok_or_else(|| missing("InitiationTimestamp"))?,
            end_timestamp: self
                .disconnect_timestamp
                .clone()
                .ok_or_else(|| missing("DisconnectTimestamp"))?,
        })
    }
}

/// Fragment numbers arrive as decimal strings (occasionally as JSON numbers).
fn fragment_number(value: Option<&Value>, which: &str) -> VoicemailResult<FragmentNumber> {
    let parsed = match value {
        Some(Value::String(s)) => s.parse::<FragmentNumber>().ok(),
        Some(Value::Number(n)) => n.as_u64().map(FragmentNumber::from),
        _ => None,
    };
    parsed.ok_or_else(|| VoicemailError::Extraction(format!("unusable {} fragment number", which)))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ContactTraceRecord {
        ContactTraceRecord::decode(&encode(&value)).unwrap()
    }

    #[test]
    fn test_flag_classification() {
        assert_eq!(record(contact_record("a", "1")).voicemail_flag(), VoicemailFlag::Pending);
        assert_eq!(
            record(contact_record("a", "0")).voicemail_flag(),
            VoicemailFlag::AlreadyProcessed
        );
        assert_eq!(record(contact_record("a", "7")).voicemail_flag(), VoicemailFlag::Invalid);

        let mut no_lang = contact_record("a", "1");
        no_lang["Attributes"]["vm_lang"] = json!("");
        assert_eq!(record(no_lang).voicemail_flag(), VoicemailFlag::Invalid);

        let no_flag = json!({"ContactId": "a", "Attributes": {}});
        assert_eq!(record(no_flag).voicemail_flag(), VoicemailFlag::Invalid);
    }

    #[test]
    fn test_stream_location_keeps_wide_fragment_numbers() {
        let location = record(contact_record("a", "1")).stream_location().unwrap();
        assert_eq!(
            location.start_fragment.as_str(),
            "91343852333181432392682062592484938407282117171"
        );
        assert!(location.stop_fragment > location.start_fragment);
        assert!(location.stream_address.ends_with("stream/vm-a/1611785600000"));

        let mut value = contact_record("a", "1");
        value["Recordings"][0]["FragmentStopNumber"] = json!(91343852333181499u64);
        let location = record(value).stream_location().unwrap();
        assert_eq!(location.stop_fragment, FragmentNumber::from(91343852333181499));
    }

    #[test]
    fn test_stream_location_failures() {
        let mut value = contact_record("a", "1");
        value["Recordings"] = json!([]);
        assert!(record(value).stream_location().is_err());

        let mut value = contact_record("a", "1");
        value["Recordings"][0]["FragmentStopNumber"] = json!("12abc");
        assert!(record(value).stream_location().is_err());
    }

    #[test]
    fn test_tag_prefix_is_url_encoded() {
        let attributes = record(contact_record("a", "1")).call_attributes().unwrap();
        assert_eq!(
            attributes.tag_prefix(),
            "vm_lang=en-US&vm_dialedNumber=%2B15551234567&vm_initTimestamp=2021-01-27T22%3A13%3A33Z&vm_endTimestamp=2021-01-27T22%3A14%3A01Z"
        );
    }

    #[test]
    fn test_missing_tag_sources() {
        let mut value = contact_record("a", "1");
        value.as_object_mut().unwrap().remove("SystemEndpoint");
        assert!(record(value).call_attributes().is_err());
    }

    #[test]
    fn test_undecodable_payloads() {
        assert!(ContactTraceRecord::decode("%%% not base64").is_err());
        let not_json = general_purpose::STANDARD.encode("hello");
        assert!(ContactTraceRecord::decode(&not_json).is_err());
    }

    #[test]
    fn test_object_created_event_shape() {
        let event: ObjectCreatedEvent = serde_json::from_value(json!({
            "detail": {"bucket": {"name": "vm"}, "object": {"key": "voicemail_transcripts/a.json"}}
        }))
        .unwrap();
        assert_eq!(event.bucket(), "vm");
        assert_eq!(event.key(), "voicemail_transcripts/a.json");
    }
}
