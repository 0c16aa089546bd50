//! # Transcription Module
//!
//! Asynchronous speech-to-text jobs. Recordings are handed to an external
//! transcription service, which later writes its transcript JSON back into
//! object storage where the packaging step picks it up.
//!
//! ## Key Components:
//! - **TranscriptionJobRequest**: input media, language and output location of a job
//! - **TranscriptionService**: start-job / delete-job collaborator trait
//! - **HttpTranscriptionService**: JSON-over-HTTP implementation
//! - **Transcript**: the parts of the service's output document we read

pub mod client;

use crate::error::{VoicemailError, VoicemailResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::HttpTranscriptionService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscriptionJobRequest {
    pub transcription_job_name: String,
    pub language_code: String,
    pub media_format: String,
    pub media: JobMedia,
    pub output_bucket_name: String,
    pub output_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobMedia {
    pub media_file_uri: String,
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn start_job(&self, request: &TranscriptionJobRequest) -> VoicemailResult<()>;

    async fn delete_job(&self, job_name: &str) -> VoicemailResult<()>;
}

/// Transcript document written by the transcription service.
///
/// Only `results.transcripts[*].transcript` is read; everything else
/// (items, alternatives, speaker labels) is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    #[serde(rename = "jobName", default)]
    pub job_name: Option<String>,
    pub results: TranscriptResults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptResults {
    #[serde(default)]
    pub transcripts: Vec<TranscriptText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptText {
    pub transcript: String,
}

impl Transcript {
    pub fn parse(raw: &[u8]) -> VoicemailResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| VoicemailError::Transcript(format!("unreadable transcript document: {}", e)))
    }

    /// The first transcript string in the document.
    pub fn first_text(&self) -> VoicemailResult<&str> {
        self.results
            .transcripts
            .first()
            .map(|t| t.transcript.as_str())
            .ok_or_else(|| VoicemailError::Transcript("transcript document has no transcripts".to_string()))
    }
}
