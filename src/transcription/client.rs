//! HTTP client for the transcription job API.

use crate::config::TranscriptionConfig;
use crate::error::{VoicemailError, VoicemailResult};
use crate::transcription::{TranscriptionJobRequest, TranscriptionService};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub struct HttpTranscriptionService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranscriptionService {
    pub fn new(config: &TranscriptionConfig) -> VoicemailResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn job_url(&self, job_name: &str) -> VoicemailResult<url::Url> {
        let mut url = url::Url::parse(&format!("{}/jobs", self.endpoint))
            .map_err(|e| VoicemailError::Transcription(format!("bad endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| VoicemailError::Transcription("endpoint cannot carry a path".to_string()))?
            .push(job_name);
        Ok(url)
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> VoicemailResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(VoicemailError::Transcription(format!(
        "{} returned {}: {}",
        action, status, body
    )))
}

#[async_trait]
impl TranscriptionService for HttpTranscriptionService {
    async fn start_job(&self, request: &TranscriptionJobRequest) -> VoicemailResult<()> {
        debug!(job = %request.transcription_job_name, "Starting transcription job");
        let response = self
            .client
            .post(format!("{}/jobs", self.endpoint))
            .json(request)
            .send()
            .await?;
        check_status(response, "start job").await?;
        info!(
            job = %request.transcription_job_name,
            language = %request.language_code,
            "Transcription job started"
        );
        Ok(())
    }

    async fn delete_job(&self, job_name: &str) -> VoicemailResult<()> {
        let response = self.client.delete(self.job_url(job_name)?).send().await?;
        check_status(response, "delete job").await?;
        debug!(job = job_name, "Transcription job deleted");
        Ok(())
    }
}
