//! HTTP media source: resolves the stream's data endpoint, then opens a
//! streaming `getMedia` response starting after the requested fragment.

use crate::config::MediaConfig;
use crate::error::{VoicemailError, VoicemailResult};
use crate::media::{ChunkStream, MediaFragmentRequest, MediaSource};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DataEndpointRequest<'a> {
    stream_name: &'a str,
    #[serde(rename = "APIName")]
    api_name: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataEndpointResponse {
    data_endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetMediaRequest<'a> {
    stream_name: &'a str,
    start_selector: StartSelector,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartSelector {
    start_selector_type: &'static str,
    /// Decimal string; fragment numbers do not fit JSON numbers
    after_fragment_number: String,
}

pub struct HttpMediaSource {
    client: reqwest::Client,
    control_endpoint: String,
    data_endpoint: Option<String>,
}

impl HttpMediaSource {
    /// No overall request timeout: the pull is long-lived and bounded by the reader.
    pub fn new(config: &MediaConfig) -> VoicemailResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!("voicemail-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            control_endpoint: config.control_endpoint.trim_end_matches('/').to_string(),
            data_endpoint: config
                .data_endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    async fn resolve_data_endpoint(&self, stream_name: &str) -> VoicemailResult<String> {
        if let Some(endpoint) = &self.data_endpoint {
            return Ok(endpoint.clone());
        }

        let response = self
            .client
            .post(format!("{}/getDataEndpoint", self.control_endpoint))
            .json(&DataEndpointRequest {
                stream_name,
                api_name: "GET_MEDIA",
            })
            .send()
            .await
            .map_err(|e| VoicemailError::MediaStream(format!("getDataEndpoint failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VoicemailError::MediaStream(format!(
                "getDataEndpoint for stream {} returned {}",
                stream_name,
                response.status()
            )));
        }

        let body: DataEndpointResponse = response.json().await?;
        Ok(body.data_endpoint.trim_end_matches('/').to_string())
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn get_media(&self, request: &MediaFragmentRequest) -> VoicemailResult<ChunkStream> {
        let stream_name = request.stream_name()?;
        let endpoint = self.resolve_data_endpoint(stream_name).await?;
        debug!(
            stream_name,
            endpoint = %endpoint,
            after = %request.after_fragment_sequence,
            "Opening media stream"
        );

        let response = self
            .client
            .post(format!("{}/getMedia", endpoint))
            .json(&GetMediaRequest {
                stream_name,
                start_selector: StartSelector {
                    start_selector_type: "FRAGMENT_NUMBER",
                    after_fragment_number: request.after_fragment_sequence.to_string(),
                },
            })
            .send()
            .await
            .map_err(|e| VoicemailError::MediaStream(format!("getMedia failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VoicemailError::MediaStream(format!(
                "getMedia for stream {} returned {}",
                stream_name,
                response.status()
            )));
        }

        let chunks = response.bytes_stream().map(|item| {
            item.map(|bytes| bytes.to_vec())
                .map_err(|e| VoicemailError::MediaStream(format!("media stream read failed: {}", e)))
        });
        Ok(chunks.boxed())
    }
}
