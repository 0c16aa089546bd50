//! HTTP transport for the integration function.
//!
//! A response counts as a function-level error when the status is not 2xx or
//! the `X-Function-Error` header is present; both still return `Ok` so the
//! caller can decide what a failed call means.

use crate::config::IntegrationConfig;
use crate::error::{VoicemailError, VoicemailResult};
use crate::integration::{IntegrationRequest, InvocationOutcome, TelephonyIntegration};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const FUNCTION_ERROR_HEADER: &str = "x-function-error";

pub struct HttpTelephonyIntegration {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelephonyIntegration {
    pub fn new(config: &IntegrationConfig) -> VoicemailResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

fn outcome_from_parts(status_code: u16, function_error: Option<String>, body: &[u8]) -> InvocationOutcome {
    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    };

    let function_error = function_error.or_else(|| {
        (!(200..300).contains(&status_code)).then(|| format!("status {}", status_code))
    });

    InvocationOutcome {
        status_code,
        function_error,
        payload,
    }
}

#[async_trait]
impl TelephonyIntegration for HttpTelephonyIntegration {
    async fn invoke(&self, request: &IntegrationRequest) -> VoicemailResult<InvocationOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request.envelope())
            .send()
            .await
            .map_err(|e| VoicemailError::integration(&request.method_name, e.to_string()))?;

        let status_code = response.status().as_u16();
        let function_error = response
            .headers()
            .get(FUNCTION_ERROR_HEADER)
            .map(|value| value.to_str().unwrap_or("Unhandled").to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| VoicemailError::integration(&request.method_name, e.to_string()))?;

        Ok(outcome_from_parts(status_code, function_error, &body))
    }
}
