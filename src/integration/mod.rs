//! # CRM Integration Layer
//!
//! The packaging step talks to the CRM only through an opaque integration
//! function. Every call posts the same envelope:
//!
//! ```json
//! {"Details": {"Parameters": {"methodName": "...", "contactId": "...", "fieldValues": {...}}}}
//! ```
//!
//! and gets back an [`InvocationOutcome`]. A transport failure is an error;
//! a function-level failure (the function ran but reported an error) is an
//! outcome the caller inspects, which is what drives the routing retry loop.

pub mod client;
pub mod http;

use crate::error::VoicemailResult;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use client::{TelephonyClient, VoiceCallUpdate, VoicemailMessage};
pub use http::HttpTelephonyIntegration;

/// One integration call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRequest {
    pub method_name: String,
    pub contact_id: String,
    pub field_values: Value,
}

impl IntegrationRequest {
    pub fn new(method_name: &str, contact_id: &str, field_values: Value) -> Self {
        Self {
            method_name: method_name.to_string(),
            contact_id: contact_id.to_string(),
            field_values,
        }
    }

    /// Wire envelope expected by the integration function.
    pub fn envelope(&self) -> Value {
        serde_json::json!({ "Details": { "Parameters": self } })
    }
}

/// Result of a call that reached the integration function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationOutcome {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_error: Option<String>,
    pub payload: Value,
}

impl InvocationOutcome {
    pub fn ok(payload: Value) -> Self {
        Self {
            status_code: 200,
            function_error: None,
            payload,
        }
    }

    #[cfg(test)]
    pub fn function_failed(message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            function_error: Some(message.into()),
            payload: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && self.function_error.is_none()
    }
}

#[async_trait]
pub trait TelephonyIntegration: Send + Sync {
    async fn invoke(&self, request: &IntegrationRequest) -> VoicemailResult<InvocationOutcome>;
}
