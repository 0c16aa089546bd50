//! # Configuration Management
//!
//! Loads the service configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables (`APP__SECTION__KEY`)
//! - Legacy deployment variables inherited from the per-handler deployments
//!   (`s3_recordings_bucket`, `invoke_telephony_integration_api_arn`, `HOST`, `PORT`)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Legacy deployment variables
//! 2. `APP__` environment variables (e.g. `APP__VOICEMAIL__ROUTING_RETRY_DELAY_SECS=5`)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration, grouped by collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub media: MediaConfig,
    pub integration: IntegrationConfig,
    pub transcription: TranscriptionConfig,
    pub voicemail: VoicemailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Durable object storage settings.
///
/// ## Fields:
/// - `root_dir`: directory backing the filesystem object store
/// - `recordings_bucket`: bucket the audio publisher writes recordings into
/// - `recordings_prefix` / `transcripts_prefix`: key prefixes (no trailing slash).
///   The packaging step derives a recording key from a transcript key by swapping
///   these prefixes, so they must stay in sync with whatever writes the transcripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
    pub recordings_bucket: String,
    pub recordings_prefix: String,
    pub transcripts_prefix: String,
}

/// Remote media stream transport settings.
///
/// ## Fields:
/// - `control_endpoint`: where data endpoints are looked up
/// - `data_endpoint`: fixed data endpoint; skips the lookup when set
/// - `chunk_idle_timeout_secs`: longest wait for the next chunk before the pull is
///   treated as ended
/// - `max_pull_secs`: hard cap on a single fragment pull
/// - `max_element_bytes`: largest container element the demuxer will buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub control_endpoint: String,
    pub data_endpoint: Option<String>,
    pub chunk_idle_timeout_secs: u64,
    pub max_pull_secs: u64,
    pub max_element_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub endpoint: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub endpoint: String,
    pub default_language: String,
}

/// Voicemail packaging behaviour.
///
/// ## Routing retry:
/// The routing call is attempted at most `routing_max_attempts` times with a fixed
/// `routing_retry_delay_secs` pause between attempts. There is no backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicemailConfig {
    pub routing_max_attempts: u32,
    pub routing_retry_delay_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                root_dir: "./data".to_string(),
                recordings_bucket: "voicemail-recordings".to_string(),
                recordings_prefix: "voicemail_recordings".to_string(),
                transcripts_prefix: "voicemail_transcripts".to_string(),
            },
            media: MediaConfig {
                control_endpoint: "http://127.0.0.1:4566".to_string(),
                data_endpoint: None,
                chunk_idle_timeout_secs: 30,
                max_pull_secs: 600,
                max_element_bytes: 16 * 1024 * 1024,
            },
            integration: IntegrationConfig {
                endpoint: "http://127.0.0.1:9000/invoke".to_string(),
                request_timeout_secs: 30,
            },
            transcription: TranscriptionConfig {
                endpoint: "http://127.0.0.1:9100".to_string(),
                default_language: "en-US".to_string(),
            },
            voicemail: VoicemailConfig {
                routing_max_attempts: 4,
                routing_retry_delay_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`: Override server port
    /// - `APP__MEDIA__DATA_ENDPOINT=https://media.example`: Pin the media data endpoint
    /// - `s3_recordings_bucket=vm-prod`: Legacy name for `storage.recordings_bucket`
    /// - `invoke_telephony_integration_api_arn=...`: Legacy name for `integration.endpoint`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__"),
            );

        let legacy = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("s3_recordings_bucket", "storage.recordings_bucket"),
            ("invoke_telephony_integration_api_arn", "integration.endpoint"),
        ];
        for (var, key) in legacy {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.recordings_bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("Recordings bucket must be set"));
        }

        let recordings = self.storage.recordings_prefix.trim_matches('/');
        let transcripts = self.storage.transcripts_prefix.trim_matches('/');
        if recordings.is_empty() || transcripts.is_empty() {
            return Err(anyhow::anyhow!("Storage prefixes must not be empty"));
        }
        if recordings == transcripts {
            return Err(anyhow::anyhow!(
                "Recordings and transcripts prefixes must differ"
            ));
        }

        if self.media.chunk_idle_timeout_secs == 0 || self.media.max_pull_secs == 0 {
            return Err(anyhow::anyhow!("Media timeouts must be greater than 0"));
        }

        if self.media.max_element_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum element size must be greater than 0"));
        }

        if self.integration.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Integration timeout must be greater than 0"));
        }

        if self.voicemail.routing_max_attempts == 0 {
            return Err(anyhow::anyhow!("Routing attempts must be at least 1"));
        }

        Ok(())
    }

    pub fn chunk_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.media.chunk_idle_timeout_secs)
    }

    pub fn max_pull_duration(&self) -> Duration {
        Duration::from_secs(self.media.max_pull_secs)
    }

    pub fn routing_retry_delay(&self) -> Duration {
        Duration::from_secs(self.voicemail.routing_retry_delay_secs)
    }
}
