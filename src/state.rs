//! # Application State
//!
//! Shared state handed to every request handler through `web::Data`.
//!
//! ## Shared pieces:
//! - **config**: the effective configuration, read-only once the server is up
//! - **metrics**: request counters, per-endpoint timing and voicemail counters
//!   behind an `Arc<RwLock<_>>`; every request writes to it
//! - **pipelines**: the three voicemail handlers and their collaborators
//!
//! The audio-processing handler owns the per-invocation accumulation state, so it
//! sits behind an async mutex: two audio invocations arriving at once are processed
//! one after the other, never interleaved.

use crate::audio::PcmEncoder;
use crate::config::AppConfig;
use crate::error::VoicemailResult;
use crate::integration::{HttpTelephonyIntegration, TelephonyClient};
use crate::media::{FragmentReader, HttpMediaSource, ReaderLimits};
use crate::storage::{FsObjectStore, KeyLayout, ObjectStore};
use crate::transcription::{HttpTranscriptionService, TranscriptionService};
use crate::voicemail::{
    ArtifactPublisher, AudioProcessingHandler, BatchSummary, PackagingOrchestrator, RecordingTranscriber,
    RoutingPolicy,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
    pub pipelines: Arc<Pipelines>,
}

/// The voicemail handlers, wired to their collaborators.
pub struct Pipelines {
    pub audio: Mutex<AudioProcessingHandler>,
    pub transcriber: RecordingTranscriber,
    pub packaging: PackagingOrchestrator,
}

impl Pipelines {
    pub fn new(
        audio: AudioProcessingHandler,
        transcriber: RecordingTranscriber,
        packaging: PackagingOrchestrator,
    ) -> Self {
        Self {
            audio: Mutex::new(audio),
            transcriber,
            packaging,
        }
    }

    /// Build the production pipelines: filesystem object store and HTTP collaborators.
    pub fn from_config(config: &AppConfig) -> VoicemailResult<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(&config.storage.root_dir));
        let layout = KeyLayout::from_config(&config.storage);
        let transcription: Arc<dyn TranscriptionService> =
            Arc::new(HttpTranscriptionService::new(&config.transcription)?);

        let reader = FragmentReader::new(
            Arc::new(HttpMediaSource::new(&config.media)?),
            ReaderLimits::from_config(config),
        );
        let publisher = ArtifactPublisher::new(
            store.clone(),
            config.storage.recordings_bucket.clone(),
            layout.clone(),
        );
        let audio = AudioProcessingHandler::new(reader, PcmEncoder::default(), publisher);

        let transcriber = RecordingTranscriber::new(
            store.clone(),
            transcription.clone(),
            layout.clone(),
            config.transcription.default_language.clone(),
        );

        let packaging = PackagingOrchestrator::new(
            store,
            TelephonyClient::new(Arc::new(HttpTelephonyIntegration::new(&config.integration)?)),
            transcription,
            layout,
            RoutingPolicy::from_config(config),
        );

        Ok(Self::new(audio, transcriber, packaging))
    }
}

/// Counters collected across all requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Key: `"METHOD /path"`
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
    pub voicemail: VoicemailCounters,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VoicemailCounters {
    pub records_seen: u64,
    pub records_processed: u64,
    pub records_failed: u64,
    pub transcriptions_started: u64,
    pub transcriptions_failed: u64,
    pub transcripts_packaged: u64,
    pub packaging_failures: u64,
    pub routing_attempts: u64,
    pub routing_exhausted: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> VoicemailResult<Self> {
        let pipelines = Pipelines::from_config(&config)?;
        Ok(Self::with_pipelines(config, pipelines))
    }

    pub fn with_pipelines(config: AppConfig, pipelines: Pipelines) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            pipelines: Arc::new(pipelines),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    // A panic while holding the lock only ever leaves counters half-updated.
    fn read_metrics(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_metrics(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn record_batch(&self, summary: &BatchSummary) {
        let counters = &mut self.write_metrics().voicemail;
        counters.records_seen += summary.total as u64;
        counters.records_processed += summary.processed as u64;
        counters.records_failed += summary.failed() as u64;
    }

    pub fn record_transcription(&self, started: bool) {
        let counters = &mut self.write_metrics().voicemail;
        if started {
            counters.transcriptions_started += 1;
        } else {
            counters.transcriptions_failed += 1;
        }
    }

    pub fn record_packaging(&self, routing_attempts: usize, routed: bool) {
        let counters = &mut self.write_metrics().voicemail;
        counters.transcripts_packaged += 1;
        counters.routing_attempts += routing_attempts as u64;
        if !routed {
            counters.routing_exhausted += 1;
        }
    }

    pub fn record_packaging_failure(&self) {
        self.write_metrics().voicemail.packaging_failures += 1;
    }

    /// Copy of the current metrics, taken under a single read lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.read_metrics().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::fixtures::RecordingIntegration;
    use crate::media::reader::fixtures::ScriptedMediaSource;

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let (state, _) = fixtures::test_state(ScriptedMediaSource::unreachable(), RecordingIntegration::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_production_state_builds_from_defaults() {
        let state = AppState::new(AppConfig::default()).unwrap();
        assert_eq!(state.get_config().voicemail.routing_max_attempts, 4);
        assert_eq!(state.get_uptime_seconds(), 0);
    }

    #[test]
    fn test_voicemail_counters() {
        let (state, _) = fixtures::test_state(ScriptedMediaSource::unreachable(), RecordingIntegration::default());
        state.record_batch(&BatchSummary {
            status: "Complete. Processed 2 of 3 records.".to_string(),
            record_results: serde_json::Map::new(),
            processed: 2,
            total: 3,
        });
        state.record_transcription(true);
        state.record_transcription(false);
        state.record_packaging(4, false);
        state.record_packaging_failure();

        let counters = state.get_metrics_snapshot().voicemail;
        assert_eq!(counters.records_seen, 3);
        assert_eq!(counters.records_processed, 2);
        assert_eq!(counters.records_failed, 1);
        assert_eq!(counters.transcriptions_started, 1);
        assert_eq!(counters.transcriptions_failed, 1);
        assert_eq!(counters.routing_attempts, 4);
        assert_eq!(counters.routing_exhausted, 1);
        assert_eq!(counters.packaging_failures, 1);
    }
}
