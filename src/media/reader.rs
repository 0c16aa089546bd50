//! # Fragment Reader
//!
//! Drives one bounded pull of a remote media stream: chunks are fed to the
//! demuxer as they arrive, demuxed elements go through the boundary tracker,
//! and in-range audio blocks land in the caller's accumulator.
//!
//! ## When a pull ends:
//! - **BoundaryReached**: a fragment past the stop boundary was seen; the rest
//!   of the transport stream is dropped without being drained
//! - **TransportEnded**: the remote side closed the stream
//! - **IdleTimeout**: no chunk arrived within the idle limit
//! - **DeadlineExceeded**: the whole pull ran longer than the pull limit
//!
//! All four leave the accumulated audio in place as the complete recording.
//! A transport error or a malformed container fails the pull instead.

use crate::audio::{AudioAccumulator, BoundaryTracker, ContainerDemuxer, FragmentNumber, Observation};
use crate::config::AppConfig;
use crate::error::VoicemailResult;
use crate::media::{MediaFragmentRequest, MediaSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Limits applied to a single pull.
#[derive(Debug, Clone, Copy)]
pub struct ReaderLimits {
    pub chunk_idle_timeout: Duration,
    pub max_pull_duration: Duration,
    pub max_element_bytes: u64,
}

impl ReaderLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chunk_idle_timeout: config.chunk_idle_timeout(),
            max_pull_duration: config.max_pull_duration(),
            max_element_bytes: config.media.max_element_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    BoundaryReached { fragment: FragmentNumber },
    TransportEnded,
    IdleTimeout,
    DeadlineExceeded,
}

/// Outcome of a finished pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReport {
    pub end: StreamEnd,
    pub chunks: usize,
    pub bytes: u64,
    /// Audio blocks forwarded to the accumulator
    pub blocks: usize,
    /// Last fragment number seen in the stream (0 if none)
    pub last_fragment: FragmentNumber,
}

pub struct FragmentReader {
    source: Arc<dyn MediaSource>,
    limits: ReaderLimits,
}

impl FragmentReader {
    pub fn new(source: Arc<dyn MediaSource>, limits: ReaderLimits) -> Self {
        Self { source, limits }
    }

    /// Pull from `request` until the stream passes `stop_fragment`, appending
    /// in-range audio blocks to `accumulator` in arrival order.
    pub async fn read_into(
        &self,
        request: &MediaFragmentRequest,
        stop_fragment: &FragmentNumber,
        accumulator: &mut AudioAccumulator,
    ) -> VoicemailResult<ReadReport> {
        let started = Instant::now();
        let deadline = started + self.limits.max_pull_duration;

        let mut stream = self.source.get_media(request).await?;
        let mut demuxer = ContainerDemuxer::new(self.limits.max_element_bytes);
        let mut tracker = BoundaryTracker::new(stop_fragment.clone());

        let mut chunks = 0usize;
        let mut bytes = 0u64;
        let mut blocks = 0usize;

        let end = 'pull: loop {
            let now = Instant::now();
            if now >= deadline {
                break StreamEnd::DeadlineExceeded;
            }
            let wait = self.limits.chunk_idle_timeout.min(deadline - now);

            let chunk = match timeout(wait, stream.next()).await {
                Err(_) if Instant::now() >= deadline => break StreamEnd::DeadlineExceeded,
                Err(_) => break StreamEnd::IdleTimeout,
                Ok(None) => break StreamEnd::TransportEnded,
                Ok(Some(chunk)) => chunk?,
            };
            chunks += 1;
            bytes += chunk.len() as u64;

            for element in demuxer.push(&chunk)? {
                match tracker.observe(element) {
                    Observation::Audio(block) => {
                        blocks += 1;
                        accumulator.push(block);
                    }
                    Observation::Stopped { fragment } => {
                        break 'pull StreamEnd::BoundaryReached { fragment };
                    }
                    Observation::Ignored => {}
                }
            }
        };
        // Dropping the stream here closes the transport without reading further
        drop(stream);

        let report = ReadReport {
            end,
            chunks,
            bytes,
            blocks,
            last_fragment: tracker.cursor().current_fragment_sequence.clone(),
        };

        match &report.end {
            StreamEnd::BoundaryReached { fragment } => {
                debug!(
                    stream = %request.stream_address,
                    fragment = %fragment,
                    chunks = report.chunks,
                    bytes = report.bytes,
                    blocks = report.blocks,
                    "Fragment pull reached its stop boundary"
                );
            }
            StreamEnd::TransportEnded => {
                if !demuxer.is_at_boundary() {
                    debug!(
                        pending_bytes = demuxer.buffered(),
                        consumed_bytes = demuxer.position(),
                        "Stream ended inside an element; partial element discarded"
                    );
                }
                info!(
                    stream = %request.stream_address,
                    stop_fragment = %stop_fragment,
                    last_fragment = %report.last_fragment,
                    bytes = report.bytes,
                    "Stream ended before the stop boundary"
                );
            }
            StreamEnd::IdleTimeout | StreamEnd::DeadlineExceeded => {
                warn!(
                    stream = %request.stream_address,
                    stop_fragment = %stop_fragment,
                    last_fragment = %report.last_fragment,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    end = ?report.end,
                    "Fragment pull cut short by timeout; keeping audio received so far"
                );
            }
        }

        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::audio::demux::fixtures::fragment;
    use crate::error::VoicemailError;

    fn limits() -> ReaderLimits {
        ReaderLimits {
            chunk_idle_timeout: Duration::from_secs(30),
            max_pull_duration: Duration::from_secs(600),
            max_element_bytes: 1024 * 1024,
        }
    }

    fn request() -> MediaFragmentRequest {
        MediaFragmentRequest::new(
            "arn:aws:kinesisvideo:us-east-1:1:stream/vm-1/123",
            FragmentNumber::from(100),
        )
    }

    fn reader(source: ScriptedMediaSource) -> FragmentReader {
        FragmentReader::new(Arc::new(source), limits())
    }

    /// Split a stream into fixed-size chunks.
    fn chunked(stream: &[u8], size: usize) -> Vec<Vec<u8>> {
        stream.chunks(size).map(|c| c.to_vec()).collect()
    }

    #[tokio::test]
    async fn test_stops_at_boundary_and_keeps_only_in_range_audio() {
        let mut stream = fragment(100, &[&[1, 0], &[2, 0]]);
        stream.extend(fragment(101, &[&[3, 0]]));
        stream.extend(fragment(102, &[&[4, 0]]));

        let reader = reader(ScriptedMediaSource::new(chunked(&stream, 7), Tail::Hang));
        let mut acc = AudioAccumulator::new();
        let report = reader.read_into(&request(), &FragmentNumber::from(100), &mut acc).await.unwrap();

        assert_eq!(
            report.end,
            StreamEnd::BoundaryReached {
                fragment: FragmentNumber::from(101)
            }
        );
        assert_eq!(report.last_fragment, FragmentNumber::from(101));
        assert_eq!(acc.blocks(), &[vec![1, 0], vec![2, 0]]);
        assert_eq!(report.blocks, 2);
    }

    #[tokio::test]
    async fn test_transport_end_before_boundary_keeps_audio() {
        let stream = fragment(100, &[&[1, 0], &[2, 0]]);
        let reader = reader(ScriptedMediaSource::new(chunked(&stream, 5), Tail::End));
        let mut acc = AudioAccumulator::new();
        let report = reader.read_into(&request(), &FragmentNumber::from(500), &mut acc).await.unwrap();

        assert_eq!(report.end, StreamEnd::TransportEnded);
        assert_eq!(acc.total_bytes(), 4);
        assert_eq!(report.bytes, stream.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_times_out_gracefully() {
        let stream = fragment(100, &[&[9, 9]]);
        let reader = reader(ScriptedMediaSource::new(vec![stream], Tail::Hang));
        let mut acc = AudioAccumulator::new();
        let report = reader.read_into(&request(), &FragmentNumber::from(500), &mut acc).await.unwrap();

        assert_eq!(report.end, StreamEnd::IdleTimeout);
        assert_eq!(acc.blocks(), &[vec![9, 9]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_caps_the_pull() {
        let limits = ReaderLimits {
            chunk_idle_timeout: Duration::from_secs(30),
            max_pull_duration: Duration::from_secs(10),
            max_element_bytes: 1024,
        };
        let reader = FragmentReader::new(
            Arc::new(ScriptedMediaSource::new(Vec::new(), Tail::Hang)),
            limits,
        );
        let mut acc = AudioAccumulator::new();
        let report = reader.read_into(&request(), &FragmentNumber::from(500), &mut acc).await.unwrap();

        assert_eq!(report.end, StreamEnd::DeadlineExceeded);
        assert!(acc.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_stream_fails() {
        let reader = reader(ScriptedMediaSource::unreachable());
        let mut acc = AudioAccumulator::new();
        let err = reader.read_into(&request(), &FragmentNumber::from(500), &mut acc).await.unwrap_err();
        assert!(matches!(err, VoicemailError::MediaStream(_)));
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_fails() {
        let stream = fragment(100, &[&[1, 0]]);
        let reader = reader(ScriptedMediaSource::new(
            vec![stream],
            Tail::Fail("connection reset".to_string()),
        ));
        let mut acc = AudioAccumulator::new();
        let err = reader.read_into(&request(), &FragmentNumber::from(500), &mut acc).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_source_receives_request() {
        let source = Arc::new(ScriptedMediaSource::new(Vec::new(), Tail::End));
        let reader = FragmentReader::new(source.clone(), limits());
        let mut acc = AudioAccumulator::new();
        reader.read_into(&request(), &FragmentNumber::from(1), &mut acc).await.unwrap();

        assert_eq!(source.request_count(), 1);
        assert_eq!(
            source.requests.lock().unwrap()[0].after_fragment_sequence,
            FragmentNumber::from(100)
        );
    }
}
