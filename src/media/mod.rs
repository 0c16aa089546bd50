//! # Media Stream Transport
//!
//! Pulls a bounded range of a remote, time-indexed media stream.
//!
//! ## Key Components:
//! - **MediaFragmentRequest**: where in which stream to resume reading
//! - **MediaSource**: collaborator trait that opens the chunk stream
//! - **FragmentReader**: drives chunks through the demuxer and boundary tracker
//! - **HttpMediaSource**: HTTP implementation of `MediaSource`

pub mod http;
pub mod reader;

use crate::audio::FragmentNumber;
use crate::error::{VoicemailError, VoicemailResult};
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

pub use http::HttpMediaSource;
pub use reader::{FragmentReader, ReaderLimits};

/// Raw chunks in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = VoicemailResult<Vec<u8>>> + Send>>;

/// Resume point in a remote stream. Created per voicemail record, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFragmentRequest {
    /// Stream address, e.g. `arn:aws:kinesisvideo:region:acct:stream/<name>/<created>`
    pub stream_address: String,
    /// Reading starts with the first fragment after this one
    pub after_fragment_sequence: FragmentNumber,
}

impl MediaFragmentRequest {
    pub fn new(stream_address: impl Into<String>, after_fragment_sequence: FragmentNumber) -> Self {
        Self {
            stream_address: stream_address.into(),
            after_fragment_sequence,
        }
    }

    /// Stream name embedded in the address: the text between the first and last `/`,
    /// or everything after the only `/`.
    pub fn stream_name(&self) -> VoicemailResult<&str> {
        let address = &self.stream_address;
        let first = address.find('/').ok_or_else(|| {
            VoicemailError::Extraction(format!("stream address has no name: {}", address))
        })?;
        let last = address.rfind('/').unwrap_or(first);
        let name = if last > first {
            &address[first + 1..last]
        } else {
            &address[first + 1..]
        };
        if name.is_empty() {
            return Err(VoicemailError::Extraction(format!(
                "stream address has an empty name: {}",
                address
            )));
        }
        Ok(name)
    }
}

/// Opens a chunk stream starting after a given fragment.
///
/// Chunks must be delivered in order and without gaps. Failing to reach the
/// stream, or naming one that does not exist, is an error for the whole record.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn get_media(&self, request: &MediaFragmentRequest) -> VoicemailResult<ChunkStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_name_from_full_address() {
        let request = MediaFragmentRequest::new(
            "arn:aws:kinesisvideo:us-west-2:123456789012:stream/connect-vm-contact-1/1611786412345",
            FragmentNumber::from(7),
        );
        assert_eq!(request.stream_name().unwrap(), "connect-vm-contact-1");
    }

    #[test]
    fn test_stream_name_with_single_separator() {
        let request = MediaFragmentRequest::new("stream/just-a-name", FragmentNumber::from(7));
        assert_eq!(request.stream_name().unwrap(), "just-a-name");
    }

    #[test]
    fn test_stream_name_missing() {
        let first = FragmentNumber::from(1);
        assert!(MediaFragmentRequest::new("no-separator", first.clone()).stream_name().is_err());
        assert!(MediaFragmentRequest::new("stream//", first).stream_name().is_err());
    }
}
