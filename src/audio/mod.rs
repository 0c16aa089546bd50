//! # Audio Reconstruction Module
//!
//! Turns the container stream pulled from the media transport into a WAV file.
//!
//! ## Key Components:
//! - **Demuxer**: incremental container parser producing tag and audio-block elements
//! - **Boundary Tracker**: stops a bounded read once the last wanted fragment has passed
//! - **FragmentNumber**: arbitrary-width fragment sequence number
//! - **Accumulator**: ordered raw audio blocks for the record being processed
//! - **Encoder**: 8kHz / mono / 16-bit PCM WAV writer
//!
//! ## Data Flow:
//! ```text
//! chunks → ContainerDemuxer → BoundaryTracker → AudioAccumulator → PcmEncoder → WAV bytes
//! ```

pub mod accumulator;
pub mod boundary;
pub mod demux;
pub mod encoder;
pub mod fragment;

pub use accumulator::AudioAccumulator;
pub use boundary::{BoundaryTracker, Observation};
pub use demux::ContainerDemuxer;
pub use encoder::{PcmContainer, PcmEncoder};
pub use fragment::FragmentNumber;
