//! # Fragment-Boundary Tracker
//!
//! Watches the demuxed element stream for the fragment-number tag and decides
//! when a bounded read has gone past its last fragment.
//!
//! ## States:
//! - **Scanning** (initial): audio blocks are forwarded to the accumulator
//! - **Stopped** (terminal): entered the first time a fragment number greater than
//!   the stop boundary is seen; every later element is discarded
//!
//! Fragment numbers run past 64 bits, so they are compared as [`FragmentNumber`]s.

use crate::audio::demux::DemuxedElement;
use crate::audio::fragment::FragmentNumber;
use tracing::{debug, warn};

/// Tag carrying the sequence number of the fragment that follows it.
pub const FRAGMENT_NUMBER_TAG: &str = "AWS_KINESISVIDEO_FRAGMENT_NUMBER";

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Scanning,
    Stopped,
}

/// Scan state threaded through the tracker.
///
/// `should_continue` goes from true to false exactly once and never back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    pub current_tag_name: Option<String>,
    pub current_fragment_sequence: FragmentNumber,
    pub should_continue: bool,
}

impl Default for StreamCursor {
    fn default() -> Self {
        Self {
            current_tag_name: None,
            current_fragment_sequence: FragmentNumber::default(),
            should_continue: true,
        }
    }
}

/// What the caller should do with an observed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Audio payload to append to the accumulator
    Audio(Vec<u8>),
    /// The stop boundary was just crossed; returned exactly once
    Stopped { fragment: FragmentNumber },
    /// Nothing to do
    Ignored,
}

#[derive(Debug)]
pub struct BoundaryTracker {
    stop_fragment: FragmentNumber,
    cursor: StreamCursor,
}

impl BoundaryTracker {
    /// Track a read whose last wanted fragment is `stop_fragment` (inclusive).
    pub fn new(stop_fragment: FragmentNumber) -> Self {
        Self {
            stop_fragment,
            cursor: StreamCursor::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> TrackerState {
        if self.cursor.should_continue {
            TrackerState::Scanning
        } else {
            TrackerState::Stopped
        }
    }

    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    pub fn observe(&mut self, element: DemuxedElement) -> Observation {
        if !self.cursor.should_continue {
            return Observation::Ignored;
        }

        match element {
            DemuxedElement::TagName(name) => {
                self.cursor.current_tag_name = Some(name);
                Observation::Ignored
            }
            DemuxedElement::TagString(value) => {
                if self.cursor.current_tag_name.as_deref() != Some(FRAGMENT_NUMBER_TAG) {
                    return Observation::Ignored;
                }
                let fragment = match value.parse::<FragmentNumber>() {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        warn!(value = %value, error = %e, "Ignoring unparseable fragment number");
                        return Observation::Ignored;
                    }
                };
                self.cursor.current_fragment_sequence = fragment.clone();
                if fragment > self.stop_fragment {
                    self.cursor.should_continue = false;
                    debug!(
                        fragment = %fragment,
                        stop_fragment = %self.stop_fragment,
                        "Fragment boundary passed"
                    );
                    Observation::Stopped { fragment }
                } else {
                    Observation::Ignored
                }
            }
            DemuxedElement::AudioBlock(payload) => Observation::Audio(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_name(name: &str) -> DemuxedElement {
        DemuxedElement::TagName(name.to_string())
    }

    fn tag_string(value: &str) -> DemuxedElement {
        DemuxedElement::TagString(value.to_string())
    }

    fn tracker(stop: &str) -> BoundaryTracker {
        BoundaryTracker::new(stop.parse().unwrap())
    }

    fn stopped(fragment: &str) -> Observation {
        Observation::Stopped {
            fragment: fragment.parse().unwrap(),
        }
    }

    #[test]
    fn test_fragment_past_boundary_stops() {
        let mut tracker = tracker("100");
        assert_eq!(tracker.observe(tag_name(FRAGMENT_NUMBER_TAG)), Observation::Ignored);
        assert_eq!(tracker.observe(tag_string("105")), stopped("105"));
        assert_eq!(tracker.state(), TrackerState::Stopped);
        assert!(!tracker.cursor().should_continue);
    }

    #[test]
    fn test_fragment_within_boundary_keeps_scanning() {
        let mut tracker = tracker("200");
        tracker.observe(tag_name(FRAGMENT_NUMBER_TAG));
        assert_eq!(tracker.observe(tag_string("105")), Observation::Ignored);
        assert_eq!(tracker.state(), TrackerState::Scanning);
        assert_eq!(tracker.cursor().current_fragment_sequence.as_str(), "105");
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let mut tracker = tracker("100");
        tracker.observe(tag_name(FRAGMENT_NUMBER_TAG));
        tracker.observe(tag_string("100"));
        assert_eq!(tracker.state(), TrackerState::Scanning);
    }

    #[test]
    fn test_stops_exactly_once_and_discards_later_audio() {
        let mut tracker = tracker("10");
        let elements = vec![
            tag_name(FRAGMENT_NUMBER_TAG),
            tag_string("10"),
            DemuxedElement::AudioBlock(vec![1, 2]),
            tag_name(FRAGMENT_NUMBER_TAG),
            tag_string("11"),
            DemuxedElement::AudioBlock(vec![3, 4]),
            tag_name(FRAGMENT_NUMBER_TAG),
            tag_string("12"),
            DemuxedElement::AudioBlock(vec![5, 6]),
        ];

        let observations: Vec<Observation> =
            elements.into_iter().map(|e| tracker.observe(e)).collect();

        let stops = observations
            .iter()
            .filter(|o| matches!(o, Observation::Stopped { .. }))
            .count();
        let audio: Vec<&Observation> = observations
            .iter()
            .filter(|o| matches!(o, Observation::Audio(_)))
            .collect();

        assert_eq!(stops, 1);
        assert_eq!(audio, vec![&Observation::Audio(vec![1, 2])]);
    }

    #[test]
    fn test_values_beyond_64_bits_compare_exactly() {
        let stop = "91343852333181432392682062592484938407282117171";
        let mut tracker = tracker(stop);
        tracker.observe(tag_name(FRAGMENT_NUMBER_TAG));
        assert_eq!(tracker.observe(tag_string(stop)), Observation::Ignored);
        tracker.observe(tag_name(FRAGMENT_NUMBER_TAG));
        assert_eq!(
            tracker.observe(tag_string("91343852333181432392682062592484938407282117172")),
            stopped("91343852333181432392682062592484938407282117172")
        );
    }

    #[test]
    fn test_other_tags_and_bad_numbers_are_ignored() {
        let mut tracker = tracker("1");
        tracker.observe(tag_name("AWS_KINESISVIDEO_SERVER_TIMESTAMP"));
        assert_eq!(tracker.observe(tag_string("999")), Observation::Ignored);
        tracker.observe(tag_name(FRAGMENT_NUMBER_TAG));
        assert_eq!(tracker.observe(tag_string("not-a-number")), Observation::Ignored);
        assert_eq!(tracker.state(), TrackerState::Scanning);
    }
}
