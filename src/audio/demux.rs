//! # Container Demuxer
//!
//! Incremental parser for the tag-structured (EBML/Matroska) container that the
//! media transport delivers. Bytes arrive in arbitrary chunks; the demuxer turns
//! them into a flat sequence of [`DemuxedElement`]s without ever holding more than
//! the element currently being read.
//!
//! ## Element Layout:
//! Every element is `ID | SIZE | PAYLOAD`:
//! - **ID**: variable-length integer, 1-4 bytes, length marker kept in the value
//! - **SIZE**: variable-length integer, 1-8 bytes, length marker stripped;
//!   all value bits set means "unknown size"
//! - **PAYLOAD**: child elements for master elements, raw bytes otherwise
//!
//! ## Parsing Strategy:
//! Master elements (segment, cluster, tags, ...) are entered by consuming their
//! header only, so their children are parsed as the next elements in the stream.
//! This keeps unknown-size masters (common in live fragments) trivial to handle
//! and makes concatenated fragments parse as one stream.
//!
//! Only three leaf kinds produce output: `TagName`, `TagString` and the block
//! elements carrying audio. Every other leaf is skipped as its bytes arrive.

use crate::error::{VoicemailError, VoicemailResult};
use byteorder::{BigEndian, ByteOrder};

pub const EBML_HEADER_ID: u32 = 0x1A45_DFA3;
pub const SEGMENT_ID: u32 = 0x1853_8067;
pub const CLUSTER_ID: u32 = 0x1F43_B675;
pub const TAGS_ID: u32 = 0x1254_C367;
pub const TAG_ID: u32 = 0x7373;
pub const SIMPLE_TAG_ID: u32 = 0x67C8;
pub const TAG_NAME_ID: u32 = 0x45A3;
pub const TAG_STRING_ID: u32 = 0x4487;
pub const BLOCK_GROUP_ID: u32 = 0xA0;
pub const BLOCK_ID: u32 = 0xA1;
pub const SIMPLE_BLOCK_ID: u32 = 0xA3;

const MASTER_IDS: &[u32] = &[
    EBML_HEADER_ID,
    SEGMENT_ID,
    0x114D_9B74, // SeekHead
    0x4DBB,      // Seek
    0x1549_A966, // Info
    0x1654_AE6B, // Tracks
    0xAE,        // TrackEntry
    0xE0,        // Video
    0xE1,        // Audio
    0x6D80,      // ContentEncodings
    0x6240,      // ContentEncoding
    CLUSTER_ID,
    BLOCK_GROUP_ID,
    0x75A1, // BlockAdditions
    0xA6,   // BlockMore
    0x8E,   // Slices
    0x1C53_BB6B, // Cues
    0xBB,        // CuePoint
    0xB7,        // CueTrackPositions
    0x1043_A770, // Chapters
    0x1941_A469, // Attachments
    0x61A7,      // AttachedFile
    TAGS_ID,
    TAG_ID,
    0x63C0, // Targets
    SIMPLE_TAG_ID,
];

/// One typed element pulled out of the container stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxedElement {
    /// Name of a metadata tag
    TagName(String),
    /// Value belonging to the most recently emitted tag name
    TagString(String),
    /// Raw audio frame bytes from a block, with the block header removed
    AudioBlock(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for a complete element header
    Header,
    /// Buffering the payload of an element we emit
    Payload { id: u32, size: usize },
    /// Discarding the payload of an element we don't care about
    Skip { remaining: u64 },
}

/// Incremental container parser.
///
/// Feed chunks with [`ContainerDemuxer::push`]; each call returns the elements
/// completed by that chunk, in stream order. Splitting the same bytes at different
/// chunk boundaries always yields the same element sequence.
#[derive(Debug)]
pub struct ContainerDemuxer {
    pending: Vec<u8>,
    state: ParseState,
    /// Stream offset of `pending[0]`
    offset: u64,
    max_element_bytes: u64,
}

impl ContainerDemuxer {
    pub fn new(max_element_bytes: u64) -> Self {
        Self {
            pending: Vec::new(),
            state: ParseState::Header,
            offset: 0,
            max_element_bytes,
        }
    }

    /// Total bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Bytes received but not yet part of a completed element.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// True when the stream stopped exactly on an element boundary.
    pub fn is_at_boundary(&self) -> bool {
        self.state == ParseState::Header && self.pending.is_empty()
    }

    /// Parse a chunk, returning every element it completes.
    pub fn push(&mut self, chunk: &[u8]) -> VoicemailResult<Vec<DemuxedElement>> {
        let mut elements = Vec::new();
        let mut input = chunk;

        // Skipped payloads never touch the buffer
        if let ParseState::Skip { remaining } = self.state {
            let take = remaining.min(input.len() as u64) as usize;
            input = &input[take..];
            self.offset += take as u64;
            self.state = Self::after_skip(remaining - take as u64);
        }

        self.pending.extend_from_slice(input);
        let mut cursor = 0usize;

        loop {
            match self.state {
                ParseState::Header => {
                    let available = &self.pending[cursor..];
                    let Some((id, id_len)) = read_element_id(available, self.offset_at(cursor))?
                    else {
                        break;
                    };
                    let Some((size, size_len)) =
                        read_element_size(&available[id_len..], self.offset_at(cursor + id_len))?
                    else {
                        break;
                    };
                    cursor += id_len + size_len;

                    if MASTER_IDS.contains(&id) {
                        continue;
                    }

                    let size = size.ok_or_else(|| VoicemailError::Demux {
                        offset: self.offset_at(cursor),
                        message: format!("leaf element 0x{:X} has unknown size", id),
                    })?;

                    if is_emitted(id) {
                        if size > self.max_element_bytes {
                            return Err(VoicemailError::Demux {
                                offset: self.offset_at(cursor),
                                message: format!(
                                    "element 0x{:X} of {} bytes exceeds limit of {} bytes",
                                    id, size, self.max_element_bytes
                                ),
                            });
                        }
                        self.state = ParseState::Payload {
                            id,
                            size: size as usize,
                        };
                    } else {
                        self.state = Self::after_skip(size);
                    }
                }
                ParseState::Payload { id, size } => {
                    if self.pending.len() - cursor < size {
                        break;
                    }
                    let payload = &self.pending[cursor..cursor + size];
                    elements.push(decode_leaf(id, payload, self.offset_at(cursor))?);
                    cursor += size;
                    self.state = ParseState::Header;
                }
                ParseState::Skip { remaining } => {
                    let available = (self.pending.len() - cursor) as u64;
                    let take = remaining.min(available);
                    cursor += take as usize;
                    self.state = Self::after_skip(remaining - take);
                    if take == available {
                        break;
                    }
                }
            }
        }

        self.pending.drain(..cursor);
        self.offset += cursor as u64;
        Ok(elements)
    }

    fn offset_at(&self, cursor: usize) -> u64 {
        self.offset + cursor as u64
    }

    fn after_skip(remaining: u64) -> ParseState {
        if remaining == 0 {
            ParseState::Header
        } else {
            ParseState::Skip { remaining }
        }
    }
}

fn is_emitted(id: u32) -> bool {
    matches!(id, TAG_NAME_ID | TAG_STRING_ID | BLOCK_ID | SIMPLE_BLOCK_ID)
}

fn decode_leaf(id: u32, payload: &[u8], offset: u64) -> VoicemailResult<DemuxedElement> {
    match id {
        TAG_NAME_ID => Ok(DemuxedElement::TagName(decode_string(payload))),
        TAG_STRING_ID => Ok(DemuxedElement::TagString(decode_string(payload))),
        _ => Ok(DemuxedElement::AudioBlock(block_frame(payload, offset)?.to_vec())),
    }
}

/// Container strings may be zero-padded.
fn decode_string(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_end_matches('\0')
        .to_string()
}

/// Strip the block header (track number, 16-bit relative timecode, flags).
///
/// Laced blocks are passed through whole; the audio tracks this service reads
/// carry one frame per block.
fn block_frame(payload: &[u8], offset: u64) -> VoicemailResult<&[u8]> {
    let short = || VoicemailError::Demux {
        offset,
        message: "block shorter than its header".to_string(),
    };
    let (_track, track_len) = read_vint(payload, offset)?.ok_or_else(short)?;
    let header_len = track_len + 3;
    if payload.len() < header_len {
        return Err(short());
    }
    Ok(&payload[header_len..])
}

/// Read an element ID, keeping its length marker. `None` means more bytes are needed.
pub fn read_element_id(buf: &[u8], offset: u64) -> VoicemailResult<Option<(u32, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let len = vint_length(first, offset)?;
    if len > 4 {
        return Err(VoicemailError::Demux {
            offset,
            message: format!("element id of {} bytes exceeds 4", len),
        });
    }
    if buf.len() < len {
        return Ok(None);
    }
    Ok(Some((BigEndian::read_uint(&buf[..len], len) as u32, len)))
}

/// Read an element size. The inner `None` is the "unknown size" marker.
pub fn read_element_size(
    buf: &[u8],
    offset: u64,
) -> VoicemailResult<Option<(Option<u64>, usize)>> {
    let Some((value, len)) = read_vint(buf, offset)? else {
        return Ok(None);
    };
    let all_ones = (1u64 << (7 * len)) - 1;
    let size = if value == all_ones { None } else { Some(value) };
    Ok(Some((size, len)))
}

/// Read a variable-length integer with its length marker stripped.
fn read_vint(buf: &[u8], offset: u64) -> VoicemailResult<Option<(u64, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let len = vint_length(first, offset)?;
    if buf.len() < len {
        return Ok(None);
    }
    let raw = BigEndian::read_uint(&buf[..len], len);
    let marker = 1u64 << (7 * len);
    Ok(Some((raw & (marker - 1), len)))
}

fn vint_length(first: u8, offset: u64) -> VoicemailResult<usize> {
    if first == 0 {
        return Err(VoicemailError::Demux {
            offset,
            message: "invalid variable-length integer (no length marker)".to_string(),
        });
    }
    Ok(first.leading_zeros() as usize + 1)
}
