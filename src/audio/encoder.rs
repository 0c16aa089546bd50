//! # PCM Re-encoder
//!
//! Packs accumulated raw audio blocks into a standard WAV container.
//!
//! ## Output Format:
//! - **Sample Rate**: 8kHz (8,000 Hz)
//! - **Bit Depth**: 16-bit PCM, little-endian
//! - **Channels**: Mono (1 channel)
//!
//! Duration is reported in whole seconds, rounded up:
//! `ceil(data_bytes / (sample_rate * channels * bit_depth / 8))`, i.e. `ceil(bytes / 2000)`.

use crate::error::{VoicemailError, VoicemailResult};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

pub const AUDIO_MIME_TYPE: &str = "audio/x-wav";

/// RIFF, fmt and data chunk headers ahead of the payload.
const HEADER_LEN: usize = 44;

/// Linear PCM layout of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl PcmFormat {
    /// Format of contact-center voicemail audio.
    pub const VOICEMAIL: PcmFormat = PcmFormat {
        sample_rate: 8000,
        channels: 1,
        bit_depth: 16,
    };

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * (self.bit_depth as u64 / 8)
    }

    /// Whole seconds of audio in `data_length` bytes, rounded up.
    pub fn duration_seconds(&self, data_length: usize) -> u64 {
        (data_length as u64).div_ceil(self.bytes_per_second())
    }

    fn fmt_chunk(&self) -> [u8; 16] {
        wav::Header::new(wav::WAV_FORMAT_PCM, self.channels, self.sample_rate, self.bit_depth).into()
    }
}

/// A finished WAV file and the numbers the publisher tags it with.
#[derive(Debug, Clone)]
pub struct PcmContainer {
    pub bytes: Vec<u8>,
    /// Audio payload bytes (excluding headers and the pad byte)
    pub data_length: usize,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct PcmEncoder {
    format: PcmFormat,
}

impl Default for PcmEncoder {
    fn default() -> Self {
        Self::new(PcmFormat::VOICEMAIL)
    }
}

impl PcmEncoder {
    pub fn new(format: PcmFormat) -> Self {
        Self { format }
    }

    /// Serialize blocks, in order, into a WAV container.
    ///
    /// Every payload byte is kept. An empty block list produces a valid header-only
    /// file with zero duration. An odd-length data chunk is followed by one zero pad
    /// byte, which the chunk size does not count.
    pub fn encode(&self, blocks: &[Vec<u8>]) -> VoicemailResult<PcmContainer> {
        let data_length: usize = blocks.iter().map(Vec::len).sum();
        let pad = data_length % 2;
        let data_size = u32::try_from(data_length)
            .ok()
            .filter(|size| size.checked_add(36 + pad as u32).is_some())
            .ok_or_else(|| {
                VoicemailError::Extraction(format!(
                    "{} bytes of audio do not fit in a WAV container",
                    data_length
                ))
            })?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + data_length + pad);
        bytes.write_all(b"RIFF")?;
        bytes.write_u32::<LittleEndian>(36 + data_size + pad as u32)?;
        bytes.write_all(b"WAVE")?;
        bytes.write_all(b"fmt ")?;
        bytes.write_u32::<LittleEndian>(16)?;
        bytes.write_all(&self.format.fmt_chunk())?;
        bytes.write_all(b"data")?;
        bytes.write_u32::<LittleEndian>(data_size)?;
        for block in blocks {
            bytes.write_all(block)?;
        }
        if pad == 1 {
            bytes.write_u8(0)?;
        }

        Ok(PcmContainer {
            bytes,
            data_length,
            duration_seconds: self.format.duration_seconds(data_length),
        })
    }
}

/// Audio read back out of a WAV container.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPcm {
    pub format: PcmFormat,
    pub payload: Vec<u8>,
}

/// Walk the RIFF chunks of a container and return its format and exact data payload.
#[cfg(test)]
pub fn decode_container(bytes: &[u8]) -> VoicemailResult<DecodedPcm> {
    use byteorder::ByteOrder;

    let invalid = |message: &str| VoicemailError::Extraction(message.to_string());
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(invalid("not a RIFF/WAVE container"));
    }

    let mut format = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = LittleEndian::read_u32(&bytes[offset + 4..offset + 8]) as usize;
        let body = bytes
            .get(offset + 8..offset + 8 + size)
            .ok_or_else(|| invalid("chunk runs past the end of the file"))?;
        match id {
            b"fmt " => {
                let header = wav::Header::try_from(body).map_err(invalid)?;
                format = Some(PcmFormat {
                    sample_rate: header.sampling_rate,
                    channels: header.channel_count,
                    bit_depth: header.bits_per_sample,
                });
            }
            b"data" => {
                let format = format.ok_or_else(|| invalid("data chunk before fmt chunk"))?;
                return Ok(DecodedPcm {
                    format,
                    payload: body.to_vec(),
                });
            }
            _ => {}
        }
        offset += 8 + size + size % 2;
    }

    Err(invalid("missing data chunk"))
}
