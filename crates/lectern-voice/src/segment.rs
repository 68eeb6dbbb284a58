//! Segment decoder: turns downlink audio segments into playable buffers.
//!
//! The remote service pushes synthesized speech in segments of arbitrary
//! length. Segment boundaries are not guaranteed to line up with anything
//! meaningful, so every segment is decoded on its own as it arrives and
//! becomes exactly one [`PlaybackBuffer`]. A segment that fails to decode is
//! reported to the caller and has no effect on its neighbours.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use rodio::Source as _;

use crate::config::frames_to_duration;
use crate::error::VoiceError;

/// How a segment payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEncoding {
    /// Raw signed 16-bit little-endian PCM.
    Pcm16,

    /// PCM16 LE wrapped in base64 text, as carried inline in server events.
    Base64Pcm16,

    /// A RIFF/WAV container holding PCM at the output contract rate.
    Wav,
}

/// An opaque audio payload received from the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSegment {
    /// Encoded bytes.
    pub payload: Bytes,

    /// Encoding of `payload`.
    pub encoding: SegmentEncoding,
}

impl EncodedSegment {
    /// Raw PCM16 LE bytes.
    pub fn pcm16(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            encoding: SegmentEncoding::Pcm16,
        }
    }

    /// Base64 text of PCM16 LE bytes.
    pub fn base64(text: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(text.into()),
            encoding: SegmentEncoding::Base64Pcm16,
        }
    }

    /// Guess the encoding of a file or blob: WAV if it carries a RIFF
    /// header, raw PCM16 otherwise.
    pub fn sniff(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let encoding = if payload.len() >= 12 && &payload[..4] == b"RIFF" && &payload[8..12] == b"WAVE"
        {
            SegmentEncoding::Wav
        } else {
            SegmentEncoding::Pcm16
        };
        Self { payload, encoding }
    }
}

/// A decoded, schedulable unit of mono audio.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl PlaybackBuffer {
    /// Wrap decoded mono samples.
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Shared sample storage.
    #[must_use]
    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    /// Sample rate of the buffer.
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length on the playback timeline, in output frames.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Length on the playback timeline.
    #[must_use]
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames(), self.sample_rate)
    }
}

/// Decodes segments at the fixed output sample rate and channel count.
#[derive(Debug, Clone, Copy)]
pub struct SegmentDecoder {
    sample_rate: u32,
    channels: u16,
}

impl SegmentDecoder {
    /// Create a decoder for the output contract. Zero channels is treated
    /// as mono.
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: if channels == 0 { 1 } else { channels },
        }
    }

    /// Decode one segment into one playback buffer.
    pub fn decode(&self, segment: &EncodedSegment) -> Result<PlaybackBuffer, VoiceError> {
        let samples = match segment.encoding {
            SegmentEncoding::Pcm16 => self.decode_pcm16(&segment.payload)?,
            SegmentEncoding::Base64Pcm16 => {
                let raw = BASE64
                    .decode(segment.payload.as_ref())
                    .map_err(|e| VoiceError::Decode(format!("invalid base64 payload: {e}")))?;
                self.decode_pcm16(&raw)?
            }
            SegmentEncoding::Wav => self.decode_wav(&segment.payload)?,
        };

        if samples.is_empty() {
            return Err(VoiceError::Decode("segment contains no audio".to_string()));
        }

        Ok(PlaybackBuffer::new(samples, self.sample_rate))
    }

    /// PCM16 LE → f32, downmixing interleaved channels to mono.
    fn decode_pcm16(&self, bytes: &[u8]) -> Result<Vec<f32>, VoiceError> {
        let frame_bytes = 2 * usize::from(self.channels);
        if bytes.len() % frame_bytes != 0 {
            return Err(VoiceError::Decode(format!(
                "{} bytes is not a whole number of {}-channel PCM16 frames",
                bytes.len(),
                self.channels
            )));
        }

        let channels = f32::from(self.channels);
        Ok(bytes
            .chunks_exact(frame_bytes)
            .map(|frame| {
                frame
                    .chunks_exact(2)
                    .map(|s| f32::from(i16::from_le_bytes([s[0], s[1]])) / 32_768.0)
                    .sum::<f32>()
                    / channels
            })
            .collect())
    }

    /// WAV container → f32. The container must already match the output
    /// contract; no resampling is performed.
    fn decode_wav(&self, bytes: &Bytes) -> Result<Vec<f32>, VoiceError> {
        let decoder = rodio::Decoder::new_wav(Cursor::new(bytes.clone()))
            .map_err(|e| VoiceError::Decode(format!("invalid WAV container: {e}")))?;

        if decoder.sample_rate() != self.sample_rate || decoder.channels() != self.channels {
            return Err(VoiceError::Decode(format!(
                "WAV is {} Hz / {} ch, expected {} Hz / {} ch",
                decoder.sample_rate(),
                decoder.channels(),
                self.sample_rate,
                self.channels
            )));
        }

        let channels = usize::from(self.channels);
        let interleaved: Vec<f32> = decoder.map(|s| f32::from(s) / 32_768.0).collect();
        Ok(interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / f32::from(self.channels))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn wav(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = u32::try_from(samples.len() * 2).unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(&pcm(samples));
        out
    }

    #[test]
    fn decodes_pcm16_mono() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let buffer = decoder
            .decode(&EncodedSegment::pcm16(pcm(&[0, 16_384, -32_768])))
            .unwrap();
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.samples().as_ref(), &[0.0, 0.5, -1.0]);
    }

    #[test]
    fn duration_follows_output_rate() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let buffer = decoder
            .decode(&EncodedSegment::pcm16(vec![0u8; 24_000]))
            .unwrap();
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn odd_length_is_a_decode_error() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let err = decoder
            .decode(&EncodedSegment::pcm16(vec![0u8; 3]))
            .unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn zero_channels_decode_as_mono() {
        let decoder = SegmentDecoder::new(24_000, 0);
        let buffer = decoder
            .decode(&EncodedSegment::pcm16(vec![0x00, 0x40, 0x00, 0xC0]))
            .unwrap();
        assert_eq!(buffer.frames(), 2);
        assert!((buffer.samples()[0] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_segment_is_a_decode_error() {
        let decoder = SegmentDecoder::new(24_000, 1);
        assert!(decoder.decode(&EncodedSegment::pcm16(Vec::new())).is_err());
    }

    #[test]
    fn decodes_inline_base64() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let text = BASE64.encode(pcm(&[16_384, 16_384]));
        let buffer = decoder.decode(&EncodedSegment::base64(text)).unwrap();
        assert_eq!(buffer.frames(), 2);
    }

    #[test]
    fn bad_base64_is_a_decode_error() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let err = decoder
            .decode(&EncodedSegment::base64("not*base64"))
            .unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn sniffs_and_decodes_matching_wav() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let segment = EncodedSegment::sniff(wav(24_000, &[0, 16_384, 0, -16_384]));
        assert_eq!(segment.encoding, SegmentEncoding::Wav);
        let buffer = decoder.decode(&segment).unwrap();
        assert_eq!(buffer.frames(), 4);
    }

    #[test]
    fn rejects_wav_at_other_rate() {
        let decoder = SegmentDecoder::new(24_000, 1);
        let segment = EncodedSegment::sniff(wav(44_100, &[0, 1, 2, 3]));
        assert!(matches!(
            decoder.decode(&segment),
            Err(VoiceError::Decode(_))
        ));
    }

    #[test]
    fn raw_bytes_sniff_as_pcm() {
        let segment = EncodedSegment::sniff(vec![1u8, 2, 3, 4]);
        assert_eq!(segment.encoding, SegmentEncoding::Pcm16);
    }
}
