//! Frame encoder: slices captured audio into fixed-size PCM16 uplink frames.
//!
//! The capture callback delivers buffers of whatever size the device chooses.
//! [`FrameEncoder`] re-cuts that stream into frames of exactly `frame_size`
//! samples and encodes each one as signed 16-bit little-endian PCM. Only the
//! unfinished tail of the current frame is retained between calls.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

/// One encoded uplink frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Position of this frame in the capture stream (starts at 0).
    pub seq: u64,

    /// PCM16 LE samples.
    pub payload: Bytes,

    /// MIME type announced to the remote service, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

impl EncodedFrame {
    /// Number of samples in the frame.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.payload.len() / 2
    }

    /// Payload as base64, for transports that carry audio inline in JSON.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.payload)
    }
}

/// Streaming frame slicer + PCM16 encoder.
#[derive(Debug)]
pub struct FrameEncoder {
    frame_size: usize,
    mime_type: String,
    pending: Vec<f32>,
    next_seq: u64,
}

impl FrameEncoder {
    /// Create an encoder emitting frames of `frame_size` samples (at least one).
    #[must_use]
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            mime_type: format!("audio/pcm;rate={sample_rate}"),
            pending: Vec::with_capacity(frame_size),
            next_seq: 0,
        }
    }

    /// Feed captured mono samples, calling `emit` once per completed frame.
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(EncodedFrame)) {
        while !samples.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.frame_size {
                let frame = EncodedFrame {
                    seq: self.next_seq,
                    payload: encode_pcm16(&self.pending),
                    mime_type: self.mime_type.clone(),
                };
                self.next_seq += 1;
                self.pending.clear();
                emit(frame);
            }
        }
    }

    /// Samples held for the next, not yet complete, frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Drop the unfinished tail.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Encode f32 samples (range −1.0 … 1.0) to PCM16 LE bytes.
///
/// Values outside [−1, 1] are clamped before conversion.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Bytes {
    let mut buf = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        #[allow(clippy::cast_possible_truncation)]
        let i16_val = (clamped * 32_767.0) as i16;
        buf.extend_from_slice(&i16_val.to_le_bytes());
    }
    Bytes::from(buf)
}
