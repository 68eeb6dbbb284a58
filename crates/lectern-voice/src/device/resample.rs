//! Streaming resampler for microphones that cannot open at the input rate.
//!
//! Most devices capture at 44.1 or 48 kHz. When the device refuses the
//! 16 kHz contract rate, captured audio is downmixed to mono and converted
//! here, chunk by chunk, before it reaches the frame encoder.

use rubato::{FftFixedIn, Resampler as _};

use crate::error::VoiceError;

/// Input chunk fed to the FFT resampler.
const CHUNK_SIZE: usize = 1024;

/// Incremental mono resampler. Keeps at most one partial input chunk.
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler from `from_rate` to `to_rate`.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, VoiceError> {
        let resampler = FftFixedIn::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_SIZE,
            2, // sub-chunks for quality
            1, // mono
        )
        .map_err(|e| VoiceError::ResampleError(e.to_string()))?;

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    /// Resample `samples`, appending any completed output to `out`.
    pub fn process(&mut self, mut samples: &[f32], out: &mut Vec<f32>) -> Result<(), VoiceError> {
        while !samples.is_empty() {
            let needed = self.resampler.input_frames_next();
            let take = (needed - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == needed {
                let result = self
                    .resampler
                    .process(&[&self.pending], None)
                    .map_err(|e| VoiceError::ResampleError(e.to_string()))?;
                if let Some(channel) = result.first() {
                    out.extend_from_slice(channel);
                }
                self.pending.clear();
            }
        }
        Ok(())
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub fn downmix_to_mono(samples: &[f32], channels: u16, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(samples);
        return;
    }
    let channels = usize::from(channels);
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    out.extend(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}
