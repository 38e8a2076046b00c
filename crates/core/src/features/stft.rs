//! Centered short-time Fourier transform and its overlap-add inverse.
//!
//! Framing follows the usual `center = true` convention: the signal is
//! zero-padded by `n_fft / 2` on both sides so frame `t` is centered on
//! sample `t * hop`, giving `1 + len / hop` frames.

use crate::features::FeatureError;
use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::f32::consts::PI;
use std::sync::Arc;

/// Periodic Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            n_fft,
            hop,
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn frame_count(&self, signal_len: usize) -> usize {
        1 + signal_len / self.hop
    }

    /// Runs the forward transform and hands each frame's spectrum to `f`.
    pub fn for_each_frame(
        &self,
        signal: &[f32],
        mut f: impl FnMut(usize, &[Complex<f32>]),
    ) -> Result<(), FeatureError> {
        let pad = self.n_fft / 2;
        let num_frames = self.frame_count(signal.len());

        let mut frame_buf = self.forward.make_input_vec();
        let mut spectrum = self.forward.make_output_vec();
        let mut scratch = self.forward.make_scratch_vec();

        for t in 0..num_frames {
            // Index into the virtual padded signal.
            let start = t * self.hop;
            for (i, slot) in frame_buf.iter_mut().enumerate() {
                let padded_idx = start + i;
                let sample = padded_idx
                    .checked_sub(pad)
                    .and_then(|idx| signal.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *slot = sample * self.window[i];
            }

            self.forward
                .process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;
            f(t, &spectrum);
        }
        Ok(())
    }

    pub fn forward(&self, signal: &[f32]) -> Result<Vec<Vec<Complex<f32>>>, FeatureError> {
        let mut frames = Vec::with_capacity(self.frame_count(signal.len()));
        self.for_each_frame(signal, |_, spectrum| frames.push(spectrum.to_vec()))?;
        Ok(frames)
    }

    /// Overlap-add inverse with squared-window normalization, cut to `length` samples.
    pub fn inverse(
        &self,
        frames: &[Vec<Complex<f32>>],
        length: usize,
    ) -> Result<Vec<f32>, FeatureError> {
        let pad = self.n_fft / 2;
        let padded_len = self.n_fft + self.hop * frames.len().saturating_sub(1);
        let mut out = vec![0.0f32; padded_len];
        let mut envelope = vec![0.0f32; padded_len];

        let mut spectrum = self.inverse.make_input_vec();
        let mut frame_buf = self.inverse.make_output_vec();
        let mut scratch = self.inverse.make_scratch_vec();
        let scale = 1.0 / self.n_fft as f32;
        let last = spectrum.len() - 1;

        for (t, frame) in frames.iter().enumerate() {
            if frame.len() != spectrum.len() {
                return Err(FeatureError::Fft(format!(
                    "frame {t} has {} bins, expected {}",
                    frame.len(),
                    spectrum.len()
                )));
            }
            spectrum.copy_from_slice(frame);
            // DC and Nyquist bins of a real signal carry no imaginary part.
            spectrum[0].im = 0.0;
            spectrum[last].im = 0.0;

            self.inverse
                .process_with_scratch(&mut spectrum, &mut frame_buf, &mut scratch)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;

            let start = t * self.hop;
            for i in 0..self.n_fft {
                let w = self.window[i];
                out[start + i] += frame_buf[i] * scale * w;
                envelope[start + i] += w * w;
            }
        }

        for (s, env) in out.iter_mut().zip(envelope.iter()) {
            if *env > f32::MIN_POSITIVE {
                *s /= env;
            }
        }

        let mut y: Vec<f32> = out.into_iter().skip(pad).take(length).collect();
        y.resize(length, 0.0);
        Ok(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_matches_centered_convention() {
        let stft = Stft::new(2048, 512);
        assert_eq!(stft.frame_count(0), 1);
        assert_eq!(stft.frame_count(511), 1);
        assert_eq!(stft.frame_count(512), 2);
        assert_eq!(stft.frame_count(22_050), 44);
    }

    #[test]
    fn hann_window_is_periodic() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[1] - w[7]).abs() < 1e-6);
    }

    #[test]
    fn forward_then_inverse_reconstructs_signal() {
        let stft = Stft::new(512, 128);
        let signal: Vec<f32> = (0..4_000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 16_000.0).sin() * 0.5)
            .collect();
        let frames = stft.forward(&signal).unwrap();
        let rebuilt = stft.inverse(&frames, signal.len()).unwrap();
        assert_eq!(rebuilt.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(rebuilt.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max reconstruction error {max_err}");
    }

    #[test]
    fn inverse_rejects_wrong_bin_count() {
        let stft = Stft::new(256, 64);
        let bad = vec![vec![Complex::new(0.0, 0.0); 10]];
        assert!(stft.inverse(&bad, 100).is_err());
    }
}
