//! Training-time waveform augmentation.
//!
//! Each clip can be expanded into extra examples that share its label:
//! a pitch shift (phase-vocoder stretch, then resampled back to the
//! original length) and a plain time stretch. The declared sample rate of
//! every variant equals the input's. Inference never goes through here.

use crate::decode::{self, AudioSample, DecodeError};
use crate::features::{FeatureError, Stft};
use realfft::num_complex::Complex;
use std::f32::consts::PI;

pub const DEFAULT_PITCH_STEPS: f32 = 2.0;
pub const DEFAULT_STRETCH_RATE: f32 = 1.1;
const N_FFT: usize = 2048;
const HOP: usize = 512;

#[derive(thiserror::Error, Debug)]
pub enum AugmentError {
    #[error("waveform is empty")]
    EmptyWaveform,

    #[error("stretch rate must be finite and > 0, got {0}")]
    InvalidRate(f32),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Resample(#[from] DecodeError),
}

pub struct Augmenter {
    stft: Stft,
    pitch_steps: f32,
    stretch_rate: f32,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self::new(DEFAULT_PITCH_STEPS, DEFAULT_STRETCH_RATE)
    }
}

impl Augmenter {
    pub fn new(pitch_steps: f32, stretch_rate: f32) -> Self {
        Self {
            stft: Stft::new(N_FFT, HOP),
            pitch_steps,
            stretch_rate,
        }
    }

    /// The original clip followed by its pitch-shifted and time-stretched variants.
    pub fn variants(&self, sample: &AudioSample) -> Result<Vec<AudioSample>, AugmentError> {
        let shifted = self.pitch_shift(sample, self.pitch_steps)?;
        let stretched = self.time_stretch(sample, self.stretch_rate)?;
        Ok(vec![sample.clone(), shifted, stretched])
    }

    /// Changes tempo by `rate` (> 1 speeds up) without changing pitch.
    pub fn time_stretch(
        &self,
        sample: &AudioSample,
        rate: f32,
    ) -> Result<AudioSample, AugmentError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(AugmentError::InvalidRate(rate));
        }
        if sample.is_empty() {
            return Err(AugmentError::EmptyWaveform);
        }

        let frames = self.stft.forward(&sample.samples)?;
        let stretched = phase_vocoder(&frames, rate, self.stft.hop());
        let length = (sample.len() as f64 / f64::from(rate)).round() as usize;
        let samples = self.stft.inverse(&stretched, length)?;
        Ok(AudioSample::new(samples, sample.sample_rate))
    }

    /// Shifts pitch by `n_steps` semitones, keeping duration and sample rate.
    pub fn pitch_shift(
        &self,
        sample: &AudioSample,
        n_steps: f32,
    ) -> Result<AudioSample, AugmentError> {
        let rate = 2f32.powf(-n_steps / 12.0);
        let stretched = self.time_stretch(sample, rate)?;
        let samples = decode::resample_by_ratio(&stretched.samples, f64::from(rate), sample.len())?;
        Ok(AudioSample::new(samples, sample.sample_rate))
    }
}

/// Resamples STFT frames along time by `rate`, keeping phase coherent per bin.
fn phase_vocoder(frames: &[Vec<Complex<f32>>], rate: f32, hop: usize) -> Vec<Vec<Complex<f32>>> {
    let Some(first) = frames.first() else {
        return Vec::new();
    };
    let n_bins = first.len();
    let zero = vec![Complex::new(0.0f32, 0.0); n_bins];
    let frame_at = |i: usize| frames.get(i).unwrap_or(&zero);

    // Expected phase advance per hop for each bin centre frequency.
    let phi_advance: Vec<f32> = (0..n_bins)
        .map(|k| PI * hop as f32 * k as f32 / (n_bins.max(2) - 1) as f32)
        .collect();
    let mut phase_acc: Vec<f32> = first.iter().map(|c| c.arg()).collect();

    let step_count = (frames.len() as f64 / f64::from(rate)).ceil() as usize;
    let mut out = Vec::with_capacity(step_count);

    for n in 0..step_count {
        let step = n as f64 * f64::from(rate);
        if step >= frames.len() as f64 {
            break;
        }
        let idx = step.floor() as usize;
        let alpha = step.fract() as f32;
        let (c0, c1) = (frame_at(idx), frame_at(idx + 1));

        let mut frame = Vec::with_capacity(n_bins);
        for k in 0..n_bins {
            let mag = (1.0 - alpha) * c0[k].norm() + alpha * c1[k].norm();
            frame.push(Complex::from_polar(mag, phase_acc[k]));

            let mut dphase = c1[k].arg() - c0[k].arg() - phi_advance[k];
            dphase -= 2.0 * PI * (dphase / (2.0 * PI)).round();
            phase_acc[k] += phi_advance[k] + dphase;
        }
        out.push(frame);
    }
    out
}
