//! Slaney-style mel filterbank and the orthonormal DCT used for cepstra.

use std::f64::consts::PI;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Hz to mel on the Slaney scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// One triangular filter stored as its non-zero span over the FFT bins.
#[derive(Clone, Debug)]
pub struct MelFilter {
    pub start: usize,
    pub weights: Vec<f32>,
}

impl MelFilter {
    pub fn apply(&self, power: &[f32]) -> f32 {
        self.weights
            .iter()
            .zip(&power[self.start..])
            .map(|(w, p)| w * p)
            .sum()
    }
}

/// Builds `num_mels` area-normalized triangular filters spanning `fmin..fmax`.
pub fn mel_filter_bank(
    sample_rate: u32,
    n_fft: usize,
    num_mels: usize,
    fmin: f64,
    fmax: f64,
) -> Vec<MelFilter> {
    let num_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..num_bins)
        .map(|k| k as f64 * f64::from(sample_rate) / n_fft as f64)
        .collect();

    let min_mel = hz_to_mel(fmin);
    let max_mel = hz_to_mel(fmax);
    let step = (max_mel - min_mel) / (num_mels + 1) as f64;
    let mel_hz: Vec<f64> = (0..num_mels + 2)
        .map(|i| mel_to_hz(min_mel + i as f64 * step))
        .collect();

    let mut bank = Vec::with_capacity(num_mels);
    for m in 0..num_mels {
        let (left, center, right) = (mel_hz[m], mel_hz[m + 1], mel_hz[m + 2]);
        let norm = 2.0 / (right - left);

        let dense: Vec<f64> = fft_freqs
            .iter()
            .map(|&f| {
                let lower = (f - left) / (center - left);
                let upper = (right - f) / (right - center);
                lower.min(upper).max(0.0) * norm
            })
            .collect();

        let start = dense.iter().position(|&w| w > 0.0).unwrap_or(0);
        let end = dense
            .iter()
            .rposition(|&w| w > 0.0)
            .map(|i| i + 1)
            .unwrap_or(start);
        bank.push(MelFilter {
            start,
            weights: dense[start..end].iter().map(|&w| w as f32).collect(),
        });
    }
    bank
}

/// Rows of the orthonormal DCT-II: `n_out` coefficients over `n_in` inputs.
pub fn dct_matrix(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..n_in)
                .map(|i| {
                    let angle = PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n);
                    (scale * angle.cos()) as f32
                })
                .collect()
        })
        .collect()
}
