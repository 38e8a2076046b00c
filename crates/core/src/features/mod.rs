//! Time-averaged MFCC descriptors.
//!
//! Defaults mirror the common librosa front-end so descriptors stay
//! comparable with models trained on the same corpus elsewhere:
//! - n_fft: 2048, hop: 512, periodic Hann, centered frames
//! - 128 Slaney mel filters from 0 Hz to Nyquist
//! - power to dB with an 80 dB dynamic range floor
//! - orthonormal DCT-II, first `n_mfcc` coefficients
//! - arithmetic mean over frames

mod mel;
pub(crate) mod stft;

use crate::config::{DEFAULT_N_MFCC, DEFAULT_SAMPLE_RATE};
use crate::decode::AudioSample;
use serde::{Deserialize, Serialize};

pub use mel::{hz_to_mel, mel_to_hz};
pub use stft::Stft;

const AMIN: f32 = 1e-10;

/// Fixed-length descriptor of one audio sample.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DescriptorVector(pub Vec<f32>);

impl DescriptorVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for DescriptorVector {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExtractorConfig {
    pub sample_rate: u32,
    pub n_mfcc: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub top_db: Option<f32>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            n_mfcc: DEFAULT_N_MFCC,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: Some(80.0),
        }
    }
}

impl ExtractorConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_n_mfcc(mut self, n_mfcc: usize) -> Self {
        self.n_mfcc = n_mfcc;
        self
    }

    pub fn validate(&self) -> Result<(), FeatureError> {
        let bad = |msg: String| Err(FeatureError::InvalidConfig(msg));
        if self.sample_rate == 0 {
            return bad("sample_rate must be > 0".to_owned());
        }
        if self.n_fft < 2 || self.n_fft % 2 != 0 {
            return bad(format!("n_fft must be even and >= 2, got {}", self.n_fft));
        }
        if self.hop_length == 0 {
            return bad("hop_length must be > 0".to_owned());
        }
        if self.n_mels == 0 {
            return bad("n_mels must be > 0".to_owned());
        }
        if self.n_mfcc == 0 || self.n_mfcc > self.n_mels {
            return bad(format!(
                "n_mfcc must be in 1..={}, got {}",
                self.n_mels, self.n_mfcc
            ));
        }
        if let Some(top_db) = self.top_db {
            if !(top_db.is_finite() && top_db >= 0.0) {
                return bad(format!("top_db must be finite and >= 0, got {top_db}"));
            }
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("waveform is empty")]
    EmptyWaveform,

    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,

    #[error("sample rate {actual} Hz does not match extractor rate {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("non-finite sample at index {index}")]
    NonFiniteSample { index: usize },

    #[error("invalid extractor config: {0}")]
    InvalidConfig(String),

    #[error("fft failed: {0}")]
    Fft(String),
}

/// Converts waveforms into [`DescriptorVector`]s of length `n_mfcc`.
///
/// Filterbank and DCT tables are built once per extractor; `extract` is a
/// pure function of the input sample.
pub struct FeatureExtractor {
    config: ExtractorConfig,
    stft: Stft,
    mel_bank: Vec<mel::MelFilter>,
    dct: Vec<Vec<f32>>,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        let stft = Stft::new(config.n_fft, config.hop_length);
        let mel_bank = mel::mel_filter_bank(
            config.sample_rate,
            config.n_fft,
            config.n_mels,
            0.0,
            f64::from(config.sample_rate) / 2.0,
        );
        let dct = mel::dct_matrix(config.n_mfcc, config.n_mels);
        Ok(Self {
            config,
            stft,
            mel_bank,
            dct,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.n_mfcc
    }

    fn check_input(&self, sample: &AudioSample) -> Result<(), FeatureError> {
        if sample.sample_rate == 0 {
            return Err(FeatureError::ZeroSampleRate);
        }
        if sample.samples.is_empty() {
            return Err(FeatureError::EmptyWaveform);
        }
        if sample.sample_rate != self.config.sample_rate {
            return Err(FeatureError::SampleRateMismatch {
                expected: self.config.sample_rate,
                actual: sample.sample_rate,
            });
        }
        if let Some(index) = sample.samples.iter().position(|s| !s.is_finite()) {
            return Err(FeatureError::NonFiniteSample { index });
        }
        Ok(())
    }

    /// Per-frame cepstra, `[frames][n_mfcc]`.
    pub fn mfcc_frames(&self, sample: &AudioSample) -> Result<Vec<Vec<f32>>, FeatureError> {
        self.check_input(sample)?;

        let num_frames = self.stft.frame_count(sample.samples.len());
        let mut log_mel: Vec<Vec<f32>> = Vec::with_capacity(num_frames);
        let mut power = vec![0.0f32; self.stft.num_bins()];
        let mut max_db = f32::NEG_INFINITY;

        self.stft.for_each_frame(&sample.samples, |_, spectrum| {
            for (p, c) in power.iter_mut().zip(spectrum) {
                *p = c.norm_sqr();
            }
            let frame: Vec<f32> = self
                .mel_bank
                .iter()
                .map(|filter| 10.0 * filter.apply(&power).max(AMIN).log10())
                .collect();
            max_db = frame.iter().copied().fold(max_db, f32::max);
            log_mel.push(frame);
        })?;

        if let Some(top_db) = self.config.top_db {
            let floor = max_db - top_db;
            for v in log_mel.iter_mut().flatten() {
                *v = v.max(floor);
            }
        }

        Ok(log_mel
            .iter()
            .map(|frame| {
                self.dct
                    .iter()
                    .map(|row| row.iter().zip(frame).map(|(d, m)| d * m).sum())
                    .collect()
            })
            .collect())
    }

    /// Mean of the per-frame cepstra: one value per coefficient.
    pub fn extract(&self, sample: &AudioSample) -> Result<DescriptorVector, FeatureError> {
        let frames = self.mfcc_frames(sample)?;
        let mut sums = vec![0.0f64; self.config.n_mfcc];
        for frame in &frames {
            for (acc, v) in sums.iter_mut().zip(frame) {
                *acc += f64::from(*v);
            }
        }
        let count = frames.len().max(1) as f64;
        Ok(DescriptorVector(
            sums.into_iter().map(|s| (s / count) as f32).collect(),
        ))
    }
}
