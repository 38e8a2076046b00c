use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const SINC_LEN: usize = 128;
const OVERSAMPLING_FACTOR: usize = 128;

/// Mono waveform tagged with its sampling rate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioSample {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSample {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_sample_count(self.sample_rate, 1, self.samples.len())
    }

    /// Returns the same waveform at `target_hz`, untouched when the rate already matches.
    pub fn resampled(self, target_hz: u32) -> Result<Self> {
        if self.sample_rate == target_hz {
            return Ok(self);
        }
        let samples = resample(&self.samples, self.sample_rate, target_hz)?;
        Ok(Self::new(samples, target_hz))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported audio: {0}")]
    Unsupported(String),

    #[error("invalid pcm: {0}")]
    InvalidPcm(String),

    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,

    #[error("resampling failed: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Turns an audio file on disk into a mono [`AudioSample`].
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioSample>;
}

/// Symphonia-backed decoder for PCM WAV files. Multichannel input is averaged to mono.
#[derive(Clone, Debug, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<AudioSample> {
        let file = File::open(path).map_err(|e| DecodeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no audio track found".to_owned()))?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".to_owned()))?;
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut interleaved: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(DecodeError::InvalidPcm(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| DecodeError::InvalidPcm(e.to_string()))?;

            if sample_buf.is_none() {
                let spec = *decoded.spec();
                channels = spec.channels.count() as u16;
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }

            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
        }

        let samples = downmix_to_mono(&interleaved, channels)?;
        tracing::debug!(
            path = %path.display(),
            sample_rate,
            channels,
            frames = samples.len(),
            "decoded wav"
        );
        Ok(AudioSample::new(samples, sample_rate))
    }
}

/// Averages interleaved frames into one channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Result<Vec<f32>> {
    match channels {
        0 => Err(DecodeError::InvalidPcm("channel count must be > 0".to_owned())),
        1 => Ok(interleaved.to_vec()),
        n => {
            let n = usize::from(n);
            if interleaved.len() % n != 0 {
                return Err(DecodeError::InvalidPcm(format!(
                    "sample count {} is not a multiple of {n} channels",
                    interleaved.len()
                )));
            }
            let scale = 1.0 / n as f32;
            Ok(interleaved
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() * scale)
                .collect())
        }
    }
}

pub fn i16_to_f32_pcm(samples: &[i16]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let scale = 1.0f32 / 32768.0f32;
    samples.iter().map(|&s| f32::from(s) * scale).collect()
}

pub fn duration_from_sample_count(
    sample_rate_hz: u32,
    channels: u16,
    sample_count: usize,
) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = sample_count / usize::from(channels);
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

/// Sample-rate conversion of a whole mono buffer.
pub fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>> {
    if from_hz == 0 || to_hz == 0 {
        return Err(DecodeError::ZeroSampleRate);
    }
    if from_hz == to_hz {
        return Ok(samples.to_vec());
    }
    let ratio = f64::from(to_hz) / f64::from(from_hz);
    let target_len = (samples.len() as f64 * ratio).round() as usize;
    resample_by_ratio(samples, ratio, target_len)
}

/// Resamples by `ratio` (output rate / input rate) and fixes the output to `target_len`.
///
/// The resampler's group delay is trimmed from the front; any shortfall is zero-padded.
pub fn resample_by_ratio(samples: &[f32], ratio: f64, target_len: usize) -> Result<Vec<f32>> {
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(DecodeError::Resample(format!("invalid ratio {ratio}")));
    }
    if samples.is_empty() || target_len == 0 {
        return Ok(vec![0.0; target_len]);
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: rubato::calculate_cutoff(SINC_LEN, WindowFunction::BlackmanHarris2),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: OVERSAMPLING_FACTOR,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut out: Vec<f32> = resampler
        .process(&[samples], None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();
    let tail = resampler
        .process_partial(None::<&[&[f32]]>, None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
    if let Some(tail) = tail.into_iter().next() {
        out.extend_from_slice(&tail);
    }

    let mut fixed: Vec<f32> = out.into_iter().skip(delay).take(target_len).collect();
    fixed.resize(target_len, 0.0);
    Ok(fixed)
}
