//! Fixed-length microphone recording.
//!
//! The buffering and cancellation logic here is device-independent. The
//! actual input stream lives in `device` behind the `capture` feature.

#[cfg(feature = "capture")]
mod device;

use crate::decode::{self, AudioSample, DecodeError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "capture")]
pub use device::MicrophoneRecorder;

const LOG_TARGET: &str = "capture";
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Extra wall-clock time allowed on top of the requested duration before
/// giving up on a stalled device.
pub const STALL_GRACE: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared between the caller and a recording.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("recording cancelled")]
    Cancelled,
    #[error("no default input device")]
    NoInputDevice,
    #[error("input device error: {0}")]
    Device(String),
    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),
    #[error("input stream stalled after {captured} of {expected} frames")]
    Stalled { captured: usize, expected: usize },
    #[error(transparent)]
    Pcm(#[from] DecodeError),
}

/// Mono accumulator that stops taking frames once `target_frames` is reached.
#[derive(Debug)]
pub struct CaptureBuffer {
    channels: u16,
    target_frames: usize,
    samples: Vec<f32>,
}

impl CaptureBuffer {
    pub fn new(channels: u16, target_frames: usize) -> Result<Self, CaptureError> {
        if channels == 0 {
            return Err(DecodeError::InvalidPcm("channel count must be > 0".to_owned()).into());
        }
        Ok(Self {
            channels,
            target_frames,
            samples: Vec::with_capacity(target_frames),
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.target_frames
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames
    }

    /// Appends interleaved frames, downmixed. Trailing partial frames are dropped.
    pub fn push_interleaved(&mut self, interleaved: &[f32]) {
        if self.is_full() {
            return;
        }
        let ch = usize::from(self.channels);
        let whole = interleaved.len() - interleaved.len() % ch;
        let mono = match decode::downmix_to_mono(&interleaved[..whole], self.channels) {
            Ok(m) => m,
            Err(_) => return,
        };
        let room = self.target_frames - self.samples.len();
        self.samples.extend(mono.into_iter().take(room));
    }

    pub fn push_interleaved_i16(&mut self, interleaved: &[i16]) {
        self.push_interleaved(&decode::i16_to_f32_pcm(interleaved));
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Blocks until `shared` is full, `token` is cancelled or the deadline passes.
///
/// On cancellation the buffered frames are discarded.
pub fn wait_for_fill(
    shared: &Mutex<CaptureBuffer>,
    token: &CancelToken,
    deadline: Duration,
) -> Result<(), CaptureError> {
    let started = Instant::now();
    loop {
        if token.is_cancelled() {
            if let Ok(mut buf) = shared.lock() {
                buf.samples.clear();
            }
            tracing::info!(target: LOG_TARGET, "recording cancelled; discarding partial audio");
            return Err(CaptureError::Cancelled);
        }

        let (captured, expected) = match shared.lock() {
            Ok(buf) => (buf.len(), buf.target_frames()),
            Err(poisoned) => {
                let buf = poisoned.into_inner();
                (buf.len(), buf.target_frames())
            }
        };
        if captured >= expected {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            return Err(CaptureError::Stalled { captured, expected });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Takes the filled buffer out of `shared` and converts it to `target_hz`.
pub fn finish(
    shared: &Mutex<CaptureBuffer>,
    device_hz: u32,
    target_hz: u32,
) -> Result<AudioSample, CaptureError> {
    let samples = match shared.lock() {
        Ok(mut buf) => std::mem::take(&mut buf.samples),
        Err(poisoned) => std::mem::take(&mut poisoned.into_inner().samples),
    };
    Ok(AudioSample::new(samples, device_hz).resampled(target_hz)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn downmixes_and_stops_at_target() {
        let mut buf = CaptureBuffer::new(2, 3).unwrap();
        buf.push_interleaved(&[1.0, 0.0, 0.5, 0.5]);
        assert_eq!(buf.len(), 2);
        buf.push_interleaved(&[0.2, 0.4, 1.0, 1.0, 1.0, 1.0]);
        assert!(buf.is_full());
        let s = buf.into_samples();
        assert_eq!(s.len(), 3);
        assert!((s[0] - 0.5).abs() < 1e-6);
        assert!((s[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn partial_frames_are_dropped() {
        let mut buf = CaptureBuffer::new(2, 10).unwrap();
        buf.push_interleaved(&[0.1, 0.1, 0.9]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn i16_input_is_scaled() {
        let mut buf = CaptureBuffer::new(1, 4).unwrap();
        buf.push_interleaved_i16(&[16_384, -32_768]);
        assert_eq!(buf.into_samples(), vec![0.5, -1.0]);
    }

    #[test]
    fn zero_channels_rejected() {
        assert!(matches!(
            CaptureBuffer::new(0, 10),
            Err(CaptureError::Pcm(DecodeError::InvalidPcm(_)))
        ));
    }

    #[test]
    fn wait_returns_once_filled_by_producer() {
        let shared = Arc::new(Mutex::new(CaptureBuffer::new(1, 1_000).unwrap()));
        let producer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    shared.lock().unwrap().push_interleaved(&[0.1; 100]);
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
        };
        wait_for_fill(&shared, &CancelToken::new(), Duration::from_secs(5)).unwrap();
        producer.join().unwrap();

        let sample = finish(&shared, 22_050, 22_050).unwrap();
        assert_eq!(sample.len(), 1_000);
        assert_eq!(sample.sample_rate, 22_050);
    }

    #[test]
    fn cancellation_discards_partial_audio() {
        let shared = Mutex::new(CaptureBuffer::new(1, 1_000).unwrap());
        shared.lock().unwrap().push_interleaved(&[0.1; 400]);
        let token = CancelToken::new();
        token.cancel();

        let err = wait_for_fill(&shared, &token, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, CaptureError::Cancelled));
        assert!(shared.lock().unwrap().is_empty());
    }

    #[test]
    fn cancel_from_another_thread() {
        let shared = Mutex::new(CaptureBuffer::new(1, 1_000).unwrap());
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let err = wait_for_fill(&shared, &token, Duration::from_secs(5)).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, CaptureError::Cancelled));
    }

    #[test]
    fn stalled_device_times_out() {
        let shared = Mutex::new(CaptureBuffer::new(1, 1_000).unwrap());
        shared.lock().unwrap().push_interleaved(&[0.0; 10]);
        let err =
            wait_for_fill(&shared, &CancelToken::new(), Duration::from_millis(30)).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Stalled {
                captured: 10,
                expected: 1_000
            }
        ));
    }

    #[test]
    fn finish_resamples_to_target_rate() {
        let shared = Mutex::new(CaptureBuffer::new(1, 44_100).unwrap());
        shared.lock().unwrap().push_interleaved(&vec![0.0; 44_100]);
        let sample = finish(&shared, 44_100, 22_050).unwrap();
        assert_eq!(sample.sample_rate, 22_050);
        assert_eq!(sample.len(), 22_050);
    }
}
