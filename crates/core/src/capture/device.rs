use crate::capture::{self, CancelToken, CaptureBuffer, CaptureError, LOG_TARGET, STALL_GRACE};
use crate::config::{RecordDuration, SampleRate};
use crate::decode::AudioSample;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Records from the host's default input device.
#[derive(Clone, Debug, Default)]
pub struct MicrophoneRecorder {
    target_rate: SampleRate,
}

impl MicrophoneRecorder {
    pub fn new(target_rate: SampleRate) -> Self {
        Self { target_rate }
    }

    /// Records `duration`, downmixed and resampled to the target rate.
    ///
    /// The stream is dropped on every return path; cancelled recordings
    /// return [`CaptureError::Cancelled`] and no audio.
    pub fn record(
        &self,
        duration: RecordDuration,
        token: &CancelToken,
    ) -> Result<AudioSample, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;
        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        let device_hz = supported.sample_rate().0;
        let channels = supported.channels();
        let frames = duration.frames_for_sample_rate(device_hz) as usize;
        let shared = Arc::new(Mutex::new(CaptureBuffer::new(channels, frames)?));

        tracing::info!(
            target: LOG_TARGET,
            device = %device.name().unwrap_or_else(|_| "<unnamed>".to_owned()),
            sample_rate = device_hz,
            channels,
            secs = duration.secs,
            "recording"
        );

        let err_fn = |err: cpal::StreamError| {
            tracing::warn!(target: LOG_TARGET, error = %err, "input stream error");
        };
        let config = supported.config();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                let sink = Arc::clone(&shared);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = sink.lock() {
                            buf.push_interleaved(data);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            cpal::SampleFormat::I16 => {
                let sink = Arc::clone(&shared);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = sink.lock() {
                            buf.push_interleaved_i16(data);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        }
        .map_err(|e| CaptureError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        let waited = capture::wait_for_fill(&shared, token, duration.duration() + STALL_GRACE);
        drop(stream);
        waited?;

        capture::finish(&shared, device_hz, self.target_rate.hz())
    }
}
