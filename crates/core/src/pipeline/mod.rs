use crate::capture::CaptureError;
use crate::classifier::{EmotionModel, ModelError, ModelHandle};
use crate::decode::{AudioDecoder, AudioSample, DecodeError};
use crate::emotion::Emotion;
use crate::features::{DescriptorVector, FeatureError, FeatureExtractor};
use crate::recommend::{AdviceGenerator, MusicSearch, Recommender, Suggestions};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "pipeline";

pub const NO_EMOTION: &str = "no emotion detected";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Waveform to label, using whatever model the handle currently holds.
///
/// The extractor is rebuilt from the model's recorded settings whenever the
/// handle's model changes, so descriptors always match what it was trained on.
#[derive(Clone)]
pub struct VoiceEmotionPipeline {
    handle: ModelHandle,
    cached: Arc<Mutex<Option<(Arc<EmotionModel>, Arc<FeatureExtractor>)>>>,
}

impl VoiceEmotionPipeline {
    pub fn new(handle: ModelHandle) -> Self {
        Self {
            handle,
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn current(&self) -> Result<(Arc<EmotionModel>, Arc<FeatureExtractor>), PipelineError> {
        let model = self.handle.snapshot();
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((m, extractor)) = cached.as_ref() {
            if Arc::ptr_eq(m, &model) {
                return Ok((model, Arc::clone(extractor)));
            }
        }
        let extractor = Arc::new(FeatureExtractor::new(model.extractor_config().clone())?);
        *cached = Some((Arc::clone(&model), Arc::clone(&extractor)));
        Ok((model, extractor))
    }

    /// Descriptor for `sample` under the current model's extraction settings.
    pub fn describe(&self, sample: AudioSample) -> Result<DescriptorVector, PipelineError> {
        let (_, extractor) = self.current()?;
        let sample = sample.resampled(extractor.config().sample_rate)?;
        Ok(extractor.extract(&sample)?)
    }

    pub fn classify(&self, sample: AudioSample) -> Result<Emotion, PipelineError> {
        let (model, extractor) = self.current()?;
        let sample = sample.resampled(extractor.config().sample_rate)?;
        let descriptor = extractor.extract(&sample)?;
        let emotion = model.predict(descriptor.as_slice())?;
        tracing::info!(target: LOG_TARGET, %emotion, secs = sample.duration().as_secs_f32(), "classified");
        Ok(emotion)
    }

    pub fn classify_file(
        &self,
        decoder: &impl AudioDecoder,
        path: &Path,
    ) -> Result<Emotion, PipelineError> {
        let sample = decoder.decode(path)?;
        self.classify(sample)
    }

    /// Classifies and fetches suggestions. Classification failures are
    /// reported in the result instead of aborting.
    pub async fn detect_and_recommend<A, M>(
        &self,
        sample: AudioSample,
        recommender: &Recommender<A, M>,
    ) -> DetectionReport
    where
        A: AdviceGenerator,
        M: MusicSearch,
    {
        Self::report(self.classify(sample), recommender).await
    }

    /// Same as [`detect_and_recommend`](Self::detect_and_recommend) for a file;
    /// an undecodable file yields a report with no emotion.
    pub async fn detect_file_and_recommend<A, M>(
        &self,
        decoder: &impl AudioDecoder,
        path: &Path,
        recommender: &Recommender<A, M>,
    ) -> DetectionReport
    where
        A: AdviceGenerator,
        M: MusicSearch,
    {
        Self::report(self.classify_file(decoder, path), recommender).await
    }

    /// Turns a classification outcome (including a failed decode or
    /// recording upstream) into a report. Suggestions are only requested
    /// for a detected emotion.
    pub async fn report<A, M>(
        outcome: Result<Emotion, PipelineError>,
        recommender: &Recommender<A, M>,
    ) -> DetectionReport
    where
        A: AdviceGenerator,
        M: MusicSearch,
    {
        match outcome {
            Ok(emotion) => DetectionReport {
                emotion: Some(emotion),
                error: None,
                suggestions: Some(recommender.suggest(emotion).await),
            },
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "classification failed");
                DetectionReport {
                    emotion: None,
                    error: Some(e.to_string()),
                    suggestions: None,
                }
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DetectionReport {
    pub emotion: Option<Emotion>,
    pub error: Option<String>,
    pub suggestions: Option<Suggestions>,
}

impl DetectionReport {
    pub fn label(&self) -> String {
        match self.emotion {
            Some(e) => e.to_string(),
            None => NO_EMOTION.to_owned(),
        }
    }
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Detected emotion: {}", self.label())?;
        if let Some(reason) = &self.error {
            writeln!(f, "Reason: {reason}")?;
        }
        if let Some(s) = &self.suggestions {
            writeln!(f)?;
            writeln!(f, "Recommendations:")?;
            writeln!(f, "{}", s.advice)?;
            writeln!(f)?;
            writeln!(f, "Music:")?;
            for line in &s.music {
                writeln!(f, "- {line}")?;
            }
        }
        Ok(())
    }
}
