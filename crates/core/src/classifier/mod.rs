//! One-vs-one linear SVM over descriptor vectors.
//!
//! A trained [`EmotionModel`] is immutable. Serving code shares it through a
//! [`ModelHandle`]; retraining produces a new model that replaces the old
//! one wholesale.

mod artifact;
mod handle;
pub mod svm;
mod train;

use crate::emotion::Emotion;
use crate::features::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use handle::ModelHandle;
pub use svm::{LinearSvm, SvmParams};
pub use train::{split_indices, train, TrainError, TrainOptions, TrainingReport};

pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Per-dimension standardization learned on the training split.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl Scaler {
    pub fn fit(rows: &[&[f32]]) -> Self {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0f64; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += f64::from(*v);
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0f64; dim];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row.iter()).zip(&mean) {
                *acc += (f64::from(*v) - m).powi(2);
            }
        }
        let scale = var
            .iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                // Constant dimensions pass through unscaled.
                if sd > 1e-12 {
                    sd as f32
                } else {
                    1.0
                }
            })
            .collect();

        Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        }
    }

    pub fn transform(&self, x: &[f32]) -> Vec<f32> {
        x.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

/// Binary machine voting between `labels[first]` (positive side) and `labels[second]`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PairMachine {
    pub first: usize,
    pub second: usize,
    pub svm: LinearSvm,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionModel {
    version: u32,
    extractor: ExtractorConfig,
    labels: Vec<Emotion>,
    scaler: Scaler,
    machines: Vec<PairMachine>,
}

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("model artifact not found at {path}; train a model first")]
    Missing { path: PathBuf },

    #[error("cannot read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("descriptor has {actual} dimensions, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("descriptor value at index {index} is not finite")]
    NonFiniteInput { index: usize },

    #[error("cannot write model artifact {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl EmotionModel {
    pub(crate) fn new(
        extractor: ExtractorConfig,
        labels: Vec<Emotion>,
        scaler: Scaler,
        machines: Vec<PairMachine>,
    ) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            extractor,
            labels,
            scaler,
            machines,
        }
    }

    /// Input dimensionality the model was trained on.
    pub fn dimension(&self) -> usize {
        self.scaler.mean.len()
    }

    pub fn labels(&self) -> &[Emotion] {
        &self.labels
    }

    /// Extraction settings the training descriptors were produced with.
    pub fn extractor_config(&self) -> &ExtractorConfig {
        &self.extractor
    }

    pub fn predict(&self, descriptor: &[f32]) -> Result<Emotion, ModelError> {
        if descriptor.len() != self.dimension() {
            return Err(ModelError::DimensionMismatch {
                expected: self.dimension(),
                actual: descriptor.len(),
            });
        }
        if let Some(index) = descriptor.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput { index });
        }

        let x = self.scaler.transform(descriptor);
        let mut votes = vec![0u32; self.labels.len()];
        for m in &self.machines {
            if m.svm.decision(&x) > 0.0 {
                votes[m.first] += 1;
            } else {
                votes[m.second] += 1;
            }
        }

        // Ties go to the earliest label.
        let mut best = 0;
        for (i, v) in votes.iter().enumerate() {
            if *v > votes[best] {
                best = i;
            }
        }
        Ok(self.labels[best])
    }

    pub fn predict_batch<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a [f32]>,
    ) -> Result<Vec<Emotion>, ModelError> {
        descriptors.into_iter().map(|d| self.predict(d)).collect()
    }

    /// Structural checks applied to anything read from disk.
    fn check_consistency(&self) -> Result<(), String> {
        let dim = self.dimension();
        if self.labels.len() < 2 {
            return Err(format!("needs at least 2 labels, found {}", self.labels.len()));
        }
        if dim == 0 || self.scaler.scale.len() != dim {
            return Err("scaler dimensions disagree".to_owned());
        }
        if dim != self.extractor.n_mfcc {
            return Err(format!(
                "input dimension {dim} disagrees with n_mfcc {}",
                self.extractor.n_mfcc
            ));
        }
        self.extractor
            .validate()
            .map_err(|e| format!("extractor config: {e}"))?;
        let expected_machines = self.labels.len() * (self.labels.len() - 1) / 2;
        if self.machines.len() != expected_machines {
            return Err(format!(
                "expected {expected_machines} pairwise machines, found {}",
                self.machines.len()
            ));
        }
        for m in &self.machines {
            if m.first >= self.labels.len() || m.second >= self.labels.len() {
                return Err("pairwise machine refers to unknown label".to_owned());
            }
            if m.svm.weights.len() != dim {
                return Err("pairwise machine weight length disagrees".to_owned());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model() -> EmotionModel {
        // Positive first coordinate -> happy, negative -> sad.
        EmotionModel::new(
            ExtractorConfig::default().with_n_mfcc(2),
            vec![Emotion::Happy, Emotion::Sad],
            Scaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
            vec![PairMachine {
                first: 0,
                second: 1,
                svm: LinearSvm {
                    weights: vec![1.0, 0.0],
                    bias: 0.0,
                },
            }],
        )
    }

    #[test]
    fn predicts_by_vote() {
        let model = toy_model();
        assert_eq!(model.predict(&[3.0, 1.0]).unwrap(), Emotion::Happy);
        assert_eq!(model.predict(&[-3.0, 1.0]).unwrap(), Emotion::Sad);
    }

    #[test]
    fn dimension_mismatch_is_explicit() {
        let model = toy_model();
        let err = model.predict(&[1.0; 10]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DimensionMismatch {
                expected: 2,
                actual: 10
            }
        ));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let err = toy_model().predict(&[f32::INFINITY, 0.0]).unwrap_err();
        assert!(matches!(err, ModelError::NonFiniteInput { index: 0 }));
    }

    #[test]
    fn scaler_standardizes_and_tolerates_constant_columns() {
        let (a, b) = ([1.0f32, 5.0], [3.0f32, 5.0]);
        let rows = vec![a.as_slice(), b.as_slice()];
        let scaler = Scaler::fit(&rows);
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn consistency_check_catches_wrong_machine_count() {
        let mut model = toy_model();
        assert!(model.check_consistency().is_ok());
        model.machines.clear();
        assert!(model.check_consistency().is_err());
    }
}
