use crate::classifier::svm::{self, SvmParams};
use crate::classifier::{EmotionModel, PairMachine, Scaler};
use crate::config::{TestFraction, DEFAULT_SPLIT_SEED};
use crate::corpus::Corpus;
use crate::emotion::Emotion;
use crate::features::{DescriptorVector, ExtractorConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

const LOG_TARGET: &str = "classifier::train";

#[derive(Clone, Debug)]
pub struct TrainOptions {
    pub test_fraction: TestFraction,
    pub seed: u64,
    pub svm: SvmParams,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            test_fraction: TestFraction::default(),
            seed: DEFAULT_SPLIT_SEED,
            svm: SvmParams::default(),
        }
    }
}

/// What happened during a training run, including the held-out split so the
/// operator can verify accuracy after reloading the artifact.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReport {
    pub train_size: usize,
    pub eval_vectors: Vec<DescriptorVector>,
    pub eval_labels: Vec<Emotion>,
    pub eval_predictions: Vec<Emotion>,
}

impl TrainingReport {
    pub fn eval_size(&self) -> usize {
        self.eval_labels.len()
    }

    /// Share of held-out samples predicted correctly; `None` with no held-out data.
    pub fn accuracy(&self) -> Option<f64> {
        if self.eval_labels.is_empty() {
            return None;
        }
        let hits = self
            .eval_labels
            .iter()
            .zip(&self.eval_predictions)
            .filter(|(a, b)| a == b)
            .count();
        Some(hits as f64 / self.eval_labels.len() as f64)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    #[error("corpus is empty")]
    EmptyCorpus,

    #[error("corpus has {vectors} vectors but {labels} labels")]
    LengthMismatch { vectors: usize, labels: usize },

    #[error("vector {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("descriptor dimension {actual} does not match extractor n_mfcc {expected}")]
    ExtractorMismatch { expected: usize, actual: usize },

    #[error("vector {index} contains non-finite values")]
    NonFinite { index: usize },

    #[error("need at least 2 distinct labels to train, found {found}")]
    TooFewLabels { found: usize },

    #[error("held-out sample {index} could not be scored: {reason}")]
    Evaluation { index: usize, reason: String },
}

/// Shuffles `0..n` with `seed` and holds out `ceil(n * fraction)` indices,
/// keeping at least one index for training. Returns `(train, eval)`.
pub fn split_indices(n: usize, fraction: TestFraction, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let eval_len = ((n as f64 * fraction.value()).ceil() as usize).min(n.saturating_sub(1));
    let train = order.split_off(eval_len);
    (train, order)
}

fn validate(corpus: &Corpus, extractor: &ExtractorConfig) -> Result<usize, TrainError> {
    if corpus.vectors.len() != corpus.labels.len() {
        return Err(TrainError::LengthMismatch {
            vectors: corpus.vectors.len(),
            labels: corpus.labels.len(),
        });
    }
    let first = corpus.vectors.first().ok_or(TrainError::EmptyCorpus)?;
    let dim = first.len();
    if dim != extractor.n_mfcc {
        return Err(TrainError::ExtractorMismatch {
            expected: extractor.n_mfcc,
            actual: dim,
        });
    }
    for (index, v) in corpus.vectors.iter().enumerate() {
        if v.len() != dim {
            return Err(TrainError::DimensionMismatch {
                index,
                expected: dim,
                actual: v.len(),
            });
        }
        if v.as_slice().iter().any(|x| !x.is_finite()) {
            return Err(TrainError::NonFinite { index });
        }
    }
    let distinct = corpus.distinct_labels().len();
    if distinct < 2 {
        return Err(TrainError::TooFewLabels { found: distinct });
    }
    Ok(dim)
}

/// Splits the corpus, fits a one-vs-one linear SVM on the training part and
/// scores it on the held-out part.
pub fn train(
    corpus: &Corpus,
    extractor: ExtractorConfig,
    options: &TrainOptions,
) -> Result<(EmotionModel, TrainingReport), TrainError> {
    validate(corpus, &extractor)?;

    let (train_idx, eval_idx) =
        split_indices(corpus.len(), options.test_fraction, options.seed);
    let labels: Vec<Emotion> = train_idx
        .iter()
        .map(|&i| corpus.labels[i])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if labels.len() < 2 {
        return Err(TrainError::TooFewLabels {
            found: labels.len(),
        });
    }

    let train_rows: Vec<&[f32]> = train_idx
        .iter()
        .map(|&i| corpus.vectors[i].as_slice())
        .collect();
    let scaler = Scaler::fit(&train_rows);
    let scaled: Vec<Vec<f32>> = train_rows.iter().map(|r| scaler.transform(r)).collect();

    tracing::info!(
        target: LOG_TARGET,
        train = train_idx.len(),
        eval = eval_idx.len(),
        labels = labels.len(),
        "fitting one-vs-one linear svm"
    );

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut machines = Vec::with_capacity(labels.len() * (labels.len() - 1) / 2);
    for first in 0..labels.len() {
        for second in first + 1..labels.len() {
            let mut xs: Vec<&[f32]> = Vec::new();
            let mut targets: Vec<f64> = Vec::new();
            for (row, &i) in scaled.iter().zip(&train_idx) {
                let label = corpus.labels[i];
                if label == labels[first] {
                    xs.push(row.as_slice());
                    targets.push(1.0);
                } else if label == labels[second] {
                    xs.push(row.as_slice());
                    targets.push(-1.0);
                }
            }
            let svm = svm::fit_binary(&xs, &targets, &options.svm, &mut rng);
            machines.push(PairMachine { first, second, svm });
        }
    }

    let model = EmotionModel::new(extractor, labels, scaler, machines);

    let eval_vectors: Vec<DescriptorVector> =
        eval_idx.iter().map(|&i| corpus.vectors[i].clone()).collect();
    let eval_labels: Vec<Emotion> = eval_idx.iter().map(|&i| corpus.labels[i]).collect();
    let eval_predictions = evaluate(&model, &eval_vectors)?;

    let report = TrainingReport {
        train_size: train_idx.len(),
        eval_vectors,
        eval_labels,
        eval_predictions,
    };
    if let Some(acc) = report.accuracy() {
        tracing::info!(target: LOG_TARGET, accuracy = acc, "held-out accuracy");
    }
    Ok((model, report))
}

/// Predicts every held-out vector; one failure fails the whole run so
/// predictions always line up with labels.
fn evaluate(model: &EmotionModel, vectors: &[DescriptorVector]) -> Result<Vec<Emotion>, TrainError> {
    vectors
        .iter()
        .enumerate()
        .map(|(index, v)| {
            model
                .predict(v.as_slice())
                .map_err(|e| TrainError::Evaluation {
                    index,
                    reason: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Gaussian-ish blobs, one per label, in `dim` dimensions with wildly
    /// different per-dimension scales.
    fn blobs(labels: &[Emotion], per_label: usize, dim: usize, seed: u64) -> Corpus {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut corpus = Corpus::default();
        for (li, label) in labels.iter().enumerate() {
            for _ in 0..per_label {
                let v: Vec<f32> = (0..dim)
                    .map(|d| {
                        let scale = if d == 0 { 100.0 } else { 1.0 };
                        let centre = if d % labels.len() == li { 4.0 } else { 0.0 };
                        (centre + rng.random_range(-1.0f32..1.0)) * scale
                    })
                    .collect();
                corpus.push(DescriptorVector(v), *label);
            }
        }
        corpus
    }

    #[test]
    fn learns_separable_blobs() {
        let labels = [Emotion::Happy, Emotion::Sad, Emotion::Angry];
        let corpus = blobs(&labels, 40, 13, 3);
        let (model, report) =
            train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap();

        assert_eq!(model.dimension(), 13);
        assert_eq!(model.labels(), &[Emotion::Happy, Emotion::Sad, Emotion::Angry]);
        assert_eq!(report.train_size + report.eval_size(), 120);
        assert_eq!(report.eval_size(), 24);
        let acc = report.accuracy().unwrap();
        assert!(acc >= 0.9, "held-out accuracy {acc}");
    }

    #[test]
    fn reloaded_model_reproduces_held_out_predictions() {
        let labels = [Emotion::Neutral, Emotion::Calm, Emotion::Fearful, Emotion::Surprised];
        let corpus = blobs(&labels, 25, 13, 11);
        let (model, report) =
            train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emotion_model.json");
        model.save(&path).unwrap();
        let reloaded = EmotionModel::load(&path).unwrap();

        let again = reloaded
            .predict_batch(report.eval_vectors.iter().map(|v| v.as_slice()))
            .unwrap();
        assert_eq!(again, report.eval_predictions);
    }

    #[test]
    fn single_label_corpus_is_rejected() {
        let corpus = blobs(&[Emotion::Happy], 10, 13, 5);
        let err = train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap_err();
        assert_eq!(err, TrainError::TooFewLabels { found: 1 });
    }

    #[test]
    fn ragged_vectors_are_rejected() {
        let mut corpus = blobs(&[Emotion::Happy, Emotion::Sad], 5, 13, 5);
        corpus.vectors[3] = DescriptorVector(vec![0.0; 12]);
        let err = train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap_err();
        assert_eq!(
            err,
            TrainError::DimensionMismatch {
                index: 3,
                expected: 13,
                actual: 12
            }
        );
    }

    #[test]
    fn empty_and_mismatched_corpora_are_rejected() {
        let err = train(&Corpus::default(), ExtractorConfig::default(), &TrainOptions::default())
            .unwrap_err();
        assert_eq!(err, TrainError::EmptyCorpus);

        let mut corpus = blobs(&[Emotion::Happy, Emotion::Sad], 3, 13, 1);
        corpus.labels.pop();
        assert!(matches!(
            train(&corpus, ExtractorConfig::default(), &TrainOptions::default()),
            Err(TrainError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn descriptor_length_must_match_extractor() {
        let corpus = blobs(&[Emotion::Happy, Emotion::Sad], 5, 10, 2);
        let err = train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap_err();
        assert_eq!(
            err,
            TrainError::ExtractorMismatch {
                expected: 13,
                actual: 10
            }
        );
    }

    #[test]
    fn model_rejects_wrong_dimension_at_inference() {
        let corpus = blobs(&[Emotion::Happy, Emotion::Sad], 10, 13, 9);
        let (model, _) =
            train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap();
        assert!(matches!(
            model.predict(&[0.0; 10]),
            Err(crate::classifier::ModelError::DimensionMismatch {
                expected: 13,
                actual: 10
            })
        ));
    }

    #[test]
    fn split_is_reproducible_and_sized() {
        let f = TestFraction::new(0.2).unwrap();
        let (train_a, eval_a) = split_indices(101, f, 42);
        let (train_b, eval_b) = split_indices(101, f, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(eval_a, eval_b);
        assert_eq!(eval_a.len(), 21);
        assert_eq!(train_a.len(), 80);

        let mut all: Vec<usize> = train_a.into_iter().chain(eval_a).collect();
        all.sort();
        assert_eq!(all, (0..101).collect::<Vec<_>>());

        let (train_small, eval_small) = split_indices(1, f, 42);
        assert_eq!((train_small.len(), eval_small.len()), (1, 0));
    }

    #[test]
    fn evaluation_failure_is_reported_not_dropped() {
        let corpus = blobs(&[Emotion::Happy, Emotion::Sad], 10, 13, 4);
        let (model, _) =
            train(&corpus, ExtractorConfig::default(), &TrainOptions::default()).unwrap();
        let vectors = vec![
            corpus.vectors[0].clone(),
            DescriptorVector(vec![0.0; 10]),
            corpus.vectors[1].clone(),
        ];
        let err = evaluate(&model, &vectors).unwrap_err();
        assert!(matches!(err, TrainError::Evaluation { index: 1, .. }));
        assert_eq!(evaluate(&model, &corpus.vectors[..3]).unwrap().len(), 3);
    }
}
