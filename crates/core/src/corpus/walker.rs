use crate::augment::Augmenter;
use crate::corpus::{ClipName, Corpus, CorpusError, Skip, SkipReason};
use crate::decode::AudioDecoder;
use crate::features::{DescriptorVector, FeatureExtractor};
use std::fs;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "corpus::walker";

/// Batch driver over a `root/<session>/<clip>.wav` tree.
///
/// Every clip goes through name parsing, label lookup, decoding,
/// resampling to the extractor rate, optional augmentation and feature
/// extraction. A failure at any step skips that one clip.
pub struct DatasetWalker<D> {
    decoder: D,
    extractor: FeatureExtractor,
    augmenter: Option<Augmenter>,
}

impl<D: AudioDecoder> DatasetWalker<D> {
    pub fn new(decoder: D, extractor: FeatureExtractor) -> Self {
        Self {
            decoder,
            extractor,
            augmenter: None,
        }
    }

    pub fn with_augmentation(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn walk(&self, root: &Path) -> Result<Corpus, CorpusError> {
        let sessions = sorted_entries(root).map_err(|source| CorpusError::ReadRoot {
            path: root.to_path_buf(),
            source,
        })?;
        tracing::info!(target: LOG_TARGET, root = %root.display(), sessions = sessions.len(), "walking corpus");

        let mut corpus = Corpus::default();
        for session in sessions.iter().filter(|p| p.is_dir()) {
            tracing::info!(target: LOG_TARGET, session = %session.display(), "processing session");

            let files = match sorted_entries(session) {
                Ok(files) => files,
                Err(e) => {
                    record_skip(&mut corpus, session, SkipReason::Unreadable(e.to_string()));
                    continue;
                }
            };

            for file in files.iter().filter(|p| p.is_file() && is_wav(p)) {
                match self.process_clip(file) {
                    Ok((label, vectors)) => {
                        tracing::debug!(target: LOG_TARGET, file = %file.display(), %label, variants = vectors.len(), "extracted");
                        for v in vectors {
                            corpus.push(v, label);
                        }
                    }
                    Err(reason) => record_skip(&mut corpus, file, reason),
                }
            }
        }

        tracing::info!(
            target: LOG_TARGET,
            vectors = corpus.len(),
            skipped = corpus.skips.len(),
            "corpus extraction finished"
        );
        Ok(corpus)
    }

    fn process_clip(
        &self,
        path: &Path,
    ) -> Result<(crate::emotion::Emotion, Vec<DescriptorVector>), SkipReason> {
        let name = ClipName::from_path(path)?;
        let label = name
            .emotion()
            .ok_or_else(|| SkipReason::UnmappedLabel(name.emotion_code.clone()))?;

        let sample = self
            .decoder
            .decode(path)
            .and_then(|s| s.resampled(self.extractor.config().sample_rate))
            .map_err(|e| SkipReason::Decode(e.to_string()))?;

        let variants = match &self.augmenter {
            Some(augmenter) => augmenter
                .variants(&sample)
                .map_err(|e| SkipReason::Augment(e.to_string()))?,
            None => vec![sample],
        };

        let vectors = variants
            .iter()
            .map(|v| self.extractor.extract(v))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SkipReason::Extract(e.to_string()))?;
        Ok((label, vectors))
    }
}

fn record_skip(corpus: &mut Corpus, path: &Path, reason: SkipReason) {
    tracing::warn!(target: LOG_TARGET, path = %path.display(), %reason, "skipping");
    corpus.skips.push(Skip {
        path: path.to_path_buf(),
        reason,
    });
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{AudioSample, DecodeError, WavDecoder};
    use crate::emotion::Emotion;
    use crate::features::ExtractorConfig;
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_tone(path: &Path, freq: f32, secs: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let n = (secs * 22_050.0) as usize;
        for i in 0..n {
            let s = 0.3 * (2.0 * PI * freq * i as f32 / 22_050.0).sin();
            writer.write_sample((s * 32_767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn walker() -> DatasetWalker<WavDecoder> {
        DatasetWalker::new(
            WavDecoder::new(),
            FeatureExtractor::new(ExtractorConfig::default()).unwrap(),
        )
    }

    /// Counts decode calls and hands back a fixed tone.
    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl AudioDecoder for CountingDecoder {
        fn decode(&self, _path: &Path) -> Result<AudioSample, DecodeError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(AudioSample::new(vec![0.25; 4_096], 22_050))
        }
    }

    #[test]
    fn mapped_and_unmapped_codes() {
        let dir = tempfile::tempdir().unwrap();
        let actor = dir.path().join("Actor_01");
        fs::create_dir(&actor).unwrap();
        write_tone(&actor.join("03-01-03-01-01-01-01.wav"), 440.0, 0.5);
        write_tone(&actor.join("03-01-99-01-01-01-01.wav"), 440.0, 0.5);

        let corpus = walker().walk(dir.path()).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.labels, vec![Emotion::Happy]);
        assert_eq!(corpus.vectors[0].len(), 13);
        assert_eq!(corpus.skips.len(), 1);
        assert_eq!(
            corpus.skips[0].reason,
            SkipReason::UnmappedLabel("99".to_owned())
        );
    }

    #[test]
    fn returns_k_pairs_and_m_skips() {
        let dir = tempfile::tempdir().unwrap();
        for (session, codes) in [("Actor_01", ["01", "04", "42"]), ("Actor_02", ["05", "77", "08"])] {
            let path = dir.path().join(session);
            fs::create_dir(&path).unwrap();
            for (i, code) in codes.iter().enumerate() {
                fs::write(path.join(format!("03-01-{code}-01-01-0{i}-01.wav")), b"").unwrap();
            }
        }

        let decoder = CountingDecoder {
            calls: AtomicUsize::new(0),
        };
        let walker = DatasetWalker::new(
            decoder,
            FeatureExtractor::new(ExtractorConfig::default()).unwrap(),
        );
        let corpus = walker.walk(dir.path()).unwrap();

        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.vectors.len(), corpus.labels.len());
        assert_eq!(corpus.skips.len(), 2);
        // Unmapped clips are never decoded.
        assert_eq!(walker.decoder.calls.load(Ordering::Relaxed), 4);
        assert_eq!(
            corpus.labels,
            vec![Emotion::Neutral, Emotion::Sad, Emotion::Angry, Emotion::Surprised]
        );
    }

    #[test]
    fn decode_failures_do_not_abort_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let actor = dir.path().join("Actor_03");
        fs::create_dir(&actor).unwrap();
        fs::write(actor.join("03-01-02-01-01-01-03.wav"), b"not a wav").unwrap();
        write_tone(&actor.join("03-01-06-01-01-02-03.wav"), 300.0, 0.5);

        let corpus = walker().walk(dir.path()).unwrap();
        assert_eq!(corpus.labels, vec![Emotion::Fearful]);
        assert_eq!(corpus.skips.len(), 1);
        assert!(matches!(corpus.skips[0].reason, SkipReason::Decode(_)));
    }

    #[test]
    fn ignores_non_wav_files_and_top_level_files() {
        let dir = tempfile::tempdir().unwrap();
        let actor = dir.path().join("Actor_04");
        fs::create_dir(&actor).unwrap();
        write_tone(&actor.join("03-01-07-01-01-01-04.WAV"), 500.0, 0.5);
        fs::write(actor.join("notes.txt"), b"ignore me").unwrap();
        write_tone(&dir.path().join("03-01-01-01-01-01-00.wav"), 500.0, 0.5);

        let corpus = walker().walk(dir.path()).unwrap();
        assert_eq!(corpus.labels, vec![Emotion::Disgust]);
        assert!(corpus.skips.is_empty());
    }

    #[test]
    fn malformed_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let actor = dir.path().join("Actor_05");
        fs::create_dir(&actor).unwrap();
        fs::write(actor.join("take1.wav"), b"").unwrap();

        let decoder = CountingDecoder {
            calls: AtomicUsize::new(0),
        };
        let walker = DatasetWalker::new(
            decoder,
            FeatureExtractor::new(ExtractorConfig::default()).unwrap(),
        );
        let corpus = walker.walk(dir.path()).unwrap();
        assert!(corpus.is_empty());
        assert!(matches!(
            corpus.skips[0].reason,
            SkipReason::MalformedName(_)
        ));
    }

    #[test]
    fn augmentation_triples_examples_with_same_label() {
        let dir = tempfile::tempdir().unwrap();
        let actor = dir.path().join("Actor_06");
        fs::create_dir(&actor).unwrap();
        write_tone(&actor.join("03-01-04-01-01-01-06.wav"), 440.0, 1.0);

        let corpus = walker()
            .with_augmentation(Augmenter::default())
            .walk(dir.path())
            .unwrap();
        assert_eq!(corpus.labels, vec![Emotion::Sad; 3]);
        assert!(corpus.vectors.iter().all(|v| v.len() == 13));
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = walker().walk(Path::new("/nonexistent/corpus")).unwrap_err();
        assert!(matches!(err, CorpusError::ReadRoot { .. }));
    }
}
