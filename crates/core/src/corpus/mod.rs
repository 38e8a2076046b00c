mod naming;
mod walker;

use crate::emotion::Emotion;
use crate::features::DescriptorVector;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub use naming::{ClipName, ClipNameError};
pub use walker::DatasetWalker;

/// Labeled descriptors extracted from a corpus, plus every file that was left out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Corpus {
    pub vectors: Vec<DescriptorVector>,
    pub labels: Vec<Emotion>,
    pub skips: Vec<Skip>,
}

impl Corpus {
    pub fn push(&mut self, vector: DescriptorVector, label: Emotion) {
        self.vectors.push(vector);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn distinct_labels(&self) -> BTreeSet<Emotion> {
        self.labels.iter().copied().collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Skip {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("malformed file name: {0}")]
    MalformedName(#[from] ClipNameError),

    #[error("unmapped emotion code {0:?}")]
    UnmappedLabel(String),

    #[error("unreadable directory: {0}")]
    Unreadable(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("augmentation failed: {0}")]
    Augment(String),

    #[error("feature extraction failed: {0}")]
    Extract(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CorpusError {
    #[error("cannot read corpus root {path}: {source}")]
    ReadRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
