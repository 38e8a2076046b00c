use crate::emotion::Emotion;
use std::path::Path;
use std::str::FromStr;

const EMOTION_TOKEN: usize = 2;

/// Metadata encoded in a corpus file stem such as `03-01-05-02-01-02-12`:
/// modality, vocal channel, emotion, intensity, statement, repetition, actor.
///
/// Only the first three tokens are required; the rest are kept when present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipName {
    pub modality: String,
    pub vocal_channel: String,
    pub emotion_code: String,
    pub intensity: Option<String>,
    pub statement: Option<String>,
    pub repetition: Option<String>,
    pub actor: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipNameError {
    #[error("file name has no usable stem")]
    MissingStem,

    #[error("expected at least 3 hyphen-separated tokens, found {found}")]
    TooFewTokens { found: usize },

    #[error("empty token at position {position}")]
    EmptyToken { position: usize },

    #[error("emotion token must be two digits, got {0:?}")]
    BadEmotionToken(String),
}

impl ClipName {
    pub fn from_path(path: &Path) -> Result<Self, ClipNameError> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .ok_or(ClipNameError::MissingStem)?
            .parse()
    }

    /// Label for the emotion code, `None` when the code is outside the table.
    pub fn emotion(&self) -> Option<Emotion> {
        Emotion::from_code(&self.emotion_code)
    }
}

impl FromStr for ClipName {
    type Err = ClipNameError;

    fn from_str(stem: &str) -> Result<Self, Self::Err> {
        if stem.is_empty() {
            return Err(ClipNameError::MissingStem);
        }
        let tokens: Vec<&str> = stem.split('-').collect();
        if tokens.len() <= EMOTION_TOKEN {
            return Err(ClipNameError::TooFewTokens {
                found: tokens.len(),
            });
        }
        if let Some(position) = tokens[..=EMOTION_TOKEN].iter().position(|t| t.is_empty()) {
            return Err(ClipNameError::EmptyToken { position });
        }

        let code = tokens[EMOTION_TOKEN];
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ClipNameError::BadEmotionToken(code.to_owned()));
        }

        let opt = |i: usize| tokens.get(i).map(|t| (*t).to_owned());
        Ok(Self {
            modality: tokens[0].to_owned(),
            vocal_channel: tokens[1].to_owned(),
            emotion_code: code.to_owned(),
            intensity: opt(3),
            statement: opt(4),
            repetition: opt(5),
            actor: opt(6),
        })
    }
}
