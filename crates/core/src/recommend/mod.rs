//! Advice and music suggestions for a detected emotion.
//!
//! Both collaborators may fail or come back empty. [`Recommender`] turns
//! those outcomes into fixed display strings so callers always have
//! something to show next to the label.

mod basic;

use crate::emotion::Emotion;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use basic::{BasicAdviceGenerator, NoMusicSearch};

const LOG_TARGET: &str = "recommend";

pub const NO_ADVICE: &str = "No recommendations available at the moment.";
pub const NO_MUSIC: &str = "No music recommendations available at the moment.";
pub const DEFAULT_MUSIC_LIMIT: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub name: String,
    pub link: String,
}

impl Track {
    pub fn render(&self) -> String {
        format!("{} - {}", self.name, self.link)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RecommendError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    BadResponse(String),
}

pub trait AdviceGenerator: Send + Sync {
    fn advise(&self, emotion: Emotion) -> BoxFuture<'_, Result<String, RecommendError>>;
}

pub trait MusicSearch: Send + Sync {
    fn search(&self, query: String, limit: usize)
        -> BoxFuture<'_, Result<Vec<Track>, RecommendError>>;
}

/// Search query used to look up music for an emotion.
pub fn mood_query(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Sad => "happy music",
        Emotion::Happy => "joyful party music",
        Emotion::Angry => "calming music",
        Emotion::Calm => "chill vibes",
        _ => "mood music",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestions {
    pub advice: String,
    pub music: Vec<String>,
}

#[derive(Clone)]
pub struct Recommender<A, M> {
    advice: A,
    music: M,
    music_limit: usize,
}

impl<A, M> Recommender<A, M>
where
    A: AdviceGenerator,
    M: MusicSearch,
{
    pub fn new(advice: A, music: M) -> Self {
        Self {
            advice,
            music,
            music_limit: DEFAULT_MUSIC_LIMIT,
        }
    }

    pub fn with_music_limit(mut self, limit: usize) -> Self {
        self.music_limit = limit;
        self
    }

    pub async fn advice_for(&self, emotion: Emotion) -> String {
        match self.advice.advise(emotion).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => NO_ADVICE.to_owned(),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, %emotion, "advice generator failed");
                NO_ADVICE.to_owned()
            }
        }
    }

    pub async fn music_for(&self, emotion: Emotion) -> Vec<String> {
        let query = mood_query(emotion).to_owned();
        match self.music.search(query, self.music_limit).await {
            Ok(tracks) if tracks.is_empty() => vec![NO_MUSIC.to_owned()],
            Ok(tracks) => tracks.iter().map(Track::render).collect(),
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, %emotion, "music search failed");
                vec![format!("Error fetching music recommendations: {e}")]
            }
        }
    }

    pub async fn suggest(&self, emotion: Emotion) -> Suggestions {
        let (advice, music) = futures::join!(self.advice_for(emotion), self.music_for(emotion));
        Suggestions { advice, music }
    }
}
