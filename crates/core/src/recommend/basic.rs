use crate::emotion::Emotion;
use crate::recommend::{AdviceGenerator, MusicSearch, RecommendError, Track};
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

const FALLBACK_TIP: &str = "Stay positive!";

/// Offline advice: one tip drawn at random from a small pool per emotion.
#[derive(Clone, Debug)]
pub struct BasicAdviceGenerator {
    rng: Arc<Mutex<StdRng>>,
}

impl Default for BasicAdviceGenerator {
    fn default() -> Self {
        Self::from_rng(StdRng::from_rng(&mut rand::rng()))
    }
}

impl BasicAdviceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic tip selection.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    fn pool(emotion: Emotion) -> &'static [&'static str] {
        match emotion {
            Emotion::Happy => &[
                "Share the good mood with someone today.",
                "Put on a playlist you love and dance a little.",
                "Great energy! Write down what made today good.",
                "Keep smiling, it suits you.",
            ],
            Emotion::Sad => &[
                "It is fine to feel this way. Take a short break and rest.",
                "Reach out to a friend, even with a short message.",
                "Some daylight and a slow walk can help.",
                "Try a short uplifting video or a comedy clip.",
            ],
            Emotion::Angry => &[
                "Take a few slow, deep breaths before doing anything else.",
                "Step away for a few minutes and let it settle.",
                "A brisk walk can help burn off the tension.",
                "Focus on the part you can actually control.",
            ],
            Emotion::Fearful => &[
                "You are not alone in this. Talk to someone you trust.",
                "Name what worries you and write it down.",
                "Try a grounding exercise: five things you can see, four you can hear.",
                "Focus on the next small step, not the whole problem.",
            ],
            Emotion::Disgust => &[
                "Change your surroundings for a moment.",
                "Shift your attention to something you enjoy.",
                "Give yourself some time to process what happened.",
            ],
            Emotion::Surprised => &[
                "Take a moment to process before reacting.",
                "Unexpected things keep life interesting.",
                "Want to tell someone about it?",
            ],
            Emotion::Neutral => &[
                "Hope the day is treating you well.",
                "A good time to pick up a hobby or learn something new.",
                "Steady is good. Maybe try something new today?",
            ],
            Emotion::Calm => &[],
        }
    }

    fn tip(&self, emotion: Emotion) -> &'static str {
        let pool = Self::pool(emotion);
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pool.choose(&mut *rng).copied().unwrap_or(FALLBACK_TIP)
    }
}

impl AdviceGenerator for BasicAdviceGenerator {
    fn advise(&self, emotion: Emotion) -> BoxFuture<'_, Result<String, RecommendError>> {
        let tip = self.tip(emotion).to_owned();
        async move { Ok(tip) }.boxed()
    }
}

/// Music search with no backend configured; always finds nothing.
#[derive(Clone, Debug, Default)]
pub struct NoMusicSearch;

impl MusicSearch for NoMusicSearch {
    fn search(
        &self,
        _query: String,
        _limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Track>, RecommendError>> {
        async { Ok(Vec::new()) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::{Recommender, NO_MUSIC};

    #[tokio::test]
    async fn every_emotion_gets_advice_from_its_pool() {
        let g = BasicAdviceGenerator::with_seed(1);
        for e in Emotion::ALL {
            let text = g.advise(e).await.unwrap();
            let pool = BasicAdviceGenerator::pool(e);
            if pool.is_empty() {
                assert_eq!(text, FALLBACK_TIP);
            } else {
                assert!(pool.contains(&text.as_str()), "{e}: {text}");
            }
        }
    }

    #[tokio::test]
    async fn same_seed_same_tips() {
        let a = BasicAdviceGenerator::with_seed(9);
        let b = BasicAdviceGenerator::with_seed(9);
        for _ in 0..10 {
            assert_eq!(
                a.advise(Emotion::Sad).await.unwrap(),
                b.advise(Emotion::Sad).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn draws_vary_across_calls() {
        let g = BasicAdviceGenerator::with_seed(3);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..50 {
            seen.insert(g.advise(Emotion::Angry).await.unwrap());
        }
        assert!(seen.len() > 1);
    }

    #[tokio::test]
    async fn calm_falls_back_to_generic_tip() {
        let g = BasicAdviceGenerator::with_seed(0);
        assert_eq!(g.advise(Emotion::Calm).await.unwrap(), FALLBACK_TIP);
    }

    #[tokio::test]
    async fn offline_recommender_falls_back_for_music() {
        let r = Recommender::new(BasicAdviceGenerator::with_seed(5), NoMusicSearch);
        let s = r.suggest(Emotion::Angry).await;
        assert!(BasicAdviceGenerator::pool(Emotion::Angry).contains(&s.advice.as_str()));
        assert_eq!(s.music, vec![NO_MUSIC.to_owned()]);
    }
}
