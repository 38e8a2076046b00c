use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of emotion labels the voice classifier can be trained on.
///
/// Ordering follows the two-digit corpus codes, which also fixes the
/// tie-break order used by one-vs-one voting.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Calm,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgust,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Calm,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgust,
        Emotion::Surprised,
    ];

    /// Maps a two-digit corpus code ("01".."08") to its label.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Emotion::Neutral),
            "02" => Some(Emotion::Calm),
            "03" => Some(Emotion::Happy),
            "04" => Some(Emotion::Sad),
            "05" => Some(Emotion::Angry),
            "06" => Some(Emotion::Fearful),
            "07" => Some(Emotion::Disgust),
            "08" => Some(Emotion::Surprised),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Emotion::Neutral => "01",
            Emotion::Calm => "02",
            Emotion::Happy => "03",
            Emotion::Sad => "04",
            Emotion::Angry => "05",
            Emotion::Fearful => "06",
            Emotion::Disgust => "07",
            Emotion::Surprised => "08",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Calm => "calm",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgust => "disgust",
            Emotion::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_the_table() {
        for e in Emotion::ALL {
            assert_eq!(Emotion::from_code(e.code()), Some(e));
        }
    }

    #[test]
    fn unmapped_codes_are_none() {
        assert_eq!(Emotion::from_code("99"), None);
        assert_eq!(Emotion::from_code("00"), None);
        assert_eq!(Emotion::from_code("3"), None);
    }

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("Happy".parse::<Emotion>().unwrap(), Emotion::Happy);
        assert_eq!(" sad ".parse::<Emotion>().unwrap(), Emotion::Sad);
        let err = "Lonely".parse::<Emotion>().unwrap_err();
        assert!(err.to_string().contains("Lonely"));
    }

    #[test]
    fn serializes_as_lowercase_string() {
        let s = serde_json::to_string(&Emotion::Surprised).unwrap();
        assert_eq!(s, "\"surprised\"");
    }
}
