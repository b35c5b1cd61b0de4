//! Song catalogue model and the closed emotion and language vocabularies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A curated song tagged with one mood and one language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    /// YouTube, Spotify or any other link
    pub url: String,
    pub emotion: Emotion,
    pub language: Language,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a song to the catalogue
#[derive(Debug, Clone)]
pub struct CreateSongInput {
    pub title: String,
    pub artist: String,
    pub url: String,
    pub emotion: Emotion,
    pub language: Language,
}

/// Mood tag. The first seven are the classifier's labels, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
    Excited,
    Stressed,
    Lonely,
    Depression,
    TroubleSleeping,
    Travelling,
    Pregnant,
}

impl Emotion {
    /// Labels the classifier can produce, indexed by output position.
    pub const DETECTABLE: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    /// Every mood a song may be tagged with.
    pub const ALL: [Emotion; 14] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Excited,
        Emotion::Stressed,
        Emotion::Lonely,
        Emotion::Depression,
        Emotion::TroubleSleeping,
        Emotion::Travelling,
        Emotion::Pregnant,
    ];

    /// Canonical display and storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Neutral => "Neutral",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Excited => "Excited",
            Emotion::Stressed => "Stressed",
            Emotion::Lonely => "Lonely",
            Emotion::Depression => "Depression",
            Emotion::TroubleSleeping => "Trouble Sleeping",
            Emotion::Travelling => "Travelling",
            Emotion::Pregnant => "Pregnant",
        }
    }

    /// Classifier label at `index`, if any.
    pub fn from_index(index: usize) -> Option<Emotion> {
        Self::DETECTABLE.get(index).copied()
    }

    pub fn is_detectable(&self) -> bool {
        Self::DETECTABLE.contains(self)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case and drop separators so "Trouble Sleeping", "trouble_sleeping"
/// and "TroubleSleeping" compare equal.
fn normalize_label(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for Emotion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(s.trim());
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| normalize_label(e.as_str()) == wanted)
            .ok_or_else(|| anyhow::anyhow!("Invalid emotion: {}", s))
    }
}

impl Serialize for Emotion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Emotion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Song language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    English,
    Hindi,
    Tamil,
    Telugu,
    Malayalam,
    Kannada,
    Bengali,
    Marathi,
    Punjabi,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::English,
        Language::Hindi,
        Language::Tamil,
        Language::Telugu,
        Language::Malayalam,
        Language::Kannada,
        Language::Bengali,
        Language::Marathi,
        Language::Punjabi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Malayalam => "Malayalam",
            Language::Kannada => "Kannada",
            Language::Bengali => "Bengali",
            Language::Marathi => "Marathi",
            Language::Punjabi => "Punjabi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(s.trim());
        Language::ALL
            .iter()
            .copied()
            .find(|l| normalize_label(l.as_str()) == wanted)
            .ok_or_else(|| anyhow::anyhow!("Invalid language: {}", s))
    }
}

impl TryFrom<String> for Language {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detectable_order_matches_classifier_output() {
        let labels: Vec<&str> = Emotion::DETECTABLE.iter().map(|e| e.as_str()).collect();
        assert_eq!(
            labels,
            ["Angry", "Disgust", "Fear", "Happy", "Neutral", "Sad", "Surprise"]
        );
        assert_eq!(Emotion::from_index(3), Some(Emotion::Happy));
        assert_eq!(Emotion::from_index(7), None);
    }

    #[test]
    fn test_emotion_parsing_variants() {
        assert_eq!("happy".parse::<Emotion>().unwrap(), Emotion::Happy);
        assert_eq!(" SAD ".parse::<Emotion>().unwrap(), Emotion::Sad);
        assert_eq!("trouble_sleeping".parse::<Emotion>().unwrap(), Emotion::TroubleSleeping);
        assert_eq!("Trouble Sleeping".parse::<Emotion>().unwrap(), Emotion::TroubleSleeping);
        assert!("Bored".parse::<Emotion>().is_err());
        assert!("".parse::<Emotion>().is_err());
    }

    #[test]
    fn test_only_classifier_labels_are_detectable() {
        assert!(Emotion::Surprise.is_detectable());
        assert!(!Emotion::Travelling.is_detectable());
    }

    #[test]
    fn test_serde_uses_display_form() {
        let json = serde_json::to_string(&Emotion::TroubleSleeping).unwrap();
        assert_eq!(json, "\"Trouble Sleeping\"");
        let lang: Language = serde_json::from_str("\"tamil\"").unwrap();
        assert_eq!(lang, Language::Tamil);
        assert!(serde_json::from_str::<Language>("\"Klingon\"").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn emotion_display_parses_back(idx in 0usize..14, upper in any::<bool>()) {
            let emotion = Emotion::ALL[idx];
            let text = if upper { emotion.to_string().to_uppercase() } else { emotion.to_string() };
            prop_assert_eq!(text.parse::<Emotion>().unwrap(), emotion);
        }

        #[test]
        fn language_display_parses_back(idx in 0usize..9) {
            let language = Language::ALL[idx];
            prop_assert_eq!(language.to_string().to_lowercase().parse::<Language>().unwrap(), language);
        }
    }
}
