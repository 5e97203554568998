//! Emotion → reference-clip selection with keyword fallback.

use crate::classifier::EmotionClassifier;
use crate::emotion::Emotion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Result of looking up the reference clip for a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPrompt {
    /// Neutral speech: synthesis proceeds without an emotion clip.
    Neutral,
    /// A configured clip for this label.
    Clip(PathBuf),
    /// Label is recognized by the classifier but has no configured clip
    /// (currently angry and disgusted). Synthesis proceeds without a clip,
    /// same as neutral, but callers can tell the two cases apart.
    Unmapped,
}

impl AudioPrompt {
    pub fn clip_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Clip(path) => Some(path),
            Self::Neutral | Self::Unmapped => None,
        }
    }
}

/// Per-label reference clip paths, one field per mapped emotion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmotionAudioMap {
    pub caring: PathBuf,
    pub happy: PathBuf,
    pub sad: PathBuf,
    pub questioning: PathBuf,
    pub surprised: PathBuf,
}

impl Default for EmotionAudioMap {
    fn default() -> Self {
        Self {
            caring: PathBuf::from("voices/care.wav"),
            happy: PathBuf::from("voices/happy.wav"),
            sad: PathBuf::from("voices/sad.wav"),
            questioning: PathBuf::from("voices/question.wav"),
            surprised: PathBuf::from("voices/surprise.wav"),
        }
    }
}

pub struct EmotionAudioSelector {
    classifier: Option<Arc<dyn EmotionClassifier>>,
    audio: EmotionAudioMap,
}

impl EmotionAudioSelector {
    pub fn new(classifier: Option<Arc<dyn EmotionClassifier>>, audio: EmotionAudioMap) -> Self {
        Self { classifier, audio }
    }

    /// Classify text through the remote model, degrading to the keyword
    /// lexicon when the classifier is absent or errors.
    pub async fn classify(&self, text: &str) -> Emotion {
        match &self.classifier {
            Some(classifier) => match classifier.predict(text).await {
                Ok(emotion) => emotion,
                Err(err) => {
                    warn!(error = %err, "Emotion classifier failed, using keyword fallback");
                    Emotion::from_keywords(text)
                }
            },
            None => Emotion::from_keywords(text),
        }
    }

    pub fn select(&self, emotion: Emotion) -> AudioPrompt {
        match emotion {
            Emotion::Neutral => AudioPrompt::Neutral,
            Emotion::Caring => AudioPrompt::Clip(self.audio.caring.clone()),
            Emotion::Happy => AudioPrompt::Clip(self.audio.happy.clone()),
            Emotion::Sad => AudioPrompt::Clip(self.audio.sad.clone()),
            Emotion::Questioning => AudioPrompt::Clip(self.audio.questioning.clone()),
            Emotion::Surprised => AudioPrompt::Clip(self.audio.surprised.clone()),
            // Recognized by the classifier but not wired to a clip.
            Emotion::Angry | Emotion::Disgusted => AudioPrompt::Unmapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SpeechError};
    use async_trait::async_trait;

    struct FixedClassifier(Emotion);

    #[async_trait]
    impl EmotionClassifier for FixedClassifier {
        async fn predict(&self, _text: &str) -> Result<Emotion> {
            Ok(self.0)
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl EmotionClassifier for BrokenClassifier {
        async fn predict(&self, _text: &str) -> Result<Emotion> {
            Err(SpeechError::Classifier("model artifact missing".to_string()))
        }
    }

    fn selector(classifier: Option<Arc<dyn EmotionClassifier>>) -> EmotionAudioSelector {
        EmotionAudioSelector::new(classifier, EmotionAudioMap::default())
    }

    #[tokio::test]
    async fn classifier_result_is_preferred() {
        let selector = selector(Some(Arc::new(FixedClassifier(Emotion::Sad))));
        assert_eq!(selector.classify("我今天很开心").await, Emotion::Sad);
    }

    #[tokio::test]
    async fn classifier_failure_falls_back_to_keywords() {
        let selector = selector(Some(Arc::new(BrokenClassifier)));
        assert_eq!(selector.classify("我今天很开心").await, Emotion::Happy);
    }

    #[tokio::test]
    async fn absent_classifier_uses_keywords() {
        let selector = selector(None);
        assert_eq!(selector.classify("我今天很开心").await, Emotion::Happy);
        assert_eq!(selector.classify("平平无奇").await, Emotion::Neutral);
    }

    #[test]
    fn neutral_selects_no_clip() {
        assert_eq!(selector(None).select(Emotion::Neutral), AudioPrompt::Neutral);
    }

    #[test]
    fn mapped_emotions_select_their_configured_clip() {
        let selector = selector(None);
        assert_eq!(
            selector.select(Emotion::Happy),
            AudioPrompt::Clip(PathBuf::from("voices/happy.wav"))
        );
        assert_eq!(
            selector.select(Emotion::Caring),
            AudioPrompt::Clip(PathBuf::from("voices/care.wav"))
        );
    }

    #[test]
    fn angry_and_disgusted_are_explicitly_unmapped() {
        let selector = selector(None);
        assert_eq!(selector.select(Emotion::Angry), AudioPrompt::Unmapped);
        assert_eq!(selector.select(Emotion::Disgusted), AudioPrompt::Unmapped);
        assert!(selector.select(Emotion::Angry).clip_path().is_none());
    }
}
