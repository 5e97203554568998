pub mod classifier;
pub mod emotion;
pub mod error;
pub mod selector;
pub mod tts;

pub use classifier::{EmotionClassifier, HttpClassifier};
pub use emotion::Emotion;
pub use error::{Result, SpeechError};
pub use selector::{AudioPrompt, EmotionAudioMap, EmotionAudioSelector};
pub use tts::{
    IndexTtsBackend, SynthesisOutcome, SynthesisRequest, TtsBackend, TtsOrchestrator,
};
