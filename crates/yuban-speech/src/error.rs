use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpeechError>;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Classifier error: {0}")]
    Classifier(String),
    #[error("TTS engine error: {0}")]
    Engine(String),
}
