use thiserror::Error;

/// An error raised while running the diffusion pipeline for one request.
///
/// Carries the underlying diagnostic so the API layer can surface it; a
/// failed run never invalidates the pipeline instance itself.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to tokenize prompt: {0}")]
    Tokenizer(String),
    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),
    #[error("{0}")]
    Message(String),
}

impl GenerationError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}
