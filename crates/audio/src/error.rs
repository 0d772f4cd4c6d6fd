use thiserror::Error;

use crate::engine::AudioState;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),
    #[error("audio engine is not ready")]
    NotReady,
    #[error("cannot {action} while audio is {from:?}")]
    InvalidTransition {
        from: AudioState,
        action: &'static str,
    },
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("failed to decode sample: {0}")]
    Decode(String),
    #[error("audio engine has been shut down")]
    Closed,
}
