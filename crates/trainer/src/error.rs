use metra_audio::AudioError;
use metra_domain::DomainError;
use thiserror::Error;

use crate::machine::GamePhase;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("expected phase {expected:?}, trainer is in {actual:?}")]
    InvalidPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    #[error("configuration error: {0}")]
    Config(String),
}
