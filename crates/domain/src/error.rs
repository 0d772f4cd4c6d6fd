use thiserror::Error;

use crate::grid::{MAX_TEMPO_BPM, MIN_TEMPO_BPM};

/// Errors raised while building or checking rhythm data.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid rhythm data: {0}")]
    Validation(String),
    #[error("could not read pattern data: {0}")]
    Serialization(String),
    #[error("unsupported time signature: {0}")]
    UnsupportedTimeSignature(String),
    #[error("tempo {0} bpm outside {}..={}", MIN_TEMPO_BPM, MAX_TEMPO_BPM)]
    TempoOutOfRange(u32),
}

impl DomainError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}
