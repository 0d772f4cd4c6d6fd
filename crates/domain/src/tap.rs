use serde::{Deserialize, Serialize};

/// A user tap on the audio clock.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tap {
    /// Absolute audio clock time in seconds.
    pub clock_time: f64,
    /// Seconds since the measure origin, once the measure is locked in.
    pub relative_time: Option<f64>,
}

impl Tap {
    pub fn at(clock_time: f64) -> Self {
        Self {
            clock_time,
            relative_time: None,
        }
    }

    pub fn relative_to(self, origin: f64) -> Self {
        Self {
            relative_time: Some(self.clock_time - origin),
            ..self
        }
    }
}
