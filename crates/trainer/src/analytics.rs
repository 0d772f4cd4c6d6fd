use metra_domain::Difficulty;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AdaptiveConfig;

/// Moves difficulty up after a run of strong exercises and down after a
/// failed one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveDifficulty {
    config: AdaptiveConfig,
    streak: u32,
}

impl AdaptiveDifficulty {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self { config, streak: 0 }
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }

    /// Feeds one exercise result. Returns the new level when it changes.
    pub fn observe(&mut self, percentage: f64, current: Difficulty) -> Option<Difficulty> {
        let next = if percentage >= self.config.promote_percentage {
            self.streak += 1;
            if self.streak >= self.config.promote_streak {
                self.streak = 0;
                current.harder()
            } else {
                current
            }
        } else {
            self.streak = 0;
            if percentage < self.config.demote_percentage {
                current.easier()
            } else {
                current
            }
        };
        if next != current {
            info!(from = %current, to = %next, percentage, "difficulty adapted");
            Some(next)
        } else {
            None
        }
    }
}
