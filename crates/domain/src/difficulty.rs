use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    /// One level harder, saturating at advanced.
    pub fn harder(self) -> Self {
        match self {
            Difficulty::Beginner => Difficulty::Intermediate,
            _ => Difficulty::Advanced,
        }
    }

    /// One level easier, saturating at beginner.
    pub fn easier(self) -> Self {
        match self {
            Difficulty::Advanced => Difficulty::Intermediate,
            _ => Difficulty::Beginner,
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown difficulty {s:?}")))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_saturates() {
        assert_eq!(Difficulty::Advanced.harder(), Difficulty::Advanced);
        assert_eq!(Difficulty::Beginner.easier(), Difficulty::Beginner);
        assert_eq!(Difficulty::Intermediate.harder(), Difficulty::Advanced);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Beginner".parse::<Difficulty>().unwrap(), Difficulty::Beginner);
        assert!("expert".parse::<Difficulty>().is_err());
    }
}
