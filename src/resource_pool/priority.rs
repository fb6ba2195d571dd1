//! Priority classes for competing tab requests

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rank of an acquisition request; lower variants are served first.
///
/// `Invalid` sorts after every real level and only marks a tab with no task
/// assigned. Requests are never queued against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// A person is waiting on the answer
    Interactive,
    High,
    Medium,
    Low,
    /// Batch crawling that only runs when nothing else wants a tab
    Background,
    Invalid,
}

impl Priority {
    /// Real levels, highest first
    pub const LEVELS: [Self; 5] = [
        Self::Interactive,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Background,
    ];

    /// Number of real levels
    pub const COUNT: usize = Self::LEVELS.len();

    /// Queue index of a real level
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Interactive => Some(0),
            Self::High => Some(1),
            Self::Medium => Some(2),
            Self::Low => Some(3),
            Self::Background => Some(4),
            Self::Invalid => None,
        }
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index().is_some()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Background => "background",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority '{0}' (expected interactive, high, medium, low or background)")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::LEVELS
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sorts_after_every_level() {
        for level in Priority::LEVELS {
            assert!(level < Priority::Invalid);
            assert!(level.is_valid());
        }
        assert!(!Priority::Invalid.is_valid());
        assert!(Priority::Interactive < Priority::Background);
    }

    #[test]
    fn test_indices_follow_levels() {
        for (i, level) in Priority::LEVELS.into_iter().enumerate() {
            assert_eq!(level.index(), Some(i));
        }
        assert_eq!(Priority::Invalid.index(), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("High".parse::<Priority>(), Ok(Priority::High));
        assert_eq!(" background ".parse::<Priority>(), Ok(Priority::Background));
        assert!("invalid".parse::<Priority>().is_err());
        assert!("urgent".parse::<Priority>().is_err());
    }
}
