use crate::error::InvalidArgument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The priority of a message, highest first.
///
/// The declaration order is the priority order, so `Level::Error < Level::Debug`
/// and a sink configured with a threshold renders every level that compares
/// less than or equal to it.
///
/// # Examples
///
/// ```
/// use treelog::Level;
///
/// let threshold = Level::User;
/// assert!(Level::Warning.passes(threshold));
/// assert!(!Level::Info.passes(threshold));
/// assert!(Level::Error.index() == 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    User,
    Info,
    Debug,
}

impl Level {
    /// All levels in priority order.
    pub const ALL: [Level; 5] = [
        Level::Error,
        Level::Warning,
        Level::User,
        Level::Info,
        Level::Debug,
    ];

    /// Position of the level in the priority order, used by the HTML viewer
    /// as `data-loglevel`.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::User => "user",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    /// Returns `true` if a message at this level is rendered by a sink whose
    /// verbosity threshold is `threshold`.
    pub fn passes(self, threshold: Level) -> bool {
        self.index() <= threshold.index()
    }

    /// Returns the level at 1-based `verbosity`, the way verbosity is usually
    /// configured: `1` shows errors only, `5` shows everything.
    pub fn from_verbosity(verbosity: usize) -> Option<Level> {
        verbosity
            .checked_sub(1)
            .and_then(|index| Level::ALL.get(index).copied())
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Level {
    type Err = InvalidArgument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| InvalidArgument::new("level", s))
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::INFO => Level::Info,
            _ => Level::Debug,
        }
    }
}
