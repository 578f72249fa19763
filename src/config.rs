//! Settings shared by the sink builders.
//!
//! A [`Config`] can be built in code or read from the environment:
//!
//! * `TREELOG_VERBOSE`: a level name (`"user"`) or a verbosity from `1`
//!   (errors only) to `5` (everything).
//! * `TREELOG_PROGRESS_INTERVAL`: seconds between progress updates, e.g.
//!   `0.5`.
//!
//! Unset or unparseable variables fall back to the defaults.
use crate::Level;
use std::env;
use std::time::Duration;

/// Environment variable holding the verbosity.
pub const VERBOSE_VAR: &str = "TREELOG_VERBOSE";

/// Environment variable holding the progress interval in seconds.
pub const PROGRESS_INTERVAL_VAR: &str = "TREELOG_PROGRESS_INTERVAL";

/// Verbosity and progress settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Least important level rendered by console sinks.
    pub verbosity: Level,
    /// Minimum time between progress updates, if overridden. Each sink has
    /// its own default.
    pub progress_interval: Option<Duration>,
}

impl Config {
    pub const fn new() -> Self {
        Config {
            verbosity: Level::Info,
            progress_interval: None,
        }
    }

    /// Reads the configuration from the environment.
    ///
    /// # Examples
    ///
    /// ```
    /// use treelog::{Config, Level};
    ///
    /// std::env::set_var("TREELOG_VERBOSE", "user");
    /// assert!(Config::from_env().verbosity == Level::User);
    ///
    /// std::env::set_var("TREELOG_VERBOSE", "2");
    /// assert!(Config::from_env().verbosity == Level::Warning);
    ///
    /// std::env::set_var("TREELOG_VERBOSE", "loud");
    /// assert!(Config::from_env().verbosity == Level::Info);
    /// ```
    pub fn from_env() -> Self {
        let mut config = Config::new();

        if let Ok(value) = env::var(VERBOSE_VAR) {
            let parsed = value.parse::<Level>().ok().or_else(|| {
                value
                    .parse::<usize>()
                    .ok()
                    .and_then(Level::from_verbosity)
            });
            if let Some(verbosity) = parsed {
                config.verbosity = verbosity;
            }
        }

        if let Ok(value) = env::var(PROGRESS_INTERVAL_VAR) {
            config.progress_interval = value
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
