//! Error types returned by sinks, the registry and the file naming protocol.
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any error produced by a log.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A log was activated while it was already active.
    Reentrancy(ReentrancyError),
    /// A mode, exists policy or level could not be parsed.
    InvalidArgument(InvalidArgument),
    /// A recording could not be replayed.
    Replay(ReplayError),
    /// Writing to a file or stream failed.
    Io(io::Error),
    /// Several children of a [`TeeLog`] failed.
    ///
    /// [`TeeLog`]: crate::log::TeeLog
    Aggregate(Vec<Error>),
}

/// Error returned when activating a log that is already active.
#[derive(Debug)]
pub struct ReentrancyError(pub(crate) &'static str);

/// Error returned when parsing an invalid mode, exists policy or level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidArgument {
    kind: &'static str,
    value: String,
}

/// Error returned by [`Recording::replay`] for out-of-order messages.
///
/// [`Recording::replay`]: crate::log::Recording::replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayError {
    /// Index of the offending message.
    pub index: usize,
}

impl InvalidArgument {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        InvalidArgument {
            kind,
            value: value.to_owned(),
        }
    }

    /// The kind of argument that was rejected, e.g. `"mode"`.
    pub fn kind(&self) -> &str {
        self.kind
    }

    /// The rejected value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Error {
    /// Collapses a list of errors from fan-out operations.
    pub(crate) fn aggregate(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Aggregate(errors)),
        }
    }

    /// Joins errors raised while cleaning up after `self`.
    pub(crate) fn with_cleanup(self, cleanup: Vec<Error>) -> Error {
        if cleanup.is_empty() {
            return self;
        }
        let mut errors = vec![self];
        errors.extend(cleanup);
        Error::Aggregate(errors)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Reentrancy(e) => e.fmt(f),
            Error::InvalidArgument(e) => e.fmt(f),
            Error::Replay(e) => e.fmt(f),
            Error::Io(e) => e.fmt(f),
            Error::Aggregate(errors) => {
                write!(f, "{} logs failed", errors.len())?;
                for error in errors {
                    write!(f, "; {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Aggregate(errors) => errors.first().map(|e| e as &(dyn StdError + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ReentrancyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is already active and cannot be entered again", self.0)
    }
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message {} exits a context that was never entered",
            self.index
        )
    }
}

impl StdError for ReentrancyError {}

impl StdError for InvalidArgument {}

impl StdError for ReplayError {}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<ReentrancyError> for Error {
    fn from(error: ReentrancyError) -> Self {
        Error::Reentrancy(error)
    }
}

impl From<InvalidArgument> for Error {
    fn from(error: InvalidArgument) -> Self {
        Error::InvalidArgument(error)
    }
}

impl From<ReplayError> for Error {
    fn from(error: ReplayError) -> Self {
        Error::Replay(error)
    }
}
