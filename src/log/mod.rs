//! The [`Log`] trait and the sinks implementing it.
//!
//! A log receives four kinds of operations: entering and leaving contexts,
//! writing leveled text, and opening managed files. How these are rendered is
//! up to the sink:
//!
//! * [`ConsoleLog`] prints `outer > inner > message` lines.
//! * [`RichLog`] prints colored lines and an ephemeral progress line.
//! * [`HtmlLog`] writes a nested HTML document with a viewer.
//! * [`IndentLog`] writes indented snippets and a `progress.json` file.
//! * [`DataLog`] only writes managed files.
//! * [`CaptureLog`] keeps everything in memory.
//! * [`TeeLog`] forwards to several logs at once.
//! * [`RecordLog`] forwards to the previously active log and records a
//!   replayable [`Recording`].
use crate::dir::{Exists, Mode};
use crate::error::{ReentrancyError, Result};
use crate::fail;
use crate::file::LogFile;
use crate::post_mortem::PostMortem;
use crate::Level;
use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};
use std::ops::Deref;
use std::rc::Rc;

mod capture;
mod console;
mod data;
mod html;
mod indent;
mod record;
mod rich;
mod tee;

pub use capture::{CaptureLog, Captured};
pub use console::{ConsoleBuilder, ConsoleLog};
pub use data::DataLog;
pub use html::{HtmlBuilder, HtmlLog};
pub use indent::{IndentBuilder, IndentLog};
pub use record::{Message, RecordLog, Recording};
pub use rich::{RichBuilder, RichLog};
pub use tee::TeeLog;

/// A log target.
///
/// Sinks are driven through shared references: a log is activated behind an
/// [`Rc`] and may be shared with a [`TeeLog`] or wrapped by a [`RecordLog`],
/// so implementations keep their state in cells.
///
/// Callers rarely use these methods directly; see [`LogExt`] for guards that
/// guarantee contexts are left and files are closed.
pub trait Log {
    /// Called when the log is activated. `previous` is the log that was
    /// active before.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reentrancy`] if the log is already active, or an I/O
    /// error if the log's resources could not be acquired.
    ///
    /// [`Error::Reentrancy`]: crate::Error::Reentrancy
    fn enter(&self, previous: Rc<dyn Log>) -> Result<()>;

    /// Called when the activation is released. Releases everything acquired
    /// in [`enter`](Log::enter).
    fn exit(&self) -> Result<()>;

    /// Enters a context named `title`.
    ///
    /// `may_skip` hints that the push is one of many quick successive ones,
    /// like loop iterations, so sinks may skip repainting progress output.
    fn push_context(&self, title: &str, may_skip: bool) -> Result<()>;

    /// Leaves the innermost context.
    fn pop_context(&self) -> Result<()>;

    /// Writes `text` at `level`.
    fn write(&self, level: Level, text: &str) -> Result<()>;

    /// Opens a managed file. The returned handle must be passed back to
    /// [`close`](Log::close).
    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile>;

    /// Closes a file returned by [`open`](Log::open) and reports it at the
    /// level it was opened with.
    fn close(&self, file: LogFile) -> Result<()>;

    /// Writes a report of a fault that escaped the activation.
    fn write_post_mortem(&self, post_mortem: &PostMortem) -> Result<()> {
        self.write(Level::Error, &post_mortem.to_string())
    }
}

/// Scoped helpers available on every [`Log`].
pub trait LogExt: Log {
    /// Enters a context that is left when the guard is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use treelog::log::{CaptureLog, Captured, Log, LogExt};
    /// use treelog::Level;
    ///
    /// # fn main() -> treelog::Result<()> {
    /// let log = CaptureLog::new();
    /// {
    ///     let _ctx = log.context("solve", false)?;
    ///     log.write(Level::Info, "converged")?;
    /// }
    /// assert!(log.events()[0] == Captured::Push("solve".to_owned()));
    /// assert!(log.events()[2] == Captured::Pop);
    /// # Ok(())
    /// # }
    /// ```
    fn context(&self, title: &str, may_skip: bool) -> Result<ContextGuard<&Self>> {
        ContextGuard::push(self, title, may_skip)
    }

    /// Opens a managed file that is closed when the guard is dropped.
    fn managed_file(
        &self,
        filename: &str,
        mode: Mode,
        level: Level,
        exists: Exists,
    ) -> Result<ManagedFile<&Self>> {
        ManagedFile::open(self, filename, mode, level, exists)
    }
}

impl<L: Log + ?Sized> LogExt for L {}

/// Leaves its context when dropped.
///
/// Returned by [`LogExt::context`] and [`treelog::context`](crate::context()).
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard<L>
where
    L: Deref,
    L::Target: Log,
{
    log: L,
    open: bool,
}

impl<L> ContextGuard<L>
where
    L: Deref,
    L::Target: Log,
{
    pub(crate) fn push(log: L, title: &str, may_skip: bool) -> Result<Self> {
        log.push_context(title, may_skip)?;
        Ok(ContextGuard { log, open: true })
    }

    /// Leaves the context, returning any error the log reports.
    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.log.pop_context()
    }
}

impl<L> Drop for ContextGuard<L>
where
    L: Deref,
    L::Target: Log,
{
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.log.pop_context() {
                fail::report_error("leave context", &e);
            }
        }
    }
}

/// A managed file that is closed, and reported to its log, when dropped.
///
/// Returned by [`LogExt::managed_file`] and [`treelog::open`](crate::open()).
#[must_use = "the file is closed as soon as the guard is dropped"]
pub struct ManagedFile<L>
where
    L: Deref,
    L::Target: Log,
{
    log: L,
    file: Option<LogFile>,
}

impl<L> ManagedFile<L>
where
    L: Deref,
    L::Target: Log,
{
    pub(crate) fn open(
        log: L,
        filename: &str,
        mode: Mode,
        level: Level,
        exists: Exists,
    ) -> Result<Self> {
        let file = log.open(filename, mode, level, exists)?;
        Ok(ManagedFile {
            log,
            file: Some(file),
        })
    }

    /// Returns `false` if writes are discarded, e.g. because the file
    /// already existed and was opened with [`Exists::Skip`].
    pub fn is_real(&self) -> bool {
        self.file.as_ref().map_or(false, LogFile::is_real)
    }

    /// The name the file was created under.
    pub fn name(&self) -> &str {
        self.file.as_ref().map_or("", LogFile::name)
    }

    /// Closes the file, returning any error the log reports.
    pub fn finish(mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => self.log.close(file),
            None => Ok(()),
        }
    }
}

impl<L> Write for ManagedFile<L>
where
    L: Deref,
    L::Target: Log,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<L> Drop for ManagedFile<L>
where
    L: Deref,
    L::Target: Log,
{
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = self.log.close(file) {
                fail::report_error("close managed file", &e);
            }
        }
    }
}

impl<L> fmt::Debug for ManagedFile<L>
where
    L: Deref,
    L::Target: Log,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedFile")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Tracks whether a sink without other per-activation state is active.
#[derive(Debug, Default)]
pub(crate) struct Entered(Cell<bool>);

impl Entered {
    pub(crate) fn enter(&self, name: &'static str) -> Result<(), ReentrancyError> {
        if self.0.replace(true) {
            Err(ReentrancyError(name))
        } else {
            Ok(())
        }
    }

    pub(crate) fn exit(&self) {
        self.0.set(false);
    }
}
