use crate::config::Config;
use crate::context::ContextStack;
use crate::dir::{Exists, Mode};
use crate::error::{Error, Result};
use crate::file::{LogFile, OpenRequest};
use crate::log::console::trail;
use crate::log::{Entered, Log};
use crate::writer::MakeStdout;
use crate::{rank, Level};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::{MakeWriter, TestWriter};

const SEPARATOR: &str = " · ";
const CLEAR_LINE: &str = "\x1b[K";
const DIM: &str = "\x1b[1;30m";
const RESET: &str = "\x1b[0m";

/// Progress lines are repainted at most this often by default.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// A [`Log`] that prints colored lines to a terminal.
///
/// Context titles are printed dimmed in front of each message, and the
/// message itself is colored by level. Entering a context paints a progress
/// line showing the current trail, which is overwritten by the next line.
/// Pushes marked `may_skip` only repaint the progress line if the last
/// repaint is older than the progress interval, which keeps tight loops from
/// flooding the terminal.
///
/// Only the primary rank prints.
#[derive(Debug)]
pub struct RichLog<W = MakeStdout> {
    make_writer: W,
    verbosity: Level,
    progress_interval: Duration,
    next_progress: Cell<Option<Instant>>,
    stack: RefCell<ContextStack>,
    entered: Entered,
}

/// Configures a [`RichLog`].
#[derive(Debug)]
pub struct RichBuilder<W> {
    make_writer: W,
    config: Config,
}

impl RichLog {
    pub fn new() -> Self {
        RichLog::builder().build()
    }

    pub fn builder() -> RichBuilder<MakeStdout> {
        RichBuilder {
            make_writer: MakeStdout,
            config: Config::new(),
        }
    }
}

impl Default for RichLog {
    fn default() -> Self {
        RichLog::new()
    }
}

impl<W> RichBuilder<W>
where
    W: for<'a> MakeWriter<'a>,
{
    /// Applies the specified [`MakeWriter`].
    pub fn with_writer<W2>(self, make_writer: W2) -> RichBuilder<W2>
    where
        W2: for<'a> MakeWriter<'a>,
    {
        RichBuilder {
            make_writer,
            config: self.config,
        }
    }

    /// Applies a writer that is suitable for test environments.
    pub fn with_test_writer(self) -> RichBuilder<TestWriter> {
        self.with_writer(TestWriter::new())
    }

    /// Sets the least important level that is printed.
    pub fn with_verbosity(mut self, verbosity: Level) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    /// Sets the minimum time between two skippable progress repaints.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.config.progress_interval = Some(interval);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RichLog<W> {
        RichLog {
            make_writer: self.make_writer,
            verbosity: self.config.verbosity,
            progress_interval: self
                .config
                .progress_interval
                .unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            next_progress: Cell::new(None),
            stack: RefCell::new(ContextStack::new()),
            entered: Entered::default(),
        }
    }
}

impl<W> RichLog<W>
where
    W: for<'a> MakeWriter<'a>,
{
    // Without `text` this renders the progress line: the trail alone, all
    // dimmed.
    fn line(&self, level: Option<Level>, text: Option<&str>) -> String {
        let string = trail(self.stack.borrow().titles(), text, SEPARATOR);
        let split = string.len() - text.map_or(0, str::len);
        let (trail, leaf) = string.split_at(split);

        match level.and_then(style) {
            Some((color, bold)) => format!(
                "{}{}{}\x1b[{};3{}m{}{}",
                CLEAR_LINE, DIM, trail, bold, color, leaf, RESET
            ),
            None => format!("{}{}{}{}{}", CLEAR_LINE, DIM, trail, RESET, leaf),
        }
    }
}

// Color (black, red, green, yellow, ...) and weight per level.
fn style(level: Level) -> Option<(u8, u8)> {
    match level {
        Level::Error => Some((1, 1)),
        Level::Warning => Some((1, 0)),
        Level::User => Some((3, 0)),
        Level::Info | Level::Debug => None,
    }
}

impl<W> Log for RichLog<W>
where
    W: for<'a> MakeWriter<'a>,
{
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        self.entered.enter("RichLog")?;
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        self.entered.exit();
        if rank::is_primary() {
            write!(self.make_writer.make_writer(), "{}", CLEAR_LINE)?;
        }
        Ok(())
    }

    fn push_context(&self, title: &str, may_skip: bool) -> Result<()> {
        self.stack.borrow_mut().push(title);
        if !rank::is_primary() {
            return Ok(());
        }

        let now = Instant::now();
        let due = self.next_progress.get().map_or(true, |next| now >= next);
        if !may_skip || due {
            self.next_progress.set(Some(now + self.progress_interval));
            if let Err(e) = write!(self.make_writer.make_writer(), "{}\r", self.line(None, None)) {
                // No guard is returned for a failed push, so nothing else
                // would pop it.
                self.stack.borrow_mut().pop(|| Ok::<_, Error>(()))?;
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        self.stack.borrow_mut().pop(|| Ok::<_, Error>(()))?;
        Ok(())
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        if !rank::is_primary() || !level.passes(self.verbosity) {
            return Ok(());
        }

        // A regular line replaces the progress line, so the next push may
        // paint a new one right away.
        self.next_progress.set(None);
        writeln!(self.make_writer.make_writer(), "{}", self.line(Some(level), Some(text)))?;
        Ok(())
    }

    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile> {
        Ok(LogFile::null(OpenRequest {
            filename: filename.to_owned(),
            mode,
            level,
            exists,
        }))
    }

    fn close(&self, file: LogFile) -> Result<()> {
        self.write(file.request().level, file.name())
    }
}
