use crate::config::Config;
use crate::context::ContextStack;
use crate::dir::{Exists, Mode};
use crate::error::{Error, Result};
use crate::file::{LogFile, OpenRequest};
use crate::log::{Entered, Log};
use crate::writer::MakeStdout;
use crate::{rank, Level};
use std::borrow::Cow;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use tracing_subscriber::fmt::{MakeWriter, TestWriter};

/// A [`Log`] that prints plain text lines.
///
/// Each line holds the titles of the entered contexts followed by the
/// message, separated by `" > "`. Messages below the verbosity threshold are
/// dropped. Managed files are not written; their names are printed when they
/// are closed.
///
/// # Examples
///
/// ```
/// use treelog::log::{ConsoleLog, LogExt, Log};
/// use treelog::writer::Buffer;
/// use treelog::Level;
///
/// # fn main() -> treelog::Result<()> {
/// let buffer = Buffer::new();
/// let log = ConsoleLog::builder()
///     .with_writer(buffer.clone())
///     .with_verbosity(Level::User)
///     .build();
///
/// let _ctx = log.context("iter 1", false)?;
/// log.write(Level::User, "residual 1e-3")?;
/// log.write(Level::Info, "not shown")?;
/// assert!(buffer.contents() == "iter 1 > residual 1e-3\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConsoleLog<W = MakeStdout> {
    make_writer: W,
    verbosity: Level,
    stack: RefCell<ContextStack>,
    entered: Entered,
}

/// Configures a [`ConsoleLog`].
#[derive(Debug)]
pub struct ConsoleBuilder<W> {
    make_writer: W,
    config: Config,
}

impl ConsoleLog {
    /// A console log printing to stdout with the default configuration.
    pub fn new() -> Self {
        ConsoleLog::builder().build()
    }

    pub fn builder() -> ConsoleBuilder<MakeStdout> {
        ConsoleBuilder {
            make_writer: MakeStdout,
            config: Config::new(),
        }
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        ConsoleLog::new()
    }
}

impl<W> ConsoleBuilder<W>
where
    W: for<'a> MakeWriter<'a>,
{
    /// Applies the specified [`MakeWriter`].
    pub fn with_writer<W2>(self, make_writer: W2) -> ConsoleBuilder<W2>
    where
        W2: for<'a> MakeWriter<'a>,
    {
        ConsoleBuilder {
            make_writer,
            config: self.config,
        }
    }

    /// Applies a writer that is suitable for test environments.
    pub fn with_test_writer(self) -> ConsoleBuilder<TestWriter> {
        self.with_writer(TestWriter::new())
    }

    /// Sets the least important level that is printed.
    pub fn with_verbosity(mut self, verbosity: Level) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ConsoleLog<W> {
        ConsoleLog {
            make_writer: self.make_writer,
            verbosity: self.config.verbosity,
            stack: RefCell::new(ContextStack::new()),
            entered: Entered::default(),
        }
    }
}

impl<W> Log for ConsoleLog<W>
where
    W: for<'a> MakeWriter<'a>,
{
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        self.entered.enter("ConsoleLog")?;
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        self.entered.exit();
        Ok(())
    }

    fn push_context(&self, title: &str, _may_skip: bool) -> Result<()> {
        self.stack.borrow_mut().push(title);
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        self.stack.borrow_mut().pop(|| Ok::<_, Error>(()))?;
        Ok(())
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        if !level.passes(self.verbosity) {
            return Ok(());
        }

        let text = match rank::current() {
            Some(rank) => Cow::Owned(format!("[{}] {}", rank, text)),
            None => Cow::Borrowed(text),
        };

        let line = trail(self.stack.borrow().titles(), Some(&*text), " > ");
        writeln!(self.make_writer.make_writer(), "{}", line)?;
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

/// Joins context titles and an optional message with `separator`.
pub(crate) fn trail(titles: &[String], text: Option<&str>, separator: &str) -> String {
    let mut line = String::new();
    for (i, title) in titles.iter().map(String::as_str).chain(text).enumerate() {
        if i > 0 {
            line.push_str(separator);
        }
        line.push_str(title);
    }
    line
}
