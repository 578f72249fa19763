use crate::config::Config;
use crate::context::ContextStack;
use crate::dir::{Directory, Exists, ManagedStream, Mode};
use crate::error::{Error, ReentrancyError, Result};
use crate::file::{LogFile, OpenRequest};
use crate::log::html::{escape, quote};
use crate::log::Log;
use crate::{rank, Level};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// The progress file is rewritten on context pushes at most this often by
/// default.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// A [`Log`] that writes indented snippets to `log.html` and keeps
/// `progress.json` up to date.
///
/// Each context is written as a `c title` line, and everything inside it is
/// indented by one more space. Messages are written as one line per line of
/// text, the first starting with the initial of the level and the rest with
/// `|`:
///
/// ```text
/// c solve
///  c iter 1
///   i residual 1e-3
///   w not converged
///   | continuing anyway
/// ```
///
/// `progress.json` holds a single JSON object describing the latest message:
/// the byte offset in `log.html` after it, the context it was written in, its
/// text and its level. Monitoring tools can poll this file instead of
/// parsing the log.
///
/// Only the primary rank writes.
#[derive(Debug)]
pub struct IndentLog {
    outdir: PathBuf,
    progress_interval: Duration,
    next_progress: Cell<Option<Instant>>,
    state: RefCell<Option<State>>,
    stack: RefCell<ContextStack>,
}

/// Configures an [`IndentLog`].
#[derive(Debug)]
pub struct IndentBuilder {
    outdir: PathBuf,
    progress_interval: Option<Duration>,
}

#[derive(Debug)]
struct State {
    dir: Directory,
    log: ManagedStream,
    logpos: u64,
    progress: ManagedStream,
}

#[derive(Serialize)]
struct Progress<'a> {
    logpos: u64,
    context: &'a [String],
    text: Option<&'a str>,
    level: Option<Level>,
}

impl IndentLog {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        IndentLog::builder(outdir).build()
    }

    pub fn builder(outdir: impl Into<PathBuf>) -> IndentBuilder {
        IndentBuilder {
            outdir: outdir.into(),
            progress_interval: None,
        }
    }

    fn print(&self, line: &str) -> Result<()> {
        if let Some(state) = &mut *self.state.borrow_mut() {
            writeln!(state.log, "{}", line)?;
            state.log.flush()?;
            state.logpos += line.len() as u64 + 1;
        }
        Ok(())
    }

    fn print_progress(&self, text: Option<&str>, level: Option<Level>) -> Result<()> {
        let stack = self.stack.borrow();
        if let Some(state) = &mut *self.state.borrow_mut() {
            let progress = Progress {
                logpos: state.logpos,
                context: stack.titles(),
                text,
                level,
            };
            state.progress.rewind()?;
            serde_json::to_writer(&mut state.progress, &progress).map_err(std::io::Error::from)?;
            state.progress.write_all(b"\n")?;
            state.progress.flush()?;
        }
        Ok(())
    }

    // `markup` is written as is; escaping is up to the caller.
    fn print_item(&self, level: Level, markup: &str) -> Result<()> {
        if !rank::is_primary() {
            return Ok(());
        }

        let mut stack = self.stack.borrow_mut();
        let mut depth = stack.printed();
        stack.materialize(|title| {
            let title: String = title.chars().filter(|&c| c != '\n' && c != '\r').collect();
            let line = format!("{:depth$}c {}", "", escape(&title), depth = depth);
            depth += 1;
            self.print(&line)
        })?;
        drop(stack);

        let mut marker = &level.as_str()[..1];
        for line in markup.lines() {
            self.print(&format!("{:depth$}{} {}", "", marker, line, depth = depth))?;
            marker = "|";
        }

        self.next_progress.set(None);
        self.print_progress(Some(markup), Some(level))
    }
}

impl IndentBuilder {
    /// Sets the minimum time between two progress updates caused by
    /// entering contexts. Messages always update the progress file.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.progress_interval = config.progress_interval;
        self
    }

    pub fn build(self) -> IndentLog {
        IndentLog {
            outdir: self.outdir,
            progress_interval: self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            next_progress: Cell::new(None),
            state: RefCell::new(None),
            stack: RefCell::new(ContextStack::new()),
        }
    }
}

impl Log for IndentLog {
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        if self.state.borrow().is_some() {
            return Err(ReentrancyError("IndentLog").into());
        }

        let dir = Directory::acquire(&self.outdir)?;
        let log = dir.open_managed("log.html", Mode::Text, Exists::Overwrite)?;
        let progress = dir.open_managed("progress.json", Mode::Text, Exists::Overwrite)?;
        *self.state.borrow_mut() = Some(State {
            dir,
            log,
            logpos: 0,
            progress,
        });
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        if let Some(mut state) = self.state.borrow_mut().take() {
            state.log.flush()?;
        }
        Ok(())
    }

    fn push_context(&self, title: &str, _may_skip: bool) -> Result<()> {
        self.stack.borrow_mut().push(title);
        if !rank::is_primary() {
            return Ok(());
        }

        let now = Instant::now();
        if self.next_progress.get().map_or(false, |next| now < next) {
            return Ok(());
        }
        self.next_progress.set(Some(now + self.progress_interval));
        if let Err(e) = self.print_progress(None, None) {
            self.stack.borrow_mut().pop(|| Ok::<_, Error>(()))?;
            return Err(e);
        }
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        // Indentation follows the printed prefix, so there's nothing to
        // render.
        self.stack.borrow_mut().pop(|| Ok::<_, Error>(()))?;
        Ok(())
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        self.print_item(level, &escape(text))
    }

    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile> {
        let request = OpenRequest {
            filename: filename.to_owned(),
            mode,
            level,
            exists,
        };
        if !rank::is_primary() {
            return Ok(LogFile::null(request));
        }
        match &*self.state.borrow() {
            Some(state) => {
                let stream = state.dir.open_managed(filename, mode, exists)?;
                Ok(LogFile::disk(request, stream))
            }
            None => Ok(LogFile::null(request)),
        }
    }

    fn close(&self, mut file: LogFile) -> Result<()> {
        file.flush()?;
        let link = format!(
            r#"<a href="{}">{}</a>"#,
            quote(file.name()),
            escape(&file.request().filename)
        );
        let level = file.request().level;
        drop(file);
        self.print_item(level, &link)
    }
}
