use crate::dir::{Exists, Mode};
use crate::error::{Error, InvalidArgument, Result};
use crate::file::{LogFile, OpenRequest, Stream};
use crate::log::Log;
use crate::post_mortem::PostMortem;
use crate::Level;
use std::fmt;
use std::rc::Rc;

/// A [`Log`] that forwards everything to several logs.
///
/// Errors from individual children don't stop the others from receiving an
/// operation; they are collected into [`Error::Aggregate`] instead. Pushing a
/// context is all-or-nothing: if any child fails, the children that
/// succeeded are popped again.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use treelog::log::{CaptureLog, Log, TeeLog};
/// use treelog::Level;
///
/// # fn main() -> treelog::Result<()> {
/// let first = Rc::new(CaptureLog::new());
/// let second = Rc::new(CaptureLog::new());
/// let tee = TeeLog::new(vec![first.clone(), second.clone()]);
///
/// tee.write(Level::Error, "boom")?;
/// assert!(first.events() == second.events());
/// # Ok(())
/// # }
/// ```
pub struct TeeLog {
    logs: Vec<Rc<dyn Log>>,
}

impl TeeLog {
    pub fn new(logs: Vec<Rc<dyn Log>>) -> Self {
        TeeLog { logs }
    }

    pub fn logs(&self) -> &[Rc<dyn Log>] {
        &self.logs
    }

    fn for_each(&self, mut f: impl FnMut(&dyn Log) -> Result<()>) -> Result<()> {
        let errors = self
            .logs
            .iter()
            .filter_map(|log| f(&**log).err())
            .collect();
        Error::aggregate(errors)
    }
}

impl Log for TeeLog {
    fn enter(&self, previous: Rc<dyn Log>) -> Result<()> {
        for (i, log) in self.logs.iter().enumerate() {
            if let Err(e) = log.enter(previous.clone()) {
                let cleanup = self.logs[..i].iter().filter_map(|log| log.exit().err());
                return Err(e.with_cleanup(cleanup.collect()));
            }
        }
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        self.for_each(|log| log.exit())
    }

    fn push_context(&self, title: &str, may_skip: bool) -> Result<()> {
        let mut pushed = Vec::with_capacity(self.logs.len());
        let mut errors = Vec::new();
        for log in &self.logs {
            match log.push_context(title, may_skip) {
                Ok(()) => pushed.push(log),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            return Ok(());
        }

        tracing::debug!(target: "treelog", title, failed = errors.len(), "rolling back context push");
        errors.extend(pushed.into_iter().filter_map(|log| log.pop_context().err()));
        Error::aggregate(errors)
    }

    fn pop_context(&self) -> Result<()> {
        self.for_each(|log| log.pop_context())
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        self.for_each(|log| log.write(level, text))
    }

    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile> {
        let mut files = Vec::with_capacity(self.logs.len());
        for log in &self.logs {
            match log.open(filename, mode, level, exists) {
                Ok(file) => files.push(file),
                Err(e) => {
                    let cleanup = self
                        .logs
                        .iter()
                        .zip(files)
                        .filter_map(|(log, file)| log.close(file).err());
                    return Err(e.with_cleanup(cleanup.collect()));
                }
            }
        }

        let request = OpenRequest {
            filename: filename.to_owned(),
            mode,
            level,
            exists,
        };
        Ok(LogFile::tee(request, files))
    }

    fn close(&self, file: LogFile) -> Result<()> {
        let name = file.name().to_owned();
        match file.into_stream() {
            Stream::Tee(files) => {
                let errors = self
                    .logs
                    .iter()
                    .zip(files)
                    .filter_map(|(log, file)| log.close(file).err())
                    .collect();
                Error::aggregate(errors)
            }
            // Not opened by a tee, so there are no child handles to close.
            _ => Err(InvalidArgument::new("file", &name).into()),
        }
    }

    fn write_post_mortem(&self, post_mortem: &PostMortem) -> Result<()> {
        self.for_each(|log| log.write_post_mortem(post_mortem))
    }
}

impl fmt::Debug for TeeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeLog")
            .field("logs", &self.logs.len())
            .finish()
    }
}
