use crate::context::ContextStack;
use crate::dir::{Exists, Mode};
use crate::error::{Error, ReentrancyError, ReplayError, Result};
use crate::file::{LogFile, OpenRequest};
use crate::log::Log;
use crate::post_mortem::PostMortem;
use crate::{rank, registry, Level};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

/// A single operation in a [`Recording`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Message {
    EnterContext {
        title: String,
    },
    ExitContext,
    Write {
        level: Level,
        text: String,
    },
    /// A managed file, with everything that was written to it.
    Open {
        filename: String,
        mode: Mode,
        level: Level,
        exists: Exists,
        data: Vec<u8>,
    },
}

/// A [`Log`] that forwards to the previously active log and records
/// everything it sees.
///
/// The recording follows the same lazy discipline as the tree-style logs:
/// contexts without output inside them leave no trace. Replaying the
/// [`Recording`] onto a fresh log reproduces the output of the original run,
/// which lets expensive computations be cached together with their log.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use treelog::log::{CaptureLog, RecordLog};
/// use treelog::Level;
///
/// # fn main() -> treelog::Result<()> {
/// let record = Rc::new(RecordLog::new());
/// {
///     let _active = treelog::activate(record.clone())?;
///     let _ctx = treelog::context("assemble")?;
///     treelog::write(Level::Info, "nnz 1024")?;
/// }
///
/// let replayed = CaptureLog::new();
/// record.recording().replay_onto(&replayed)?;
/// assert!(replayed.items() == [(Level::Info, "nnz 1024".to_owned())]);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RecordLog {
    previous: RefCell<Option<Rc<dyn Log>>>,
    buffer: RefCell<ContextStack>,
    messages: RefCell<Vec<Message>>,
}

/// The messages recorded by a [`RecordLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    messages: Vec<Message>,
}

impl RecordLog {
    pub fn new() -> Self {
        RecordLog::default()
    }

    /// Returns everything recorded so far, leaving the log empty.
    ///
    /// Contexts that are still entered and were already recorded stay open
    /// in the returned recording; replay closes them.
    pub fn recording(&self) -> Recording {
        Recording {
            messages: std::mem::take(&mut *self.messages.borrow_mut()),
        }
    }

    fn previous(&self) -> Option<Rc<dyn Log>> {
        self.previous.borrow().clone()
    }

    fn materialize(&self) {
        let mut messages = self.messages.borrow_mut();
        let _ = self.buffer.borrow_mut().materialize(|title| {
            messages.push(Message::EnterContext {
                title: title.to_owned(),
            });
            Ok::<_, Error>(())
        });
    }

    fn record_write(&self, level: Level, text: &str) {
        if rank::is_primary() {
            self.materialize();
            self.messages.borrow_mut().push(Message::Write {
                level,
                text: text.to_owned(),
            });
        }
    }
}

impl Log for RecordLog {
    fn enter(&self, previous: Rc<dyn Log>) -> Result<()> {
        let mut slot = self.previous.borrow_mut();
        if slot.is_some() {
            return Err(ReentrancyError("RecordLog").into());
        }
        *slot = Some(previous);
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        self.previous.borrow_mut().take();
        Ok(())
    }

    fn push_context(&self, title: &str, may_skip: bool) -> Result<()> {
        // Only contexts the previous log accepted are recorded.
        if let Some(previous) = self.previous() {
            previous.push_context(title, may_skip)?;
        }
        if rank::is_primary() {
            self.buffer.borrow_mut().push(title);
        }
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        if rank::is_primary() {
            let messages = &self.messages;
            self.buffer.borrow_mut().pop(|| {
                messages.borrow_mut().push(Message::ExitContext);
                Ok::<_, Error>(())
            })?;
        }
        match self.previous() {
            Some(previous) => previous.pop_context(),
            None => Ok(()),
        }
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        self.record_write(level, text);
        match self.previous() {
            Some(previous) => previous.write(level, text),
            None => Ok(()),
        }
    }

    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile> {
        let inner = match self.previous() {
            Some(previous) => previous.open(filename, mode, level, exists)?,
            None => LogFile::null(OpenRequest {
                filename: filename.to_owned(),
                mode,
                level,
                exists,
            }),
        };
        if !rank::is_primary() {
            return Ok(inner);
        }

        // The file exists as soon as it is opened, so its contexts do too.
        self.materialize();
        Ok(LogFile::capture(inner))
    }

    fn close(&self, file: LogFile) -> Result<()> {
        let file = match file.into_capture() {
            Ok((inner, data)) => {
                let request = inner.request().clone();
                self.messages.borrow_mut().push(Message::Open {
                    filename: request.filename,
                    mode: request.mode,
                    level: request.level,
                    exists: request.exists,
                    data,
                });
                inner
            }
            Err(file) => file,
        };
        match self.previous() {
            Some(previous) => previous.close(file),
            None => Ok(()),
        }
    }

    fn write_post_mortem(&self, post_mortem: &PostMortem) -> Result<()> {
        self.record_write(Level::Error, &post_mortem.to_string());
        match self.previous() {
            Some(previous) => previous.write_post_mortem(post_mortem),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLog")
            .field("active", &self.previous.borrow().is_some())
            .field("buffer", &self.buffer)
            .field("messages", &self.messages)
            .finish()
    }
}

impl Recording {
    pub fn new(messages: Vec<Message>) -> Self {
        Recording { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replays the recording onto the active log.
    pub fn replay(&self) -> Result<()> {
        self.replay_onto(&*registry::current())
    }

    /// Replays the recording onto `log`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Replay`] if the recording leaves a context that was
    /// never entered. Contexts entered by the replay are left again before
    /// returning, whether it succeeds or not.
    pub fn replay_onto(&self, log: &dyn Log) -> Result<()> {
        let mut depth = 0;
        let result = self.replay_messages(log, &mut depth);

        let cleanup: Vec<Error> = (0..depth).filter_map(|_| log.pop_context().err()).collect();
        match result {
            Ok(()) => Error::aggregate(cleanup),
            Err(e) => Err(e.with_cleanup(cleanup)),
        }
    }

    fn replay_messages(&self, log: &dyn Log, depth: &mut usize) -> Result<()> {
        tracing::debug!(target: "treelog", messages = self.messages.len(), "replaying recording");
        for (index, message) in self.messages.iter().enumerate() {
            match message {
                Message::EnterContext { title } => {
                    log.push_context(title, false)?;
                    *depth += 1;
                }
                Message::ExitContext => {
                    if *depth == 0 {
                        return Err(ReplayError { index }.into());
                    }
                    log.pop_context()?;
                    *depth -= 1;
                }
                Message::Write { level, text } => log.write(*level, text)?,
                Message::Open {
                    filename,
                    mode,
                    level,
                    exists,
                    data,
                } => {
                    let mut file = log.open(filename, *mode, *level, *exists)?;
                    let written = file.write_all(data).map_err(Error::from);
                    let closed = log.close(file);
                    written.and(closed)?;
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<Message>> for Recording {
    fn from(messages: Vec<Message>) -> Self {
        Recording::new(messages)
    }
}
