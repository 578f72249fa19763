use crate::context::ContextStack;
use crate::dir::{Exists, Mode};
use crate::error::{Error, Result};
use crate::file::{LogFile, OpenRequest, Stream};
use crate::log::{Entered, Log};
use crate::{rank, Level};
use std::cell::RefCell;
use std::rc::Rc;

/// An event rendered by a [`CaptureLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Push(String),
    Pop,
    Item {
        level: Level,
        text: String,
        /// Titles of the contexts the item was written in, outermost first.
        context: Vec<String>,
    },
}

/// A tree-style [`Log`] that keeps its output in memory.
///
/// Contexts are rendered lazily: a [`Captured::Push`] only shows up once
/// something is written inside it, and the matching [`Captured::Pop`] only if
/// the push did. Managed files are kept in memory too and can be inspected
/// with [`files`](CaptureLog::files).
#[derive(Debug, Default)]
pub struct CaptureLog {
    verbosity: Option<Level>,
    stack: RefCell<ContextStack>,
    events: RefCell<Vec<Captured>>,
    files: RefCell<Vec<(String, Vec<u8>)>>,
    entered: Entered,
}

impl CaptureLog {
    pub fn new() -> Self {
        CaptureLog::default()
    }

    /// Drops items less important than `verbosity`.
    pub fn with_verbosity(verbosity: Level) -> Self {
        CaptureLog {
            verbosity: Some(verbosity),
            ..CaptureLog::default()
        }
    }

    /// Everything rendered so far.
    pub fn events(&self) -> Vec<Captured> {
        self.events.borrow().clone()
    }

    /// Only the items, as `(level, text)` pairs.
    pub fn items(&self) -> Vec<(Level, String)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Captured::Item { level, text, .. } => Some((*level, text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Names and contents of the managed files closed so far.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.borrow().clone()
    }

    fn item(&self, level: Level, text: &str) {
        let mut stack = self.stack.borrow_mut();
        let mut events = self.events.borrow_mut();
        // Rendering to memory can't fail.
        let _ = stack.materialize(|title| {
            events.push(Captured::Push(title.to_owned()));
            Ok::<_, Error>(())
        });
        events.push(Captured::Item {
            level,
            text: text.to_owned(),
            context: stack.titles().to_vec(),
        });
    }
}

impl Log for CaptureLog {
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        self.entered.enter("CaptureLog")?;
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
        let events = &self.events;
        self.stack.borrow_mut().pop(|| {
            events.borrow_mut().push(Captured::Pop);
            Ok::<_, Error>(())
        })?;
        Ok(())
    }

    fn write(&self, level: Level, text: &str) -> Result<()> {
        if !rank::is_primary() || !self.verbosity.map_or(true, |v| level.passes(v)) {
            return Ok(());
        }
        self.item(level, text);
        Ok(())
    }

    fn open(&self, filename: &str, mode: Mode, level: Level, exists: Exists) -> Result<LogFile> {
        let request = OpenRequest {
            filename: filename.to_owned(),
            mode,
            level,
            exists,
        };
        if rank::is_primary() {
            Ok(LogFile::memory(request))
        } else {
            Ok(LogFile::null(request))
        }
    }

    fn close(&self, file: LogFile) -> Result<()> {
        let request = file.request().clone();
        if let Stream::Memory(data) = file.into_stream() {
            self.files.borrow_mut().push((request.filename.clone(), data));
        }
        self.write(request.level, &request.filename)
    }
}
