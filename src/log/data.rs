use crate::dir::{Directory, Exists, Mode};
use crate::error::{ReentrancyError, Result};
use crate::file::{LogFile, OpenRequest};
use crate::log::Log;
use crate::{rank, Level};
use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A [`Log`] that only writes managed files.
///
/// Contexts and messages are dropped. Useful for computations that produce
/// output files without anyone reading the log.
#[derive(Debug)]
pub struct DataLog {
    outdir: PathBuf,
    dir: RefCell<Option<Directory>>,
}

impl DataLog {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        DataLog {
            outdir: outdir.into(),
            dir: RefCell::new(None),
        }
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }
}

impl Log for DataLog {
    fn enter(&self, _previous: Rc<dyn Log>) -> Result<()> {
        let mut dir = self.dir.borrow_mut();
        if dir.is_some() {
            return Err(ReentrancyError("DataLog").into());
        }
        *dir = Some(Directory::acquire(&self.outdir)?);
        Ok(())
    }

    fn exit(&self) -> Result<()> {
        self.dir.borrow_mut().take();
        Ok(())
    }

    fn push_context(&self, _title: &str, _may_skip: bool) -> Result<()> {
        Ok(())
    }

    fn pop_context(&self) -> Result<()> {
        Ok(())
    }

    fn write(&self, _level: Level, _text: &str) -> Result<()> {
        Ok(())
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

        let stream = match &*self.dir.borrow() {
            Some(dir) => dir.open_managed(filename, mode, exists)?,
            None => Directory::acquire(&self.outdir)?.open_managed(filename, mode, exists)?,
        };
        Ok(LogFile::disk(request, stream))
    }

    fn close(&self, mut file: LogFile) -> Result<()> {
        file.flush()?;
        Ok(())
    }
}
