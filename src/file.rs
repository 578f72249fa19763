//! The handle type returned by [`Log::open`].
//!
//! A [`LogFile`] exposes exactly two things: writing bytes, and whether those
//! bytes end up anywhere ([`LogFile::is_real`]). It is handed back to the log
//! that opened it through [`Log::close`], which reports the file.
//!
//! [`Log::open`]: crate::log::Log::open
//! [`Log::close`]: crate::log::Log::close
use crate::dir::{Exists, ManagedStream, Mode};
use crate::Level;
use std::fmt;
use std::io::{self, Write};

/// The arguments a file was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub filename: String,
    pub mode: Mode,
    pub level: Level,
    pub exists: Exists,
}

/// A file opened through a log.
pub struct LogFile {
    request: OpenRequest,
    stream: Stream,
}

pub(crate) enum Stream {
    Disk(ManagedStream),
    Null,
    Memory(Vec<u8>),
    Tee(Vec<LogFile>),
    Capture { inner: Box<LogFile>, data: Vec<u8> },
}

impl LogFile {
    pub(crate) fn disk(request: OpenRequest, stream: ManagedStream) -> Self {
        LogFile {
            request,
            stream: Stream::Disk(stream),
        }
    }

    /// A handle that discards all writes.
    pub(crate) fn null(request: OpenRequest) -> Self {
        LogFile {
            request,
            stream: Stream::Null,
        }
    }

    /// A handle that keeps everything written in memory.
    pub(crate) fn memory(request: OpenRequest) -> Self {
        LogFile {
            request,
            stream: Stream::Memory(Vec::new()),
        }
    }

    pub(crate) fn tee(request: OpenRequest, files: Vec<LogFile>) -> Self {
        LogFile {
            request,
            stream: Stream::Tee(files),
        }
    }

    pub(crate) fn capture(inner: LogFile) -> Self {
        LogFile {
            request: inner.request.clone(),
            stream: Stream::Capture {
                inner: Box::new(inner),
                data: Vec::new(),
            },
        }
    }

    /// Splits a capturing handle into the wrapped handle and the captured
    /// bytes, or gives the handle back unchanged.
    pub(crate) fn into_capture(self) -> Result<(LogFile, Vec<u8>), LogFile> {
        match self.stream {
            Stream::Capture { inner, data } => Ok((*inner, data)),
            stream => Err(LogFile {
                request: self.request,
                stream,
            }),
        }
    }

    pub(crate) fn into_stream(self) -> Stream {
        self.stream
    }

    pub fn request(&self) -> &OpenRequest {
        &self.request
    }

    /// The name the file was actually created under.
    ///
    /// This differs from the requested filename when the [`Exists::Rename`]
    /// policy picked a free name. Composite handles report the name chosen
    /// by their first real child.
    pub fn name(&self) -> &str {
        match &self.stream {
            Stream::Disk(stream) => stream.name(),
            Stream::Null | Stream::Memory(_) => &self.request.filename,
            Stream::Tee(files) => files
                .iter()
                .find(|file| file.is_real())
                .map_or(&self.request.filename, |file| file.name()),
            Stream::Capture { inner, .. } => inner.name(),
        }
    }

    /// Returns `false` if everything written to this handle is discarded.
    ///
    /// Callers use this to skip producing expensive output when the
    /// [`Exists::Skip`] policy found an existing file.
    pub fn is_real(&self) -> bool {
        match &self.stream {
            Stream::Disk(stream) => stream.is_real(),
            Stream::Null => false,
            Stream::Memory(_) => true,
            Stream::Tee(files) => files.iter().any(LogFile::is_real),
            Stream::Capture { inner, .. } => inner.is_real(),
        }
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf)?;
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match &mut self.stream {
            Stream::Disk(stream) => stream.write_all(buf),
            Stream::Null => Ok(()),
            Stream::Memory(data) => {
                data.extend_from_slice(buf);
                Ok(())
            }
            Stream::Tee(files) => files.iter_mut().try_for_each(|file| file.write_all(buf)),
            Stream::Capture { inner, data } => {
                inner.write_all(buf)?;
                data.extend_from_slice(buf);
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Disk(stream) => stream.flush(),
            Stream::Null | Stream::Memory(_) => Ok(()),
            Stream::Tee(files) => files.iter_mut().try_for_each(LogFile::flush),
            Stream::Capture { inner, .. } => inner.flush(),
        }
    }
}

impl fmt::Debug for LogFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFile")
            .field("request", &self.request)
            .field("name", &self.name())
            .field("is_real", &self.is_real())
            .finish_non_exhaustive()
    }
}
