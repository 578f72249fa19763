//! [`MakeWriter`] implementations for console sinks.
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use tracing_subscriber::fmt::MakeWriter;

/// A [`MakeWriter`] that writes to stdout.
///
/// This is functionally the same as using [`std::io::stdout`] as a
/// `MakeWriter`, except it has a named type and can therefore be used in type
/// signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct MakeStdout;

/// A [`MakeWriter`] that writes to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct MakeStderr;

impl<'a> MakeWriter<'a> for MakeStdout {
    type Writer = io::Stdout;

    fn make_writer(&self) -> Self::Writer {
        io::stdout()
    }
}

impl<'a> MakeWriter<'a> for MakeStderr {
    type Writer = io::Stderr;

    fn make_writer(&self) -> Self::Writer {
        io::stderr()
    }
}

/// An in-memory [`MakeWriter`] whose clones share one buffer.
///
/// # Examples
///
/// ```
/// use treelog::log::ConsoleLog;
/// use treelog::writer::Buffer;
/// use treelog::Level;
/// use treelog::log::Log;
///
/// # fn main() -> treelog::Result<()> {
/// let buffer = Buffer::new();
/// let log = ConsoleLog::builder().with_writer(buffer.clone()).build();
/// log.write(Level::Info, "hello")?;
/// assert!(buffer.contents() == "hello\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }

    /// Takes everything written so far, leaving the buffer empty.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.bytes.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Buffer {
    type Writer = Buffer;

    fn make_writer(&self) -> Self::Writer {
        self.clone()
    }
}
