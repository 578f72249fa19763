//! Collision-avoiding file creation inside an output directory.
//!
//! Every sink that persists files goes through a [`Directory`], which decides
//! what to do when the requested name is already taken according to an
//! [`Exists`] policy.
//!
//! # Examples
//!
//! ```
//! # fn main() -> std::io::Result<()> {
//! use std::io::Write;
//! use treelog::dir::{Directory, Exists, Mode};
//!
//! let tmp = tempfile::tempdir()?;
//! let dir = Directory::acquire(tmp.path().join("out"))?;
//!
//! let mut first = dir.open_managed("out.txt", Mode::Text, Exists::Rename)?;
//! first.write_all(b"first")?;
//! let second = dir.open_managed("out.txt", Mode::Text, Exists::Rename)?;
//! assert!(second.name() == "out-1.txt");
//!
//! let skipped = dir.open_managed("out.txt", Mode::Text, Exists::Skip)?;
//! assert!(!skipped.is_real());
//! # Ok(())
//! # }
//! ```
use crate::error::InvalidArgument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::iter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How a managed file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Text, `"w"`.
    #[serde(rename = "w")]
    Text,
    /// Binary data, `"wb"`.
    #[serde(rename = "wb")]
    Binary,
}

/// What to do when a managed file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exists {
    /// Truncate the existing file.
    Overwrite,
    /// Pick the first free name `stem-n.ext` for `n = 1, 2, ...`.
    Rename,
    /// Return a sentinel that discards all writes.
    Skip,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::Text => "w",
            Mode::Binary => "wb",
        }
    }
}

impl Exists {
    pub const fn as_str(self) -> &'static str {
        match self {
            Exists::Overwrite => "overwrite",
            Exists::Rename => "rename",
            Exists::Skip => "skip",
        }
    }
}

impl FromStr for Mode {
    type Err = InvalidArgument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "w" => Ok(Mode::Text),
            "wb" => Ok(Mode::Binary),
            _ => Err(InvalidArgument::new("mode", s)),
        }
    }
}

impl FromStr for Exists {
    type Err = InvalidArgument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(Exists::Overwrite),
            "rename" => Ok(Exists::Rename),
            "skip" => Ok(Exists::Skip),
            _ => Err(InvalidArgument::new("exists", s)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Exists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An output directory, created on acquisition.
#[derive(Debug)]
pub struct Directory {
    path: PathBuf,
}

/// A file opened through [`Directory::open_managed`].
///
/// The stream is either backed by a file on disk or, when the
/// [`Exists::Skip`] policy found an existing file, a sentinel that discards
/// everything written to it.
#[derive(Debug)]
pub struct ManagedStream {
    name: String,
    file: Option<BufWriter<File>>,
}

impl Directory {
    /// Creates `path` and its parents if needed.
    pub fn acquire(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        Ok(Directory {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens `name` for writing, resolving collisions with `exists`.
    ///
    /// `Rename` and `Skip` never truncate a file: a name is only used if the
    /// file can be newly created under it.
    pub fn open_managed(&self, name: &str, mode: Mode, exists: Exists) -> io::Result<ManagedStream> {
        let (name, file) = match exists {
            Exists::Overwrite => (name.to_owned(), File::create(self.path.join(name))?),
            Exists::Skip => match self.create_new(name)? {
                Some(file) => (name.to_owned(), file),
                None => {
                    tracing::debug!(target: "treelog", file = name, "skipping existing file");
                    return Ok(ManagedStream::sentinel(name));
                }
            },
            Exists::Rename => self.create_renamed(name)?,
        };

        tracing::trace!(target: "treelog", file = %name, mode = %mode, "opened managed file");
        Ok(ManagedStream {
            name,
            file: Some(BufWriter::new(file)),
        })
    }

    fn create_renamed(&self, name: &str) -> io::Result<(String, File)> {
        for candidate in candidates(name) {
            if let Some(file) = self.create_new(&candidate)? {
                if candidate != name {
                    tracing::debug!(target: "treelog", from = name, to = %candidate, "renaming managed file");
                }
                return Ok((candidate, file));
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {}", name),
        ))
    }

    // `None` if the file already exists.
    fn create_new(&self, name: &str) -> io::Result<Option<File>> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path.join(name))
        {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ManagedStream {
    pub(crate) fn sentinel(name: &str) -> Self {
        ManagedStream {
            name: name.to_owned(),
            file: None,
        }
    }

    /// The name the file was created under, relative to its directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `false` if writes are discarded.
    pub fn is_real(&self) -> bool {
        self.file.is_some()
    }

    /// Empties the file, so that it can be rewritten from the start.
    pub(crate) fn rewind(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.file {
            file.flush()?;
            let file = file.get_mut();
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
        }
        Ok(())
    }
}

impl Write for ManagedStream {
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

// `name` itself, then `stem-1.ext`, `stem-2.ext`, ...
fn candidates(name: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = split_ext(name);
    iter::once(name.to_owned()).chain((1usize..).map(move |n| format!("{}-{}{}", stem, n, ext)))
}

// `archive.tar.gz` splits as `archive.tar` + `.gz`; leading dots belong to
// the stem, so `.profile` has no extension.
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => name.split_at(dot),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::{candidates, split_ext};

    #[test]
    fn test_split_ext() {
        assert!(split_ext("out.txt") == ("out", ".txt"));
        assert!(split_ext("archive.tar.gz") == ("archive.tar", ".gz"));
        assert!(split_ext(".profile") == (".profile", ""));
        assert!(split_ext("..dots") == ("..dots", ""));
        assert!(split_ext("README") == ("README", ""));
    }

    #[test]
    fn test_candidates() {
        let names: Vec<String> = candidates("out.txt").take(3).collect();
        assert!(names == ["out.txt", "out-1.txt", "out-2.txt"]);
    }
}
