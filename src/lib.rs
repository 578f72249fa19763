//! Hierarchical logging for long-running computations.
//!
//! # Overview
//!
//! Numerical programs spend most of their time in nested loops and stages:
//! a time step contains a Newton solve, which contains a linear solve, which
//! contains an assembly. `treelog` organizes log output the same way. Code
//! enters named *contexts* and writes leveled messages; the active [`Log`]
//! decides how the resulting tree is rendered:
//!
//! * [`ConsoleLog`] prints `timestep 3 > newton 2 > residual 1e-8` lines.
//! * [`RichLog`] prints colored lines and an ephemeral progress line.
//! * [`HtmlLog`] writes a collapsible HTML document.
//! * [`IndentLog`] writes indented snippets and a `progress.json` file that
//!   monitoring tools can poll.
//!
//! Contexts are rendered lazily: a context only shows up once something is
//! written inside it, so deeply nested scopes without output cost nothing.
//!
//! [`ConsoleLog`]: crate::log::ConsoleLog
//! [`RichLog`]: crate::log::RichLog
//! [`HtmlLog`]: crate::log::HtmlLog
//! [`IndentLog`]: crate::log::IndentLog
//!
//! # Getting started
//!
//! Activate a log for the duration of a scope, then use the free functions
//! in this crate, which act on whatever log is active:
//! ```
//! use std::rc::Rc;
//! use treelog::log::ConsoleLog;
//! use treelog::writer::Buffer;
//! use treelog::Level;
//!
//! # fn main() -> treelog::Result<()> {
//! let buffer = Buffer::new();
//! let log = Rc::new(ConsoleLog::builder().with_writer(buffer.clone()).build());
//!
//! let _active = treelog::activate(log)?;
//! for step in 1..=2 {
//!     let _step = treelog::iter_context(&format!("step {}", step))?;
//!     treelog::write(Level::Info, "converged")?;
//! }
//! assert!(buffer.contents() == "step 1 > converged\nstep 2 > converged\n");
//! # Ok(())
//! # }
//! ```
//!
//! Logs can be combined: a [`TeeLog`] writes to several logs at once, and a
//! [`RecordLog`] records everything passing through it so that it can be
//! replayed later, e.g. when a cached result is loaded instead of being
//! recomputed.
//!
//! [`TeeLog`]: crate::log::TeeLog
//! [`RecordLog`]: crate::log::RecordLog
//!
//! # Managed files
//!
//! Output files are opened through the log with [`open`], which creates them
//! in the log's output directory (if it has one) without clobbering earlier
//! output, and reports them in the log once they are closed.
//!
//! # `tracing` integration
//!
//! [`TreeLayer`] forwards spans and events from the [`tracing`] ecosystem to
//! the active log.
//!
//! [`TreeLayer`]: crate::layer::TreeLayer
//!
//! # Feature flags
//!
//! * `attributes` (default): the [`title`], [`main`] and [`test`] attribute
//!   macros.
pub mod config;
pub mod context;
pub mod dir;
pub mod error;
pub mod file;
pub mod layer;
pub mod level;
pub mod log;
pub mod post_mortem;
pub mod rank;
pub mod registry;
pub mod writer;
mod fail;

// Items that are required for macros but not intended for public API
#[doc(hidden)]
pub mod private {
    use crate::log::{ConsoleLog, ContextGuard, Log, RichLog};
    use crate::{fail, registry, Config, Level};
    use std::fmt;
    use std::rc::Rc;

    pub fn console(is_test: bool, rich: bool, verbosity: Option<Level>) -> Rc<dyn Log> {
        let mut config = Config::from_env();
        if let Some(verbosity) = verbosity {
            config.verbosity = verbosity;
        }
        match (rich, is_test) {
            (false, false) => Rc::new(ConsoleLog::builder().with_config(config).build()),
            (false, true) => Rc::new(
                ConsoleLog::builder()
                    .with_config(config)
                    .with_test_writer()
                    .build(),
            ),
            (true, false) => Rc::new(RichLog::builder().with_config(config).build()),
            (true, true) => Rc::new(
                RichLog::builder()
                    .with_config(config)
                    .with_test_writer()
                    .build(),
            ),
        }
    }

    pub fn run<R>(log: Rc<dyn Log>, f: impl FnOnce() -> R) -> R {
        match registry::activate(log) {
            Ok(activation) => activation.in_closure(f),
            Err(e) => fail::activation_failed(e),
        }
    }

    pub fn title(title: &dyn fmt::Display) -> Option<ContextGuard<Rc<dyn Log>>> {
        match crate::context(&title.to_string()) {
            Ok(guard) => Some(guard),
            Err(e) => {
                fail::report_error("enter context", &e);
                None
            }
        }
    }
}

pub use crate::config::Config;
pub use crate::dir::{Exists, Mode};
pub use crate::error::{Error, Result};
pub use crate::level::Level;
pub use crate::log::Log;
pub use crate::registry::{activate, interrupt, Activation, Interrupted};

use crate::log::{ContextGuard, ManagedFile};
use std::rc::Rc;

/// Enters a context in the active log. The context is left when the guard
/// is dropped.
pub fn context(title: &str) -> Result<ContextGuard<Rc<dyn Log>>> {
    ContextGuard::push(registry::current(), title, false)
}

/// Enters a context that is one of many quick successive ones, like a loop
/// iteration. Logs with progress output may skip repainting for it.
pub fn iter_context(title: &str) -> Result<ContextGuard<Rc<dyn Log>>> {
    ContextGuard::push(registry::current(), title, true)
}

/// Writes `text` at `level` to the active log.
pub fn write(level: Level, text: &str) -> Result<()> {
    registry::current().write(level, text)
}

/// Opens a managed file through the active log.
///
/// The file is created in the log's output directory, resolving name
/// collisions with `exists`, and its name is written to the log at `level`
/// when the returned handle is dropped. Logs without an output directory
/// return a handle that discards everything; check
/// [`is_real`](ManagedFile::is_real) to skip producing expensive output.
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use std::rc::Rc;
/// use treelog::log::DataLog;
/// use treelog::{Exists, Level, Mode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tmp = tempfile::tempdir()?;
/// let _active = treelog::activate(Rc::new(DataLog::new(tmp.path())))?;
///
/// let mut file = treelog::open("result.csv", Mode::Text, Level::User, Exists::Rename)?;
/// assert!(file.is_real());
/// writeln!(file, "x,y")?;
/// file.finish()?;
///
/// assert!(std::fs::read_to_string(tmp.path().join("result.csv"))? == "x,y\n");
/// # Ok(())
/// # }
/// ```
pub fn open(
    filename: &str,
    mode: Mode,
    level: Level,
    exists: Exists,
) -> Result<ManagedFile<Rc<dyn Log>>> {
    ManagedFile::open(registry::current(), filename, mode, level, exists)
}

/// Runs the function body inside a context named after the function.
///
/// The context title can be given explicitly, and a parameter named `title`
/// overrides both.
///
/// # Examples
///
/// ```
/// # use std::rc::Rc;
/// # use treelog::log::CaptureLog;
/// # use treelog::Level;
/// #[treelog::title]
/// fn assemble() -> treelog::Result<()> {
///     treelog::write(Level::Info, "nnz 1024")
/// }
///
/// #[treelog::title("linear solve")]
/// fn solve() {}
///
/// #[treelog::title]
/// fn refine(title: &str) -> treelog::Result<()> {
///     treelog::write(Level::Info, "refined")
/// }
///
/// # fn main() -> treelog::Result<()> {
/// let log = Rc::new(CaptureLog::new());
/// let _active = treelog::activate(log.clone())?;
/// assemble()?;
/// refine("level 2")?;
/// let contexts: Vec<_> = log.events().into_iter().filter_map(|event| match event {
///     treelog::log::Captured::Push(title) => Some(title),
///     _ => None,
/// }).collect();
/// assert!(contexts == ["assemble", "level 2"]);
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "attributes")]
pub use treelog_macros::title;

/// Marks `main` to run with a console log activated.
///
/// Panics escaping `main` are written to the log before they propagate.
/// The `fmt` argument selects `"plain"` (default) or `"rich"` output, and
/// `verbose` the least important level that is printed.
///
/// # Examples
///
/// ```
/// # #[allow(clippy::needless_doctest_main)]
/// #[treelog::main(fmt = "rich", verbose = "user")]
/// fn main() {
///     treelog::write(treelog::Level::User, "Hello, world!").unwrap();
/// }
/// ```
#[cfg(feature = "attributes")]
pub use treelog_macros::main;

/// Marks a test to run with a console log writing to the test output.
///
/// Takes the same arguments as [`main`].
///
/// ```
/// #[treelog::test]
/// fn test_hello() -> treelog::Result<()> {
///     treelog::write(treelog::Level::Info, "Hello, world!")
/// }
/// ```
#[cfg(feature = "attributes")]
pub use treelog_macros::test;
