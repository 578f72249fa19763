//! The active log of the current thread.
//!
//! Exactly one log is active at any time. [`activate`] installs a log and
//! returns an [`Activation`] guard; dropping the guard reinstates the log
//! that was active before, so activations nest like scopes. When nothing has
//! been activated, a [`ConsoleLog`] configured from the environment is
//! active.
use crate::config::Config;
use crate::error::Result;
use crate::fail;
use crate::log::{ConsoleLog, Log};
use crate::post_mortem::{self, PostMortem};
use crate::Level;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::thread;

thread_local! {
    static ACTIVE: RefCell<Option<Rc<dyn Log>>> = RefCell::new(None);
}

/// Returns the active log.
pub fn current() -> Rc<dyn Log> {
    ACTIVE.with(|active| {
        active
            .borrow_mut()
            .get_or_insert_with(default_log)
            .clone()
    })
}

fn default_log() -> Rc<dyn Log> {
    Rc::new(ConsoleLog::builder().with_config(Config::from_env()).build())
}

/// Makes `log` the active log until the returned guard is dropped.
///
/// The log's [`enter`](Log::enter) hook runs first, receiving the log that
/// was active before. If it fails, nothing changes.
///
/// # Errors
///
/// Returns [`Error::Reentrancy`] if `log` is already active, or whatever
/// error the log's `enter` hook reports.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use treelog::log::CaptureLog;
/// use treelog::Level;
///
/// # fn main() -> treelog::Result<()> {
/// let log = Rc::new(CaptureLog::new());
/// {
///     let _active = treelog::activate(log.clone())?;
///     treelog::write(Level::User, "captured")?;
///
///     assert!(treelog::activate(log.clone()).is_err());
/// }
/// treelog::write(Level::User, "printed to stdout")?;
/// assert!(log.items().len() == 1);
/// # Ok(())
/// # }
/// ```
///
/// [`Error::Reentrancy`]: crate::Error::Reentrancy
pub fn activate(log: Rc<dyn Log>) -> Result<Activation> {
    let previous = current();
    log.enter(previous.clone())?;
    post_mortem::install_panic_hook();
    ACTIVE.with(|active| *active.borrow_mut() = Some(log.clone()));
    tracing::trace!(target: "treelog", "activated log");
    Ok(Activation {
        log,
        previous: Some(previous),
        reported: Cell::new(false),
    })
}

/// Panic payload signalling that the user interrupted the program.
///
/// Raised by [`interrupt`]. An [`Activation`] reports it as a single
/// `killed by user` line instead of a post-mortem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Unwinds with the [`Interrupted`] payload.
pub fn interrupt() -> ! {
    panic::resume_unwind(Box::new(Interrupted))
}

/// Keeps a log active. Returned by [`activate`].
///
/// Dropping the guard reinstates the previous log and calls the log's
/// [`exit`](Log::exit) hook, also when unwinding. Use
/// [`release`](Activation::release) to observe errors from the hook.
#[must_use = "the log is deactivated as soon as the guard is dropped"]
pub struct Activation {
    log: Rc<dyn Log>,
    previous: Option<Rc<dyn Log>>,
    reported: Cell<bool>,
}

impl Activation {
    /// The activated log.
    pub fn log(&self) -> &Rc<dyn Log> {
        &self.log
    }

    /// Runs `f`, reporting a panic escaping it to the activated log before
    /// resuming the panic.
    ///
    /// A panic raised by [`interrupt`] is reported as `killed by user`; any
    /// other panic is reported with [`Log::write_post_mortem`].
    pub fn in_closure<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        post_mortem::clear_panic_site();
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(payload) => {
                self.report_panic(&*payload);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Runs `f`, reporting an error it returns to the activated log. The
    /// error is returned unchanged. Panics are handled as in
    /// [`in_closure`](Activation::in_closure).
    pub fn in_result<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError + 'static,
    {
        let result = self.in_closure(f);
        if let Err(e) = &result {
            self.report(&PostMortem::from_error(e));
        }
        result
    }

    /// Deactivates the log, returning any error from its exit hook.
    pub fn release(mut self) -> Result<()> {
        self.restore()
    }

    fn report_panic(&self, payload: &(dyn Any + Send)) {
        self.reported.set(true);
        if payload.is::<Interrupted>() {
            if let Err(e) = self.log.write(Level::Error, "killed by user") {
                fail::report_error("report interrupt", &e);
            }
        } else {
            self.report(&PostMortem::from_panic(payload));
        }
    }

    fn report(&self, post_mortem: &PostMortem) {
        if let Err(e) = self.log.write_post_mortem(post_mortem) {
            fail::report_error("write post-mortem", &e);
        }
    }

    fn restore(&mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => {
                ACTIVE.with(|active| *active.borrow_mut() = Some(previous));
                tracing::trace!(target: "treelog", "deactivated log");
                self.log.exit()
            }
            None => Ok(()),
        }
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        // Panics caught by `in_closure` were reported there already; this
        // covers unwinding that bypassed it.
        if thread::panicking() && self.previous.is_some() && !self.reported.get() {
            self.report(&PostMortem::unhandled_panic());
        }
        if let Err(e) = self.restore() {
            fail::report_error("deactivate log", &e);
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation").finish_non_exhaustive()
    }
}
