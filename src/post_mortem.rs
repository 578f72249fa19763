//! Fault reports written when a panic or error escapes an active log.
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::panic;
use std::sync::Once;

thread_local! {
    // Where the latest panic on this thread was raised, recorded by the hook.
    static PANIC_SITE: RefCell<Option<PanicSite>> = RefCell::new(None);
}

static INSTALL_HOOK: Once = Once::new();

struct PanicSite {
    location: Option<String>,
    frames: Vec<Frame>,
}

/// A fault that escaped an [`Activation`], with the stack it escaped from.
///
/// [`Activation`]: crate::registry::Activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostMortem {
    message: String,
    frames: Vec<Frame>,
}

/// A single stack frame of a [`PostMortem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl PostMortem {
    /// Builds a report from a message and explicit frames.
    pub fn new(message: impl Into<String>, frames: Vec<Frame>) -> Self {
        PostMortem {
            message: message.into(),
            frames,
        }
    }

    /// Builds a report for a panic payload.
    ///
    /// The stack is the one the panic was raised from, if the panic hook
    /// installed on activation recorded it, and the current stack otherwise.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let mut message = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("panicked: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("panicked: {}", s)
        } else {
            "panicked".to_owned()
        };
        match take_panic_site() {
            Some(site) => {
                if let Some(location) = site.location {
                    message.push_str(", ");
                    message.push_str(&location);
                }
                PostMortem::new(message, site.frames)
            }
            None => PostMortem::new(message, capture_frames()),
        }
    }

    /// Builds a report for a panic that unwound past an activation without
    /// being caught, with the stack it was raised from if known.
    pub(crate) fn unhandled_panic() -> Self {
        let frames = take_panic_site().map_or_else(Vec::new, |site| site.frames);
        PostMortem::new("unhandled panic", frames)
    }

    /// Builds a report for an error and its chain of sources, capturing the
    /// current stack.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str("\ncaused by: ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        PostMortem::new(message, capture_frames())
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl fmt::Display for PostMortem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if !self.frames.is_empty() {
            f.write_str("\nstack backtrace:")?;
            for frame in &self.frames {
                write!(f, "\n  {}", frame)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File \"{}\", line {}, in {}",
            self.file.as_deref().unwrap_or("<unknown>"),
            self.line.unwrap_or(0),
            self.function
        )
    }
}

/// Chains a panic hook that records where panics on this thread are raised.
/// The previous hook still runs afterwards.
pub(crate) fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let site = PanicSite {
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                frames: strip_panic_machinery(capture_frames()),
            };
            let _ = PANIC_SITE.try_with(|slot| *slot.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

/// Forgets the recorded panic site, so a stale one is never reported.
pub(crate) fn clear_panic_site() {
    let _ = PANIC_SITE.try_with(|slot| slot.borrow_mut().take());
}

fn take_panic_site() -> Option<PanicSite> {
    PANIC_SITE.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

fn capture_frames() -> Vec<Frame> {
    parse_backtrace(&Backtrace::force_capture().to_string())
}

// Drops the frames of the backtrace machinery and the panic runtime above
// the function that panicked.
fn strip_panic_machinery(mut frames: Vec<Frame>) -> Vec<Frame> {
    const MACHINERY: &[&str] = &[
        "std::",
        "core::",
        "alloc::",
        "<std::",
        "<core::",
        "<alloc::",
        "rust_begin_unwind",
        "__rustc::",
        "treelog::post_mortem::",
    ];
    let start = frames
        .iter()
        .position(|frame| !MACHINERY.iter().any(|prefix| frame.function.starts_with(prefix)))
        .unwrap_or(0);
    frames.drain(..start);
    frames
}

// The rendered backtrace alternates between `N: function` lines and
// indented `at file:line:column` lines.
fn parse_backtrace(rendered: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in rendered.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                let line = parts.next().and_then(|l| l.parse().ok());
                frame.file = parts.next().map(str::to_owned);
                frame.line = line;
            }
        } else if let Some((index, function)) = line.split_once(": ") {
            if index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(Frame {
                    function: function.to_owned(),
                    file: None,
                    line: None,
                });
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backtrace() {
        let rendered = "   0: treelog::compute\n             at ./src/main.rs:12:5\n   1: main\n";
        let frames = parse_backtrace(rendered);
        assert!(frames.len() == 2);
        assert!(frames[0].function == "treelog::compute");
        assert!(frames[0].file.as_deref() == Some("./src/main.rs"));
        assert!(frames[0].line == Some(12));
        assert!(frames[1].file.is_none());
    }

    #[test]
    fn test_strip_panic_machinery() {
        let frame = |function: &str| Frame {
            function: function.to_owned(),
            file: None,
            line: None,
        };
        let frames = vec![
            frame("std::backtrace::Backtrace::force_capture"),
            frame("treelog::post_mortem::capture_frames"),
            frame("<alloc::boxed::Box<F,A> as core::ops::function::Fn<Args>>::call"),
            frame("std::panicking::rust_panic_with_hook"),
            frame("core::panicking::panic_fmt"),
            frame("solver::factorize"),
            frame("std::panicking::try"),
        ];
        let stripped = strip_panic_machinery(frames);
        assert!(stripped.len() == 2);
        assert!(stripped[0].function == "solver::factorize");
    }

    #[test]
    fn test_disabled_backtrace() {
        assert!(parse_backtrace("disabled backtrace").is_empty());
    }
}
