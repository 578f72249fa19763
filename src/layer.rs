//! A [`Layer`] forwarding `tracing` spans and events to the active log.
//!
//! Entered spans become contexts and events become messages, so code
//! instrumented with `tracing` shows up in whatever log is active:
//!
//! ```
//! use std::rc::Rc;
//! use tracing_subscriber::prelude::*;
//! use treelog::layer::TreeLayer;
//! use treelog::log::CaptureLog;
//! use treelog::Level;
//!
//! # fn main() -> treelog::Result<()> {
//! let log = Rc::new(CaptureLog::new());
//! let subscriber = tracing_subscriber::registry().with(TreeLayer::new());
//!
//! tracing::subscriber::with_default(subscriber, || -> treelog::Result<()> {
//!     let _active = treelog::activate(log.clone())?;
//!     tracing::info_span!("solve").in_scope(|| {
//!         tracing::warn!(iterations = 40, "slow convergence");
//!     });
//!     Ok(())
//! })?;
//!
//! assert!(log.items() == [(Level::Warning, "slow convergence | iterations: 40".to_owned())]);
//! # Ok(())
//! # }
//! ```
use crate::log::Log;
use crate::{fail, registry, Level};
use std::cell::{Cell, RefCell};
use std::fmt::{self, Write as _};
use std::rc::Rc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events with this target are written at [`Level::User`] instead of
/// [`Level::Info`].
pub const USER_TARGET: &str = "user";

const INTERNAL_TARGET: &str = "treelog";

thread_local! {
    static FORWARDING: Cell<bool> = Cell::new(false);
    // Spans entered on this thread, with the log their context was pushed on.
    static ENTERED: RefCell<Vec<(Id, Rc<dyn Log>)>> = RefCell::new(Vec::new());
}

/// A [`Layer`] that writes spans and events to the active log.
///
/// | `tracing` level | log level |
/// |-----------------|-----------|
/// | `ERROR`         | error     |
/// | `WARN`          | warning   |
/// | `INFO`          | info, or user if the target is `"user"` |
/// | `DEBUG`, `TRACE`| debug     |
///
/// Fields are appended to the message as ` | key: value`. Events raised
/// while a log is handling another event are dropped, and so are this
/// crate's own diagnostics (target `"treelog"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeLayer {
    _priv: (),
}

impl TreeLayer {
    pub fn new() -> Self {
        TreeLayer::default()
    }
}

// The context title of a span: its name and fields.
struct Title(String);

struct Visitor {
    message: Option<String>,
    fields: String,
}

impl Visitor {
    fn new() -> Self {
        Visitor {
            message: None,
            fields: String::new(),
        }
    }

    fn finish(self, name: &str) -> String {
        let mut text = self.message.unwrap_or_else(|| name.to_owned());
        text.push_str(&self.fields);
        text
    }
}

impl Visit for Visitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" if self.message.is_none() => self.message = Some(value.to_owned()),
            key => {
                let _ = write!(self.fields, " | {}: {}", key, value);
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" if self.message.is_none() => self.message = Some(format!("{:?}", value)),
            key => {
                let _ = write!(self.fields, " | {}: {:?}", key, value);
            }
        }
    }
}

// Clears the forwarding flag when dropped, also if the log panics.
struct Forwarding;

impl Drop for Forwarding {
    fn drop(&mut self) {
        let _ = FORWARDING.try_with(|forwarding| forwarding.set(false));
    }
}

// Runs `f` unless the layer is already forwarding on this thread.
fn forward(what: &str, f: impl FnOnce() -> crate::Result<()>) {
    if FORWARDING.with(|forwarding| forwarding.replace(true)) {
        return;
    }
    let _forwarding = Forwarding;
    if let Err(e) = f() {
        fail::report_error(what, &e);
    }
}

impl<S> Layer<S> for TreeLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let span = ctx.span(id).unwrap_or_else(fail::span_not_in_ctx);
        let mut visitor = Visitor::new();
        attrs.record(&mut visitor);
        let mut title = attrs.metadata().name().to_owned();
        title.push_str(&visitor.fields);
        span.extensions_mut().insert(Title(title));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let span = ctx.span(id).unwrap_or_else(fail::span_not_in_ctx);
        let mut visitor = Visitor::new();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(title) = extensions.get_mut::<Title>() {
            title.0.push_str(&visitor.fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == INTERNAL_TARGET {
            return;
        }
        let level = match Level::from(*metadata.level()) {
            Level::Info if metadata.target() == USER_TARGET => Level::User,
            level => level,
        };

        let mut visitor = Visitor::new();
        event.record(&mut visitor);
        let text = visitor.finish(metadata.name());

        forward("forward event", || registry::current().write(level, &text));
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        let span = ctx.span(id).unwrap_or_else(fail::span_not_in_ctx);
        let title = match span.extensions().get::<Title>() {
            Some(title) => title.0.clone(),
            None => span.name().to_owned(),
        };

        forward("enter span", || {
            let log = registry::current();
            log.push_context(&title, false)?;
            ENTERED.with(|entered| entered.borrow_mut().push((id.clone(), log)));
            Ok(())
        });
    }

    fn on_exit(&self, id: &Id, _ctx: Context<'_, S>) {
        forward("exit span", || {
            let log = ENTERED.with(|entered| {
                let mut entered = entered.borrow_mut();
                let position = entered.iter().rposition(|(entered, _)| entered == id)?;
                Some(entered.remove(position).1)
            });
            match log {
                Some(log) => log.pop_context(),
                None => Ok(()),
            }
        });
    }
}
