//! The lazily flushed context stack shared by every tree-style log.
//!
//! Pushing a context only records its title. Nothing is rendered until
//! something is written inside it: [`ContextStack::materialize`] then renders
//! every pending title, outermost first. Popping a context that was never
//! rendered is silent, so scopes without output never show up and entering
//! deeply nested empty scopes costs nothing.
//!
//! The stack doesn't know how to render; callers pass the push and pop
//! callbacks. The HTML and indent logs render to files, the capture log to
//! memory, and the record log to its message buffer.
//!
//! # Examples
//!
//! ```
//! use treelog::context::ContextStack;
//!
//! let mut stack = ContextStack::new();
//! let mut rendered = Vec::new();
//!
//! stack.push("empty");
//! stack.pop(|| -> Result<(), ()> { rendered.push("pop".to_owned()); Ok(()) }).unwrap();
//! assert!(rendered.is_empty());
//!
//! stack.push("outer");
//! stack.push("inner");
//! stack.materialize(|title| -> Result<(), ()> { rendered.push(title.to_owned()); Ok(()) }).unwrap();
//! assert!(rendered == ["outer", "inner"]);
//! assert!(stack.printed() == 2);
//! ```
use crate::fail;

/// Titles of the currently entered contexts and how many of them have been
/// rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStack {
    titles: Vec<String>,
    printed: usize,
}

impl ContextStack {
    pub const fn new() -> Self {
        ContextStack {
            titles: Vec::new(),
            printed: 0,
        }
    }

    /// Titles of all entered contexts, outermost first.
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Number of contexts, counted from the outermost, that have been
    /// rendered. Never exceeds [`len`](Self::len).
    pub fn printed(&self) -> usize {
        self.printed
    }

    /// Titles that have been entered but not rendered yet.
    pub fn pending(&self) -> &[String] {
        &self.titles[self.printed..]
    }

    /// Enters a context without rendering anything.
    pub fn push(&mut self, title: impl Into<String>) {
        self.titles.push(title.into());
    }

    /// Renders every pending context by calling `on_push` for each, outermost
    /// first.
    ///
    /// The printed prefix advances one title at a time, so if `on_push` fails
    /// the stack still reflects exactly what was rendered.
    pub fn materialize<E>(&mut self, mut on_push: impl FnMut(&str) -> Result<(), E>) -> Result<(), E> {
        while self.printed < self.titles.len() {
            on_push(&self.titles[self.printed])?;
            self.printed += 1;
        }
        Ok(())
    }

    /// Leaves the innermost context, calling `on_pop` exactly once if it had
    /// been rendered. Returns the title of the context that was left.
    ///
    /// # Panics
    ///
    /// Panics if no context is entered. Contexts are only popped by the guard
    /// that pushed them, so this indicates a bug.
    pub fn pop<E>(&mut self, on_pop: impl FnOnce() -> Result<(), E>) -> Result<String, E> {
        let title = self.titles.pop().unwrap_or_else(fail::empty_context_stack);
        if self.printed > self.titles.len() {
            self.printed -= 1;
            on_pop()?;
        }
        Ok(title)
    }
}
