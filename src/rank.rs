//! Worker rank of the current execution context.
//!
//! Parallel helpers that fork workers set the rank of each worker to a
//! nonzero value. Sinks consult [`is_primary`] before rendering, so output
//! from workers never interleaves with the primary's log.
use std::cell::Cell;
use std::num::NonZeroUsize;

thread_local! {
    static RANK: Cell<Option<NonZeroUsize>> = Cell::new(None);
}

/// Returns the rank of the current worker, or `None` for the primary.
pub fn current() -> Option<NonZeroUsize> {
    RANK.with(Cell::get)
}

/// Returns `true` if the current execution context is the primary.
pub fn is_primary() -> bool {
    current().is_none()
}

/// Sets the rank of the current execution context.
///
/// This is meant to be called once, right after a worker is forked.
pub fn set(rank: Option<NonZeroUsize>) {
    RANK.with(|cell| cell.set(rank));
}

/// Sets the rank until the returned guard is dropped.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// assert!(treelog::rank::is_primary());
/// {
///     let _worker = treelog::rank::scoped(NonZeroUsize::new(2));
///     assert!(!treelog::rank::is_primary());
/// }
/// assert!(treelog::rank::is_primary());
/// ```
pub fn scoped(rank: Option<NonZeroUsize>) -> RankGuard {
    let previous = current();
    set(rank);
    RankGuard { previous }
}

/// Restores the previous rank when dropped. Returned by [`scoped`].
#[derive(Debug)]
#[must_use = "the rank is restored as soon as the guard is dropped"]
pub struct RankGuard {
    previous: Option<NonZeroUsize>,
}

impl Drop for RankGuard {
    fn drop(&mut self) {
        set(self.previous);
    }
}
