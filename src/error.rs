//! Error types for wrapped calls.

use std::fmt;
use std::rc::Rc;

/// Errors surfaced by a memoized call.
///
/// Failures of the work function are cached like values: the same
/// [`MemoError::UserError`] comes back on every call with that key until the
/// key is dirtied. Cycle failures are never cached; the entry stays dirty and
/// the next non-cyclic call recomputes it.
#[derive(Debug, Clone)]
pub enum MemoError {
    /// A wrapped call re-entered an entry that is currently recomputing,
    /// directly or through mutual recursion.
    Cycle,

    /// The work function failed.
    ///
    /// The original error is reachable through [`anyhow::Error::downcast_ref`].
    UserError(Rc<anyhow::Error>),
}

impl MemoError {
    /// Returns true for the cycle failure.
    pub fn is_cycle(&self) -> bool {
        matches!(self, MemoError::Cycle)
    }
}

impl fmt::Display for MemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoError::Cycle => write!(f, "already recomputing"),
            MemoError::UserError(err) => write!(f, "user error: {err}"),
        }
    }
}

// Note: MemoError intentionally does not implement std::error::Error, which
// is what makes the blanket conversion below coherent.
impl<E: Into<anyhow::Error>> From<E> for MemoError {
    fn from(err: E) -> Self {
        MemoError::UserError(Rc::new(err.into()))
    }
}
