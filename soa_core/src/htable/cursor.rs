//! Explicit probe cursor for shared-reference lookups.

/// Where the last successful probe stopped, so the next lookup for the same
/// key can resume one step further.
///
/// `HTable::find` keeps one of these inside the table; `HTable::find_with`
/// takes one from the caller so that lookups work through `&self`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeCursor {
    /// Slot of the last match.
    pos: Option<usize>,
    /// Probe steps taken since the lookup was restarted.
    steps: usize,
}

impl ProbeCursor {
    /// A cursor with no position; resuming from it finds nothing.
    #[inline]
    pub const fn new() -> Self {
        Self { pos: None, steps: 0 }
    }

    /// Slot of the last match, if the last lookup succeeded.
    #[inline]
    pub const fn position(&self) -> Option<usize> {
        self.pos
    }

    #[inline]
    pub(crate) const fn steps(&self) -> usize {
        self.steps
    }

    #[inline]
    pub(crate) const fn set(&mut self, pos: usize, steps: usize) {
        self.pos = Some(pos);
        self.steps = steps;
    }

    /// Forgets the position.
    #[inline]
    pub const fn clear(&mut self) {
        self.pos = None;
        self.steps = 0;
    }
}
