//! Adaptive fetch sizing.
//!
//! The ratio of examined rows to admitted ids drifts across a scan (dense
//! runs of indexable rows, then long stretches of drafts or spam). The sizer
//! nudges the fetch size after every fetch so that each fetch admits roughly
//! `target` ids, bounding both round-trips and per-batch memory.

/// Smallest fetch size the sizer will ever choose.
pub const MIN_BATCH_SIZE: usize = 10;

/// Upper bound on the fetch size, as a multiple of the target.
pub const MAX_BATCH_MULTIPLE: usize = 5;

/// Batch size controller driven by admitted-per-fetch feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSizer {
    target: usize,
    current: usize,
}

impl BatchSizer {
    /// Start at the target size.
    pub fn new(target: usize) -> Self {
        Self::with_initial(target, target)
    }

    /// Start at an arbitrary size (clamped into bounds).
    pub fn with_initial(target: usize, initial: usize) -> Self {
        let target = target.max(1);
        let mut sizer = Self {
            target,
            current: initial,
        };
        sizer.current = sizer.clamp(initial);
        sizer
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max_size(&self) -> usize {
        self.target * MAX_BATCH_MULTIPLE
    }

    /// Feed back the number of ids admitted by the latest fetch.
    ///
    /// | admitted                     | action     |
    /// |------------------------------|------------|
    /// | `< 0.5 × target`             | double     |
    /// | `> 1.1 × target`             | shrink 20% |
    /// | `[0.5, 0.9) × target`        | grow 30%   |
    /// | otherwise                    | unchanged  |
    ///
    /// Returns the new size.
    pub fn adjust(&mut self, admitted: usize) -> usize {
        // Compare in tenths of the target to stay in integer space.
        let scaled = admitted * 10;
        let t = self.target;
        let next = if scaled < t * 5 {
            self.current.saturating_mul(2)
        } else if scaled > t * 11 {
            self.current * 8 / 10
        } else if scaled < t * 9 {
            self.current * 13 / 10
        } else {
            self.current
        };
        self.current = self.clamp(next);
        self.current
    }

    fn clamp(&self, size: usize) -> usize {
        size.clamp(MIN_BATCH_SIZE, self.max_size().max(MIN_BATCH_SIZE))
    }
}
