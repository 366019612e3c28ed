//! Bookkeeping carried from the pull phase to the push phase.

use crate::field::FeatureMap;

/// What a pull step leaves behind for its push step.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLevel {
    /// Rows of zeros added at the bottom before reducing.
    pub pad_h: usize,
    /// Columns of zeros added at the right before reducing.
    pub pad_w: usize,
    /// Activation entering the pull step, before padding.
    pub residual: FeatureMap,
}

/// Fixed-capacity LIFO of pyramid levels.
///
/// Capacity is the level count, known before the pull phase starts. Pushing
/// past it or popping an empty state is a bookkeeping bug and panics.
#[derive(Debug)]
pub struct PyramidState {
    slots: Vec<Option<PyramidLevel>>,
    cursor: usize,
}

impl PyramidState {
    pub fn with_capacity(levels: usize) -> Self {
        Self {
            slots: (0..levels).map(|_| None).collect(),
            cursor: 0,
        }
    }

    pub fn push(&mut self, level: PyramidLevel) {
        assert!(
            self.cursor < self.slots.len(),
            "pyramid state overflow: capacity {}",
            self.slots.len()
        );
        self.slots[self.cursor] = Some(level);
        self.cursor += 1;
    }

    pub fn pop(&mut self) -> PyramidLevel {
        assert!(self.cursor > 0, "pyramid state underflow");
        self.cursor -= 1;
        match self.slots[self.cursor].take() {
            Some(level) => level,
            None => panic!("pyramid state slot {} is empty", self.cursor),
        }
    }

    /// Levels currently stored.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
