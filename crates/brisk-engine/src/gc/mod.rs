//! Heap storage for objects and environment records.
//!
//! The heap is an append-only arena addressed by typed handles. Nothing is
//! ever freed: a heap lives as long as its engine.

mod heap;

pub use heap::Heap;

/// A handle to an object in the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: u32,
}

impl ObjectRef {
    /// Creates a handle from an arena index.
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    /// Returns the arena index.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// A handle to an environment record in the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvRef {
    index: u32,
}

impl EnvRef {
    /// Creates a handle from an arena index.
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    /// Returns the arena index.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}
