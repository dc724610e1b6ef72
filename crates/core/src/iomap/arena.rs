use std::ops::Range;

use crate::{SimResult, SimulationError};

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Rounds `size` up to a whole number of pages.
pub fn page_align(size: usize) -> Option<usize> {
    Some(size.checked_add(PAGE_MASK)? & !PAGE_MASK)
}

/// A block handed out by [`IoSpaceArena::allocate`], addressed by offset into the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSpan {
    start: usize,
    len: usize,
}

impl ArenaSpan {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// Bump allocator backing all device registers. Nothing is ever freed.
pub struct IoSpaceArena {
    space: Vec<u8>,
    used: usize,
}

impl std::fmt::Debug for IoSpaceArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoSpaceArena")
            .field("capacity", &self.space.len())
            .field("used", &self.used)
            .finish()
    }
}

impl IoSpaceArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            space: vec![0; capacity],
            used: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.space.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Claims a zeroed, page-aligned block of at least `size` bytes.
    pub fn allocate(&mut self, size: usize) -> SimResult<ArenaSpan> {
        let exhausted = SimulationError::ArenaExhausted {
            requested: size,
            used: self.used,
            capacity: self.capacity(),
        };
        let Some(len) = page_align(size) else {
            return Err(exhausted);
        };
        let end = match self.used.checked_add(len) {
            Some(end) if end <= self.capacity() => end,
            _ => return Err(exhausted),
        };

        let span = ArenaSpan {
            start: self.used,
            len,
        };
        self.used = end;
        tracing::debug!(
            "I/O space: {:#x} bytes at offset {:#x} ({:#x} requested)",
            len,
            span.start,
            size
        );
        Ok(span)
    }

    pub fn slice(&self, span: ArenaSpan) -> SimResult<&[u8]> {
        self.space
            .get(span.range())
            .ok_or(SimulationError::MemoryViolation(span.start as u64))
    }

    pub fn slice_mut(&mut self, span: ArenaSpan) -> SimResult<&mut [u8]> {
        self.space
            .get_mut(span.range())
            .ok_or(SimulationError::MemoryViolation(span.start as u64))
    }
}
