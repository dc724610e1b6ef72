use std::cell::Cell;
use std::rc::Rc;

/// Hook into the differential-testing reference model.
pub trait DiffTest: std::fmt::Debug {
    /// The next reference check must be skipped: a device, not the architectural model,
    /// produced the value.
    fn skip_ref(&mut self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiffTest;

impl DiffTest for NoDiffTest {
    fn skip_ref(&mut self) {}
}

/// Counts skip requests; clones share the count.
#[derive(Debug, Default, Clone)]
pub struct SkipCounter(Rc<Cell<u64>>);

impl SkipCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.0.get()
    }
}

impl DiffTest for SkipCounter {
    fn skip_ref(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}
