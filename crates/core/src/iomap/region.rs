use bitflags::bitflags;

use super::arena::ArenaSpan;
use crate::devices::IoDevice;
use crate::{SimResult, SimulationError};

bitflags! {
    /// Access directions for which a region does not ask the reference model to skip
    /// its check.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DiffTestExempt: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(usize);

impl RegionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One device window `[low, high]` in an address space.
#[derive(Debug)]
pub struct IoRegion {
    name: String,
    low: u64,
    high: u64,
    storage: ArenaSpan,
    pub(crate) device: Option<Box<dyn IoDevice>>,
    exempt: DiffTestExempt,
}

impl IoRegion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    /// Inclusive upper bound.
    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn storage(&self) -> ArenaSpan {
        self.storage
    }

    pub fn exempt(&self) -> DiffTestExempt {
        self.exempt
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.low && addr <= self.high
    }

    fn overlaps(&self, low: u64, high: u64) -> bool {
        low <= self.high && self.low <= high
    }

    /// Offset of a `len`-byte access at `addr`, or `OutOfBounds` if it does not fit.
    pub fn check_bound(&self, addr: u64, len: usize) -> SimResult<usize> {
        let out_of_bounds = || SimulationError::OutOfBounds {
            addr,
            name: self.name.clone(),
            low: self.low,
            high: self.high,
        };
        if !self.contains(addr) {
            return Err(out_of_bounds());
        }
        let last = addr.checked_add(len.saturating_sub(1) as u64);
        if !matches!(last, Some(last) if last <= self.high) {
            return Err(out_of_bounds());
        }
        let offset = (addr - self.low) as usize;
        if offset + len > self.storage.len() {
            return Err(out_of_bounds());
        }
        Ok(offset)
    }
}

/// Regions of one address space (memory-mapped or port-mapped).
#[derive(Debug)]
pub struct RegionMap {
    kind: &'static str,
    regions: Vec<IoRegion>,
}

impl RegionMap {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            regions: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        low: u64,
        size: u64,
        storage: ArenaSpan,
        device: Option<Box<dyn IoDevice>>,
        exempt: DiffTestExempt,
    ) -> SimResult<RegionId> {
        let invalid = |reason: String| SimulationError::InvalidRegion {
            name: name.to_string(),
            reason,
        };
        if size == 0 {
            return Err(invalid("size must be greater than zero".to_string()));
        }
        let high = low
            .checked_add(size - 1)
            .ok_or_else(|| invalid(format!("{:#x} + {:#x} overflows", low, size)))?;
        if (storage.len() as u64) < size {
            return Err(invalid(format!(
                "backing storage of {:#x} bytes is smaller than the region ({:#x})",
                storage.len(),
                size
            )));
        }
        if let Some(other) = self.regions.iter().find(|r| r.overlaps(low, high)) {
            return Err(SimulationError::RegionOverlap {
                name: name.to_string(),
                other: other.name.clone(),
            });
        }

        tracing::info!(
            "Add {} map '{}' at [{:#x}, {:#x}]",
            self.kind,
            name,
            low,
            high
        );
        self.regions.push(IoRegion {
            name: name.to_string(),
            low,
            high,
            storage,
            device,
            exempt,
        });
        Ok(RegionId(self.regions.len() - 1))
    }

    pub fn find(&self, addr: u64) -> Option<RegionId> {
        self.regions
            .iter()
            .position(|r| r.contains(addr))
            .map(RegionId)
    }

    pub fn get(&self, id: RegionId) -> Option<&IoRegion> {
        self.regions.get(id.0)
    }

    pub(crate) fn lookup_mut(&mut self, id: Option<RegionId>) -> Option<&mut IoRegion> {
        self.regions.get_mut(id?.0)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IoRegion> {
        self.regions.iter()
    }
}
