//! Device address spaces: an arena for register storage plus bounds-checked dispatch
//! tables for memory-mapped and port-mapped regions.

pub mod arena;
pub mod region;

use arena::{ArenaSpan, IoSpaceArena};
use region::{DiffTestExempt, IoRegion, RegionId, RegionMap};

use crate::devices::IoDevice;
use crate::difftest::{DiffTest, NoDiffTest};
use crate::{SimResult, SimulationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Mmio,
    Pio,
}

#[derive(Debug)]
pub struct IoSpace {
    arena: IoSpaceArena,
    mmio: RegionMap,
    pio: RegionMap,
    difftest: Box<dyn DiffTest>,
}

impl IoSpace {
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: IoSpaceArena::new(capacity),
            mmio: RegionMap::new("mmio"),
            pio: RegionMap::new("pio"),
            difftest: Box::new(NoDiffTest),
        }
    }

    pub fn set_difftest(&mut self, difftest: Box<dyn DiffTest>) {
        self.difftest = difftest;
    }

    pub fn arena(&self) -> &IoSpaceArena {
        &self.arena
    }

    pub fn allocate(&mut self, size: usize) -> SimResult<ArenaSpan> {
        self.arena.allocate(size)
    }

    pub fn storage(&self, span: ArenaSpan) -> SimResult<&[u8]> {
        self.arena.slice(span)
    }

    pub fn storage_mut(&mut self, span: ArenaSpan) -> SimResult<&mut [u8]> {
        self.arena.slice_mut(span)
    }

    pub fn map(&self, space: AddressSpace) -> &RegionMap {
        match space {
            AddressSpace::Mmio => &self.mmio,
            AddressSpace::Pio => &self.pio,
        }
    }

    pub fn region(&self, space: AddressSpace, id: RegionId) -> Option<&IoRegion> {
        self.map(space).get(id)
    }

    /// Regions must not overlap within one address space; a clash is an error.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        space: AddressSpace,
        name: &str,
        base: u64,
        storage: ArenaSpan,
        size: u64,
        device: Option<Box<dyn IoDevice>>,
        exempt: DiffTestExempt,
    ) -> SimResult<RegionId> {
        let map = match space {
            AddressSpace::Mmio => &mut self.mmio,
            AddressSpace::Pio => &mut self.pio,
        };
        map.register(name, base, size, storage, device, exempt)
    }

    pub fn register_mmio(
        &mut self,
        name: &str,
        base: u64,
        storage: ArenaSpan,
        size: u64,
        device: Option<Box<dyn IoDevice>>,
    ) -> SimResult<RegionId> {
        self.register(
            AddressSpace::Mmio,
            name,
            base,
            storage,
            size,
            device,
            DiffTestExempt::empty(),
        )
    }

    pub fn register_pio(
        &mut self,
        name: &str,
        base: u64,
        storage: ArenaSpan,
        size: u64,
        device: Option<Box<dyn IoDevice>>,
    ) -> SimResult<RegionId> {
        self.register(
            AddressSpace::Pio,
            name,
            base,
            storage,
            size,
            device,
            DiffTestExempt::empty(),
        )
    }

    /// Lets the device prepare data, then loads `len` little-endian bytes.
    pub fn read(
        &mut self,
        space: AddressSpace,
        addr: u64,
        len: usize,
        region: Option<RegionId>,
    ) -> SimResult<u64> {
        check_width(len)?;
        let Self {
            arena,
            mmio,
            pio,
            difftest,
        } = self;
        let map = match space {
            AddressSpace::Mmio => mmio,
            AddressSpace::Pio => pio,
        };
        let region = map
            .lookup_mut(region)
            .ok_or(SimulationError::NullRegion(addr))?;
        let offset = region.check_bound(addr, len)?;

        if !region.exempt().contains(DiffTestExempt::READ) {
            difftest.skip_ref();
        }

        let storage = arena.slice_mut(region.storage())?;
        if let Some(device) = region.device.as_mut() {
            device.on_access(storage, offset as u64, len, false)?;
        }
        Ok(load_le(&storage[offset..offset + len]))
    }

    /// Stores `len` little-endian bytes of `value`, then notifies the device.
    pub fn write(
        &mut self,
        space: AddressSpace,
        addr: u64,
        len: usize,
        value: u64,
        region: Option<RegionId>,
    ) -> SimResult<()> {
        check_width(len)?;
        let Self {
            arena,
            mmio,
            pio,
            difftest,
        } = self;
        let map = match space {
            AddressSpace::Mmio => mmio,
            AddressSpace::Pio => pio,
        };
        let region = map
            .lookup_mut(region)
            .ok_or(SimulationError::NullRegion(addr))?;
        let offset = region.check_bound(addr, len)?;

        if !region.exempt().contains(DiffTestExempt::WRITE) {
            difftest.skip_ref();
        }

        let storage = arena.slice_mut(region.storage())?;
        store_le(&mut storage[offset..offset + len], value);
        if let Some(device) = region.device.as_mut() {
            device.on_access(storage, offset as u64, len, true)?;
        }
        Ok(())
    }

    pub fn mmio_read(&mut self, addr: u64, len: usize) -> SimResult<u64> {
        let region = self.mmio.find(addr);
        self.read(AddressSpace::Mmio, addr, len, region)
    }

    pub fn mmio_write(&mut self, addr: u64, len: usize, value: u64) -> SimResult<()> {
        let region = self.mmio.find(addr);
        self.write(AddressSpace::Mmio, addr, len, value, region)
    }

    pub fn pio_read(&mut self, addr: u64, len: usize) -> SimResult<u64> {
        let region = self.pio.find(addr);
        self.read(AddressSpace::Pio, addr, len, region)
    }

    pub fn pio_write(&mut self, addr: u64, len: usize, value: u64) -> SimResult<()> {
        let region = self.pio.find(addr);
        self.write(AddressSpace::Pio, addr, len, value, region)
    }
}

fn check_width(len: usize) -> SimResult<()> {
    if (1..=8).contains(&len) {
        Ok(())
    } else {
        Err(SimulationError::InvalidAccessWidth(len))
    }
}

fn load_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn store_le(bytes: &mut [u8], value: u64) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (value >> (8 * i)) as u8;
    }
}
