pub mod arch;
pub mod checkpoint;
pub mod devices;
pub mod difftest;
pub mod iomap;
pub mod memory;

use std::path::PathBuf;

use anyhow::Context;
use cptsim_config::SimConfig;

use crate::arch::ArchRegisters;
use crate::checkpoint::compress::GzipCompressor;
use crate::checkpoint::path::DirPathManager;
use crate::checkpoint::serializer::Serializer;
use crate::iomap::IoSpace;
use crate::memory::PhysicalMemory;


/// Every variant is unrecoverable: simulated state is either exact or worthless, so the
/// driver is expected to abort once one of these reaches it.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Physical memory of {actual:#x} bytes cannot hold a checkpoint image of {required:#x} bytes")]
    ImageTooSmall { required: usize, actual: usize },
    #[error("Memory dump requested before registers were captured")]
    CheckpointOrder,
    #[error("No pending SimPoint left to name the checkpoint after")]
    ManifestEmpty,
    #[error("Can't open physical memory checkpoint file {path:?}: {source}")]
    CheckpointOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Write failed on physical memory checkpoint file: {written:#x} of {requested:#x} bytes")]
    ShortWrite { written: usize, requested: usize },
    #[error("Close failed on physical memory checkpoint file {path:?}: {source}")]
    CheckpointClose {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Short read on checkpoint image: {read:#x} of {requested:#x} bytes")]
    ShortRead { read: usize, requested: usize },
    #[error("Invalid checkpoint image: {0}")]
    InvalidCheckpoint(String),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed SimPoint manifest: {0}")]
    Manifest(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid I/O access width {0} (expected 1..=8)")]
    InvalidAccessWidth(usize),
    #[error("No I/O region mapped for address {0:#x}")]
    NullRegion(u64),
    #[error("Address {addr:#x} is out of bound {{{name}}} [{low:#x}, {high:#x}]")]
    OutOfBounds {
        addr: u64,
        name: String,
        low: u64,
        high: u64,
    },
    #[error("Invalid I/O region {name}: {reason}")]
    InvalidRegion { name: String, reason: String },
    #[error("I/O region {name} overlaps already registered region {other}")]
    RegionOverlap { name: String, other: String },
    #[error("I/O space exhausted: {requested:#x} bytes requested, {used:#x} of {capacity:#x} used")]
    ArenaExhausted {
        requested: usize,
        used: usize,
        capacity: usize,
    },
    #[error("Device {name} failed: {reason}")]
    Device { name: String, reason: String },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Everything the execution loop needs from this crate, built once at startup and
/// handed around by reference.
#[derive(Debug)]
pub struct SimContext {
    pub pmem: PhysicalMemory,
    pub io: IoSpace,
    pub serializer: Serializer,
}

impl SimContext {
    pub fn from_config(config: &SimConfig) -> anyhow::Result<Self> {
        let pmem_size = usize::try_from(config.pmem_size()?)
            .context("Physical memory size does not fit the host address space")?;
        let io_size = usize::try_from(config.io_space_size()?)
            .context("I/O space size does not fit the host address space")?;

        let paths = DirPathManager::from_config(&config.checkpoint);
        let compressor = GzipCompressor::new(config.checkpoint.compression_level);
        let serializer =
            Serializer::from_config(&config.checkpoint, Box::new(paths), Box::new(compressor))
                .context("Failed to initialise checkpoint serializer")?;

        tracing::info!(
            "Physical memory: {:#x} bytes at {:#x}, I/O space: {:#x} bytes",
            pmem_size,
            config.memory.base,
            io_size
        );

        Ok(Self {
            pmem: PhysicalMemory::new(pmem_size, config.memory.base),
            io: IoSpace::new(io_size),
            serializer,
        })
    }

    /// Called by the execution loop on every instruction boundary. Takes a checkpoint
    /// when the instruction count hits the next SimPoint exactly.
    pub fn on_instruction(
        &mut self,
        insts: u64,
        arch: &dyn ArchRegisters,
    ) -> SimResult<Option<PathBuf>> {
        if !self.serializer.should_checkpoint_now(insts) {
            return Ok(None);
        }
        let path = self.serializer.take_checkpoint(arch, &mut self.pmem)?;
        Ok(Some(path))
    }
}
