use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use cptsim_config::{CheckpointConfig, CheckpointMode};
use tracing::{debug, info, warn};

use super::compress::{chunk_spans, open_gzip, read_fully, Compressor};
use super::layout::{
    CheckpointLayout, BOOT_FLAGS, CPT_MAGIC_NUMBER, CSR_CPT_ADDR, FLOAT_REG_CPT_ADDR,
    INT_REG_CPT_ADDR, PC_CPT_ADDR,
};
use super::path::PathManager;
use super::simpoint::{SimPoint, SimPointManifest};
use crate::arch::{ArchRegisters, ArchState, NUM_CSRS, NUM_FPRS, NUM_GPRS};
use crate::memory::PhysicalMemory;
use crate::{SimResult, SimulationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Registers sit in memory; the next step must be the memory dump.
    RegsCaptured,
}

#[derive(Debug)]
pub struct Serializer {
    layout: CheckpointLayout,
    state: CaptureState,
    mode: CheckpointMode,
    interval: u64,
    manifest: SimPointManifest,
    paths: Box<dyn PathManager>,
    compressor: Box<dyn Compressor>,
}

impl Serializer {
    /// A serializer that never decides to checkpoint on its own.
    pub fn new(paths: Box<dyn PathManager>, compressor: Box<dyn Compressor>) -> Self {
        Self {
            layout: CheckpointLayout::default(),
            state: CaptureState::Idle,
            mode: CheckpointMode::None,
            interval: 0,
            manifest: SimPointManifest::new(),
            paths,
            compressor,
        }
    }

    /// Switches to SimPoint checkpointing with an already loaded manifest.
    pub fn with_simpoints(mut self, interval: u64, manifest: SimPointManifest) -> SimResult<Self> {
        if interval == 0 {
            return Err(SimulationError::Config(
                "simpoint interval must be greater than zero".to_string(),
            ));
        }
        info!("Taking simpoint checkpoints with interval {}", interval);
        self.mode = CheckpointMode::Simpoint;
        self.interval = interval;
        self.manifest = manifest;
        Ok(self)
    }

    pub fn from_config(
        config: &CheckpointConfig,
        paths: Box<dyn PathManager>,
        compressor: Box<dyn Compressor>,
    ) -> SimResult<Self> {
        let serializer = Self::new(paths, compressor);
        match config.mode {
            CheckpointMode::None => Ok(serializer),
            CheckpointMode::Simpoint => {
                let dir = serializer.paths.simpoint_dir();
                info!("Loading simpoints from {:?}", dir);
                let manifest = SimPointManifest::load(&dir)?;
                serializer.with_simpoints(config.interval, manifest)
            }
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn layout(&self) -> &CheckpointLayout {
        &self.layout
    }

    pub fn manifest(&self) -> &SimPointManifest {
        &self.manifest
    }

    pub fn paths(&self) -> &dyn PathManager {
        self.paths.as_ref()
    }

    /// Copies the register file, PC and CSRs into their checkpoint slots. The magic flag
    /// is cleared first and written last, so only a complete capture carries it.
    pub fn capture_registers(
        &mut self,
        arch: &dyn ArchRegisters,
        pmem: &mut PhysicalMemory,
    ) -> SimResult<()> {
        let layout = self.layout;
        layout.check_fits(pmem.len())?;

        pmem.write_u64(layout.flag, 0)?;

        let gprs: Vec<u64> = (0..NUM_GPRS).map(|i| arch.gpr(i)).collect();
        pmem.write_u64_array(layout.int_regs, &gprs)?;
        info!(
            "Writing int registers to checkpoint memory @[{:#x}, {:#x}) [{:#x}, {:#x})",
            INT_REG_CPT_ADDR,
            INT_REG_CPT_ADDR + (NUM_GPRS * 8) as u64,
            layout.int_regs,
            layout.int_regs + NUM_GPRS * 8
        );

        let fprs: Vec<u64> = (0..NUM_FPRS).map(|i| arch.fpr(i)).collect();
        pmem.write_u64_array(layout.float_regs, &fprs)?;
        info!(
            "Writing float registers to checkpoint memory @[{:#x}, {:#x}) [{:#x}, {:#x})",
            FLOAT_REG_CPT_ADDR,
            FLOAT_REG_CPT_ADDR + (NUM_FPRS * 8) as u64,
            layout.float_regs,
            layout.float_regs + NUM_FPRS * 8
        );

        pmem.write_u64(layout.pc, arch.pc())?;
        info!("Writing PC: {:#x} at addr {:#x}", arch.pc(), PC_CPT_ADDR);

        let csrs: Vec<u64> = (0..NUM_CSRS).map(|i| arch.csr(i)).collect();
        pmem.write_u64_array(layout.csrs, &csrs)?;
        info!(
            "Writing CSR to checkpoint memory @[{:#x}, {:#x}) [{:#x}, {:#x})",
            CSR_CPT_ADDR,
            CSR_CPT_ADDR + (NUM_CSRS * 8) as u64,
            layout.csrs,
            layout.csrs + NUM_CSRS * 8
        );

        pmem.write_u64(layout.flag, CPT_MAGIC_NUMBER)?;
        info!(
            "Touching Flag: {:#x} at addr {:#x}",
            CPT_MAGIC_NUMBER, BOOT_FLAGS
        );

        self.state = CaptureState::RegsCaptured;
        Ok(())
    }

    /// Streams the whole memory image into a compressed file named after the pending
    /// SimPoint's weight. Registers must have been captured first.
    pub fn dump_memory(&mut self, pmem: &PhysicalMemory) -> SimResult<PathBuf> {
        if self.state != CaptureState::RegsCaptured {
            return Err(SimulationError::CheckpointOrder);
        }
        let point = self
            .manifest
            .earliest()
            .copied()
            .ok_or(SimulationError::ManifestEmpty)?;

        let prefix = self
            .paths
            .output_path()
            .map_err(|source| SimulationError::Io {
                path: self.paths.checkpoint_dir(),
                source,
            })?;
        let path = checkpoint_file_name(&prefix, &point);

        let mut sink = self
            .compressor
            .create(&path)
            .map_err(|source| SimulationError::CheckpointOpen {
                path: path.clone(),
                source,
            })?;
        info!("Opening {:?} as checkpoint output file", path);

        let image = pmem.as_slice();
        for span in chunk_spans(image.len() as u64) {
            let chunk = &image[span.start as usize..span.end as usize];
            let written = sink
                .write_chunk(chunk)
                .map_err(|source| SimulationError::Io {
                    path: path.clone(),
                    source,
                })?;
            if written != chunk.len() {
                return Err(SimulationError::ShortWrite {
                    written,
                    requested: chunk.len(),
                });
            }
            debug!("Written {:#x} bytes", written);
        }

        sink.close()
            .map_err(|source| SimulationError::CheckpointClose {
                path: path.clone(),
                source,
            })?;

        info!("Checkpoint done!");
        self.state = CaptureState::Idle;
        Ok(path)
    }

    /// Captures registers, dumps memory and retires the SimPoint just serviced.
    pub fn take_checkpoint(
        &mut self,
        arch: &dyn ArchRegisters,
        pmem: &mut PhysicalMemory,
    ) -> SimResult<PathBuf> {
        self.capture_registers(arch, pmem)?;
        let path = self.dump_memory(pmem)?;

        self.manifest.pop_earliest();
        if !self.manifest.is_empty() {
            self.paths.advance();
        }
        Ok(path)
    }

    /// Loads a raw image into memory at the restore origin. A file larger than the space
    /// left between the origin and the end of memory is truncated.
    pub fn restore(&self, source: &Path, pmem: &mut PhysicalMemory) -> SimResult<usize> {
        let mut file = File::open(source).map_err(|e| SimulationError::CheckpointOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        info!("Opening restorer file: {:?}", source);

        let size = file
            .metadata()
            .map_err(|e| SimulationError::Io {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();

        let origin = self.layout.restorer_start;
        let available = pmem.len().saturating_sub(origin);
        let len = if size > available as u64 {
            warn!(
                "Cpt size = {:#x} is too large, only load {:#x}",
                size, available
            );
            available
        } else {
            size as usize
        };

        let dst = pmem.slice_mut(origin, len)?;
        let read = read_fully(&mut file, dst).map_err(|e| SimulationError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        if read != len {
            return Err(SimulationError::ShortRead {
                read,
                requested: len,
            });
        }
        Ok(len)
    }

    /// Inverse of [`Self::dump_memory`]: decompresses a checkpoint over the whole memory
    /// image and decodes the captured registers.
    pub fn load_checkpoint(&self, source: &Path, pmem: &mut PhysicalMemory) -> SimResult<ArchState> {
        let mut decoder = open_gzip(source).map_err(|e| SimulationError::CheckpointOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        info!("Loading checkpoint {:?}", source);

        let requested = pmem.len();
        let read = read_fully(&mut decoder, pmem.as_mut_slice()).map_err(|e| {
            SimulationError::Io {
                path: source.to_path_buf(),
                source: e,
            }
        })?;
        if read != requested {
            return Err(SimulationError::ShortRead { read, requested });
        }
        let mut extra = [0u8; 1];
        let trailing = read_fully(&mut decoder, &mut extra).map_err(|e| SimulationError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        if trailing != 0 {
            return Err(SimulationError::InvalidCheckpoint(format!(
                "{:?} holds more than the {:#x} bytes of simulated memory",
                source, requested
            )));
        }

        extract_registers(&self.layout, pmem)
    }

    /// True exactly when `insts` equals the next SimPoint's trigger count. Must be polled
    /// on every instruction boundary.
    pub fn should_checkpoint_now(&self, insts: u64) -> bool {
        if self.mode != CheckpointMode::Simpoint || self.interval == 0 {
            return false;
        }
        let Some(point) = self.manifest.earliest() else {
            return false;
        };
        let Some(next_point) = point.trigger(self.interval) else {
            return false;
        };

        if insts == next_point {
            info!("Should take cpt now: {}", insts);
            return true;
        }
        if insts % self.interval == 0 {
            debug!("First cpt @ {}, now: {}", next_point, insts);
        }
        false
    }
}

/// `{prefix}_{weight}_.gz`, weight printed with six decimals.
pub fn checkpoint_file_name(prefix: &Path, point: &SimPoint) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(format!("_{:.6}_.gz", point.weight));
    PathBuf::from(name)
}

/// Decodes the register slots of a memory image produced by
/// [`Serializer::capture_registers`].
pub fn extract_registers(layout: &CheckpointLayout, pmem: &PhysicalMemory) -> SimResult<ArchState> {
    layout.check_fits(pmem.len())?;

    let flag = pmem.read_u64(layout.flag)?;
    if flag != CPT_MAGIC_NUMBER {
        return Err(SimulationError::InvalidCheckpoint(format!(
            "magic flag is {:#x}, expected {:#x}",
            flag, CPT_MAGIC_NUMBER
        )));
    }

    let mut state = ArchState::new();
    pmem.read_u64_array(layout.int_regs, &mut state.gpr)?;
    pmem.read_u64_array(layout.float_regs, &mut state.fpr)?;
    pmem.read_u64_array(layout.csrs, &mut state.csr)?;
    state.pc = pmem.read_u64(layout.pc)?;
    Ok(state)
}
