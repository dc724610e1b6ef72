use std::ops::Range;

use crate::arch::{NUM_CSRS, NUM_FPRS, NUM_GPRS};
use crate::{SimResult, SimulationError};

// Guest addresses agreed with the restorer ROM that boots from a checkpoint.
pub const BOOT_CODE: u64 = 0x8000_0000;
pub const BOOT_FLAGS: u64 = 0x8000_0F00;
pub const INT_REG_CPT_ADDR: u64 = 0x8000_1000;
pub const FLOAT_REG_CPT_ADDR: u64 = 0x8000_1100;
pub const PC_CPT_ADDR: u64 = 0x8000_1200;
pub const CSR_CPT_ADDR: u64 = 0x8000_1300;
pub const RESTORER_START: u64 = BOOT_CODE;

pub const CPT_MAGIC_NUMBER: u64 = 0xdead_beef;

/// Host offsets (relative to the start of physical memory) of every fixed slot in a
/// checkpoint image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointLayout {
    pub int_regs: usize,
    pub float_regs: usize,
    pub pc: usize,
    pub csrs: usize,
    pub flag: usize,
    pub restorer_start: usize,
}

impl Default for CheckpointLayout {
    fn default() -> Self {
        Self {
            int_regs: (INT_REG_CPT_ADDR - BOOT_CODE) as usize,
            float_regs: (FLOAT_REG_CPT_ADDR - BOOT_CODE) as usize,
            pc: (PC_CPT_ADDR - BOOT_CODE) as usize,
            csrs: (CSR_CPT_ADDR - BOOT_CODE) as usize,
            flag: (BOOT_FLAGS - BOOT_CODE) as usize,
            restorer_start: (RESTORER_START - BOOT_CODE) as usize,
        }
    }
}

impl CheckpointLayout {
    pub fn regions(&self) -> [(&'static str, Range<usize>); 5] {
        [
            ("int_regs", self.int_regs..self.int_regs + NUM_GPRS * 8),
            ("float_regs", self.float_regs..self.float_regs + NUM_FPRS * 8),
            ("pc", self.pc..self.pc + 8),
            ("csrs", self.csrs..self.csrs + NUM_CSRS * 8),
            ("flag", self.flag..self.flag + 8),
        ]
    }

    /// Smallest memory size able to hold every slot.
    pub fn end(&self) -> usize {
        self.regions()
            .iter()
            .map(|(_, range)| range.end)
            .max()
            .unwrap_or(0)
    }

    pub fn check_fits(&self, pmem_len: usize) -> SimResult<()> {
        if pmem_len < self.end() {
            return Err(SimulationError::ImageTooSmall {
                required: self.end(),
                actual: pmem_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_do_not_overlap() {
        let regions = CheckpointLayout::default().regions();
        for (i, (name_a, a)) in regions.iter().enumerate() {
            for (name_b, b) in regions.iter().skip(i + 1) {
                assert!(
                    a.end <= b.start || b.end <= a.start,
                    "{} {:?} overlaps {} {:?}",
                    name_a,
                    a,
                    name_b,
                    b
                );
            }
        }
    }

    #[test]
    fn test_default_offsets() {
        let layout = CheckpointLayout::default();
        assert_eq!(layout.flag, 0xf00);
        assert_eq!(layout.int_regs, 0x1000);
        assert_eq!(layout.float_regs, 0x1100);
        assert_eq!(layout.pc, 0x1200);
        assert_eq!(layout.csrs, 0x1300);
        assert_eq!(layout.restorer_start, 0);
        assert_eq!(layout.end(), 0x9300);
    }

    #[test]
    fn test_check_fits() {
        let layout = CheckpointLayout::default();
        assert!(layout.check_fits(0x9300).is_ok());
        assert!(matches!(
            layout.check_fits(0x92ff),
            Err(SimulationError::ImageTooSmall {
                required: 0x9300,
                actual: 0x92ff
            })
        ));
    }
}
