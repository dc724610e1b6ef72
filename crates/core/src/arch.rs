use serde::{Deserialize, Serialize};

pub const NUM_GPRS: usize = 32;
pub const NUM_FPRS: usize = 32;
pub const NUM_CSRS: usize = 4096;

/// Trait through which the CPU model exposes its architectural state.
pub trait ArchRegisters {
    fn gpr(&self, idx: usize) -> u64;
    fn fpr(&self, idx: usize) -> u64;
    fn csr(&self, addr: usize) -> u64;
    fn pc(&self) -> u64;
}

/// Owned copy of a RV64 hart's architectural registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchState {
    pub gpr: [u64; NUM_GPRS],
    pub fpr: [u64; NUM_FPRS],
    pub csr: Vec<u64>,
    pub pc: u64,
}

impl Default for ArchState {
    fn default() -> Self {
        Self {
            gpr: [0; NUM_GPRS],
            fpr: [0; NUM_FPRS],
            csr: vec![0; NUM_CSRS],
            pc: 0,
        }
    }
}

impl ArchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(regs: &dyn ArchRegisters) -> Self {
        let mut state = Self::new();
        for i in 0..NUM_GPRS {
            state.gpr[i] = regs.gpr(i);
        }
        for i in 0..NUM_FPRS {
            state.fpr[i] = regs.fpr(i);
        }
        for (addr, csr) in state.csr.iter_mut().enumerate() {
            *csr = regs.csr(addr);
        }
        state.pc = regs.pc();
        state
    }
}

impl ArchRegisters for ArchState {
    fn gpr(&self, idx: usize) -> u64 {
        // x0 is hardwired to zero
        if idx == 0 {
            0
        } else {
            self.gpr[idx]
        }
    }

    fn fpr(&self, idx: usize) -> u64 {
        self.fpr[idx]
    }

    fn csr(&self, addr: usize) -> u64 {
        self.csr.get(addr).copied().unwrap_or(0)
    }

    fn pc(&self) -> u64 {
        self.pc
    }
}
