use crate::{SimResult, SimulationError};

/// Simulated physical RAM: a flat, fixed-size byte buffer mapped at `base_addr`.
pub struct PhysicalMemory {
    data: Vec<u8>,
    base_addr: u64,
}

impl std::fmt::Debug for PhysicalMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalMemory")
            .field("size", &self.data.len())
            .field("base_addr", &format_args!("{:#x}", self.base_addr))
            .finish()
    }
}

impl PhysicalMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    /// Wraps an existing image, e.g. a decompressed checkpoint.
    pub fn from_bytes(data: Vec<u8>, base_addr: u64) -> Self {
        Self { data, base_addr }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn base_addr(&self) -> u64 {
        self.base_addr
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_addr && addr - self.base_addr < self.data.len() as u64
    }

    /// Translates a guest physical address into an offset inside the buffer.
    pub fn guest_to_host(&self, addr: u64) -> SimResult<usize> {
        if self.contains(addr) {
            Ok((addr - self.base_addr) as usize)
        } else {
            Err(SimulationError::MemoryViolation(addr))
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> SimResult<&[u8]> {
        let fault = SimulationError::MemoryViolation(self.host_to_guest(offset));
        let Some(end) = offset.checked_add(len) else {
            return Err(fault);
        };
        self.data.get(offset..end).ok_or(fault)
    }

    pub fn slice_mut(&mut self, offset: usize, len: usize) -> SimResult<&mut [u8]> {
        let fault = SimulationError::MemoryViolation(self.host_to_guest(offset));
        let Some(end) = offset.checked_add(len) else {
            return Err(fault);
        };
        self.data.get_mut(offset..end).ok_or(fault)
    }

    pub fn read_u64(&self, offset: usize) -> SimResult<u64> {
        let bytes = self.slice(offset, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) -> SimResult<()> {
        self.slice_mut(offset, 8)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Fills `values.len()` consecutive little-endian doublewords starting at `offset`.
    pub fn write_u64_array(&mut self, offset: usize, values: &[u64]) -> SimResult<()> {
        let dst = self.slice_mut(offset, values.len() * 8)?;
        for (chunk, value) in dst.chunks_exact_mut(8).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    pub fn read_u64_array(&self, offset: usize, out: &mut [u64]) -> SimResult<()> {
        let src = self.slice(offset, out.len() * 8)?;
        for (chunk, value) in src.chunks_exact(8).zip(out.iter_mut()) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *value = u64::from_le_bytes(buf);
        }
        Ok(())
    }

    fn host_to_guest(&self, offset: usize) -> u64 {
        self.base_addr.wrapping_add(offset as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_to_host() {
        let mem = PhysicalMemory::new(0x1000, 0x8000_0000);
        assert_eq!(mem.guest_to_host(0x8000_0000).unwrap(), 0);
        assert_eq!(mem.guest_to_host(0x8000_0fff).unwrap(), 0xfff);
        assert!(matches!(
            mem.guest_to_host(0x8000_1000),
            Err(SimulationError::MemoryViolation(0x8000_1000))
        ));
        assert!(mem.guest_to_host(0x7fff_ffff).is_err());
    }

    #[test]
    fn test_u64_little_endian() {
        let mut mem = PhysicalMemory::new(16, 0);
        mem.write_u64(8, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(mem.as_slice()[8], 0x08);
        assert_eq!(mem.as_slice()[15], 0x01);
        assert_eq!(mem.read_u64(8).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_u64_past_end_rejected() {
        let mut mem = PhysicalMemory::new(16, 0x100);
        assert!(mem.write_u64(9, 1).is_err());
        assert!(mem.read_u64(12).is_err());
        assert!(mem.slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_array_roundtrip() {
        let mut mem = PhysicalMemory::new(64, 0);
        mem.write_u64_array(16, &[1, 2, 3]).unwrap();
        let mut out = [0u64; 3];
        mem.read_u64_array(16, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
        assert!(mem.write_u64_array(48, &[1, 2, 3]).is_err());
    }
}
