use super::IoDevice;
use crate::iomap::arena::ArenaSpan;
use crate::iomap::IoSpace;
use crate::{SimResult, SimulationError};

pub const SCREEN_PORT: u64 = 0x100;
pub const SCREEN_MMIO: u64 = 0x4100;
pub const VMEM_BASE: u64 = 0x4_0000;
pub const VMEM_SIZE: usize = 0x8_0000;

pub const SCREEN_W: u32 = 400;
pub const SCREEN_H: u32 = 300;

/// Read-only geometry register: `(width << 16) | height`. Guest writes are undone.
#[derive(Debug)]
struct Geometry {
    value: u32,
}

impl IoDevice for Geometry {
    fn on_access(
        &mut self,
        storage: &mut [u8],
        _offset: u64,
        _len: usize,
        is_write: bool,
    ) -> SimResult<()> {
        if is_write {
            storage[..4].copy_from_slice(&self.value.to_le_bytes());
        }
        Ok(())
    }
}

/// Frame buffer plus geometry register. Nothing is rendered; a frontend reads pixels
/// through [`Screen::pixel`].
#[derive(Debug, Clone, Copy)]
pub struct Screen {
    width: u32,
    height: u32,
    size_reg: ArenaSpan,
    vmem: ArenaSpan,
}

impl Screen {
    /// Allocates the registers and maps them at the standard port and MMIO addresses.
    pub fn install(io: &mut IoSpace, width: u32, height: u32) -> SimResult<Self> {
        if width as usize * height as usize * 4 > VMEM_SIZE || width > 0xffff || height > 0xffff {
            return Err(SimulationError::Device {
                name: "screen".to_string(),
                reason: format!("{}x{} does not fit the frame buffer", width, height),
            });
        }
        let geometry = (width << 16) | height;

        let size_reg = io.allocate(4)?;
        io.storage_mut(size_reg)?[..4].copy_from_slice(&geometry.to_le_bytes());
        io.register_pio(
            "screen",
            SCREEN_PORT,
            size_reg,
            4,
            Some(Box::new(Geometry { value: geometry })),
        )?;
        io.register_mmio(
            "screen",
            SCREEN_MMIO,
            size_reg,
            4,
            Some(Box::new(Geometry { value: geometry })),
        )?;

        let vmem = io.allocate(VMEM_SIZE)?;
        io.register_mmio("vmem", VMEM_BASE, vmem, VMEM_SIZE as u64, None)?;

        Ok(Self {
            width,
            height,
            size_reg,
            vmem,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn geometry(&self, io: &IoSpace) -> SimResult<u32> {
        let bytes = io.storage(self.size_reg)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn framebuffer<'a>(&self, io: &'a IoSpace) -> SimResult<&'a [u8]> {
        let vmem = io.storage(self.vmem)?;
        Ok(&vmem[..(self.width * self.height * 4) as usize])
    }

    /// ARGB8888 pixel at `(x, y)`.
    pub fn pixel(&self, io: &IoSpace, x: u32, y: u32) -> SimResult<u32> {
        if x >= self.width || y >= self.height {
            let at = (y as u64 * self.width as u64 + x as u64) * 4;
            return Err(SimulationError::MemoryViolation(VMEM_BASE.wrapping_add(at)));
        }
        let fb = self.framebuffer(io)?;
        let at = ((y * self.width + x) * 4) as usize;
        Ok(u32::from_le_bytes([fb[at], fb[at + 1], fb[at + 2], fb[at + 3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_visible_on_both_buses() {
        let mut io = IoSpace::new(1 << 20);
        let screen = Screen::install(&mut io, SCREEN_W, SCREEN_H).unwrap();

        let expected = ((SCREEN_W << 16) | SCREEN_H) as u64;
        assert_eq!(io.pio_read(SCREEN_PORT, 4).unwrap(), expected);
        assert_eq!(io.mmio_read(SCREEN_MMIO, 4).unwrap(), expected);
        assert_eq!(io.mmio_read(SCREEN_MMIO + 2, 2).unwrap(), SCREEN_W as u64);
        assert_eq!(screen.geometry(&io).unwrap() as u64, expected);
    }

    #[test]
    fn test_screen_geometry_register_bounds() {
        let mut io = IoSpace::new(1 << 20);
        Screen::install(&mut io, SCREEN_W, SCREEN_H).unwrap();

        assert!(io.mmio_read(SCREEN_MMIO, 4).is_ok());
        assert!(matches!(
            io.mmio_read(SCREEN_MMIO + 3, 8),
            Err(SimulationError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_geometry_is_read_only() {
        let mut io = IoSpace::new(1 << 20);
        Screen::install(&mut io, SCREEN_W, SCREEN_H).unwrap();

        io.mmio_write(SCREEN_MMIO, 4, 0).unwrap();
        assert_eq!(
            io.pio_read(SCREEN_PORT, 4).unwrap(),
            ((SCREEN_W << 16) | SCREEN_H) as u64
        );
    }

    #[test]
    fn test_pixels_through_vmem() {
        let mut io = IoSpace::new(1 << 20);
        let screen = Screen::install(&mut io, SCREEN_W, SCREEN_H).unwrap();

        let (x, y) = (10, 2);
        io.mmio_write(VMEM_BASE + ((y * SCREEN_W + x) * 4) as u64, 4, 0x00ff_8800)
            .unwrap();
        assert_eq!(screen.pixel(&io, x, y).unwrap(), 0x00ff_8800);
        assert_eq!(screen.pixel(&io, 0, 0).unwrap(), 0);
        assert!(screen.pixel(&io, SCREEN_W, 0).is_err());
        assert!(matches!(
            screen.pixel(&io, 0, u32::MAX),
            Err(SimulationError::MemoryViolation(_))
        ));
        assert!(screen.pixel(&io, u32::MAX, u32::MAX).is_err());
        assert_eq!(
            screen.framebuffer(&io).unwrap().len(),
            (SCREEN_W * SCREEN_H * 4) as usize
        );
    }

    #[test]
    fn test_install_needs_room() {
        let mut io = IoSpace::new(0x4000);
        assert!(matches!(
            Screen::install(&mut io, SCREEN_W, SCREEN_H),
            Err(SimulationError::ArenaExhausted { .. })
        ));

        let mut io = IoSpace::new(1 << 20);
        assert!(matches!(
            Screen::install(&mut io, 1024, 768),
            Err(SimulationError::Device { .. })
        ));
    }
}
