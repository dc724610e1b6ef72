pub mod screen;

use crate::SimResult;

/// Side effects of a memory-mapped or port-mapped device.
///
/// `storage` is the region's backing block. For reads the hook runs before the value is
/// loaded, so the device can prepare it; for writes it runs after the value has landed.
pub trait IoDevice: std::fmt::Debug {
    fn on_access(
        &mut self,
        storage: &mut [u8],
        offset: u64,
        len: usize,
        is_write: bool,
    ) -> SimResult<()>;
}
