//! SimPoint-driven checkpointing of the simulated machine.
//!
//! Registers are captured into fixed slots of physical memory ([`layout`]), then the
//! whole memory image is streamed through a [`compress::Compressor`]. The
//! [`simpoint::SimPointManifest`] decides at which instruction counts that happens.

pub mod compress;
pub mod layout;
pub mod path;
pub mod serializer;
pub mod simpoint;
