//! The conventions binding a host machine to the core: the uniform bus
//! component surface, the opaque per-family CPU entry points, and ROM
//! requests.

pub mod component;
pub mod cpu;
pub mod roms;

pub use component::BusComponent;
pub use cpu::{Bus16, Bus68000, BusOperation, Processor6502, Processor68000, ProcessorZ80};
pub use roms::{MissingRoms, RomRequest};
