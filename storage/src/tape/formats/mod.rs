//! Tape image formats, each decoded into the shared pulse stream.

pub mod cas;
pub mod csw;
pub mod oric_tap;
pub mod prg;
pub mod uef;
pub mod zx80_o81p;
