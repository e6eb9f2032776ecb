//! Storage-media simulation: disks modelled down to individual flux
//! transitions, tapes modelled as pulse streams, and the decoder state
//! machines that turn both back into bytes.

pub mod disk;
pub mod tape;

use thiserror::Error;

/// The failure taxonomy for media constructors. Steady-state simulation
/// never fails; only opening and parsing a file can.
#[derive(Debug, Error)]
pub enum Error {
    /// The file failed a magic-number or structural check.
    #[error("file is not in the expected format")]
    InvalidFormat,

    /// The file is recognised but uses a version this implementation
    /// doesn't speak.
    #[error("file is in an unknown version of its format")]
    UnknownVersion,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
