//! Tapes as lazy pulse streams, a clocked player to feed them into a
//! machine, and the state machines that turn pulses back into bytes.

pub mod formats;
pub mod parsers;
pub mod player;

use clocking::Time;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PulseKind {
    High,
    Low,
    /// Unrecorded tape: no signal either way.
    Zero,
}

/// One pulse: a single polarity held for a rational duration in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    pub kind: PulseKind,
    pub length: Time,
}

impl Pulse {
    #[must_use]
    pub fn new(kind: PulseKind, length: Time) -> Self {
        Pulse { kind, length }
    }
}

/// A tape is an ordered, rewindable sequence of pulses.
pub trait Tape {
    fn next_pulse(&mut self) -> Pulse;
    fn at_end(&self) -> bool;
    fn reset(&mut self);
}
