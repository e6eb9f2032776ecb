//! The disk surface model: a track is a lazy sequence of flux events, a
//! drive rotates one under a head in simulated real time, and controllers
//! rebuild bit streams from the result.

pub mod controller;
pub mod drive;
pub mod encodings;
pub mod image;
pub mod mfm_controller;
pub mod parser;
pub mod pcm;
pub mod pll;

use clocking::Time;
use core::ops::{Add, AddAssign, Neg};

/// What a drive head can sense as a track rotates past it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    IndexHole,
    FluxTransition,
}

/// A single detectable event, `length` being the fraction of one full
/// rotation elapsed since the previous event. Across one rotation the
/// lengths sum to exactly 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackEvent {
    pub kind: EventKind,
    pub length: Time,
}

/// A surface position with quarter-track precision; copy-protected media
/// genuinely record data between nominal track centres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeadPosition(i32);

impl HeadPosition {
    pub const ZERO: HeadPosition = HeadPosition(0);

    /// A position at a whole track number.
    #[must_use]
    pub fn new(track: i32) -> Self {
        HeadPosition(track * 4)
    }

    #[must_use]
    pub fn from_quarters(quarters: i32) -> Self {
        HeadPosition(quarters)
    }

    /// The whole track number, rounding towards zero.
    #[must_use]
    pub fn as_int(self) -> i32 {
        self.0 >> 2
    }

    #[must_use]
    pub fn as_quarters(self) -> i32 {
        self.0
    }

    #[must_use]
    pub fn max(self, other: HeadPosition) -> HeadPosition {
        HeadPosition(self.0.max(other.0))
    }
}

impl Add for HeadPosition {
    type Output = HeadPosition;
    fn add(self, rhs: HeadPosition) -> HeadPosition {
        HeadPosition(self.0 + rhs.0)
    }
}

impl AddAssign for HeadPosition {
    fn add_assign(&mut self, rhs: HeadPosition) {
        self.0 += rhs.0;
    }
}

impl Neg for HeadPosition {
    type Output = HeadPosition;
    fn neg(self) -> HeadPosition {
        HeadPosition(-self.0)
    }
}

/// Identifies one track's worth of surface: which side, and where the head
/// is positioned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackAddress {
    pub head: u8,
    pub position: HeadPosition,
}

impl TrackAddress {
    #[must_use]
    pub fn new(head: u8, position: HeadPosition) -> Self {
        TrackAddress { head, position }
    }
}

/// One track of recorded media, consumed as a rotating sequence of events.
///
/// Implementations keep a read cursor; `next_event` advances it and wraps
/// at the index hole. `seek_to` jumps the cursor to the latest event
/// boundary at or before the requested rotational offset and reports the
/// exact offset reached.
pub trait Track: Send {
    fn next_event(&mut self) -> TrackEvent;
    fn seek_to(&mut self, time_since_index_hole: Time) -> Time;
    fn clone_track(&self) -> Box<dyn Track>;
}

impl Clone for Box<dyn Track> {
    fn clone(&self) -> Self {
        self.clone_track()
    }
}
