//! Bit-packed track storage. A `PCMSegment` is a run of bits at a fixed
//! cell length; a `PCMTrack` strings segments of possibly differing cell
//! lengths into one rotation, normalising them onto a common clock lazily.

use super::{EventKind, Track, TrackEvent};
use clocking::Time;

/// A contiguous run of bit cells, MSB first within each byte: bit `i` lives
/// at `data[i >> 3] >> (7 - (i & 7))`.
#[derive(Clone, Debug, PartialEq)]
pub struct PCMSegment {
    pub data: Vec<u8>,
    pub number_of_bits: u32,
    pub length_of_a_bit: Time,
}

impl PCMSegment {
    #[must_use]
    pub fn new(length_of_a_bit: Time) -> Self {
        PCMSegment {
            data: Vec::new(),
            number_of_bits: 0,
            length_of_a_bit,
        }
    }

    /// Wraps `data` as a segment of `data.len() * 8` bits.
    #[must_use]
    pub fn from_data(data: Vec<u8>, length_of_a_bit: Time) -> Self {
        let number_of_bits = (data.len() * 8) as u32;
        PCMSegment {
            data,
            number_of_bits,
            length_of_a_bit,
        }
    }

    #[must_use]
    pub fn bit(&self, index: u32) -> bool {
        debug_assert!(index < self.number_of_bits);
        (self.data[(index >> 3) as usize] >> (7 - (index & 7))) & 1 != 0
    }

    pub fn set_bit(&mut self, index: u32, value: bool) {
        debug_assert!(index < self.number_of_bits);
        let mask = 0x80 >> (index & 7);
        if value {
            self.data[(index >> 3) as usize] |= mask;
        } else {
            self.data[(index >> 3) as usize] &= !mask;
        }
    }

    /// Appends a single bit, growing the backing store as needed.
    pub fn push_bit(&mut self, value: bool) {
        if (self.number_of_bits & 7) == 0 {
            self.data.push(0);
        }
        self.number_of_bits += 1;
        if value {
            let index = self.number_of_bits - 1;
            self.data[(index >> 3) as usize] |= 0x80 >> (index & 7);
        }
    }

    /// Appends every bit of `other`, at bit rather than byte alignment.
    /// Both segments must share a cell length; a track mixes cell lengths
    /// by holding multiple segments instead.
    pub fn extend(&mut self, other: &PCMSegment) {
        debug_assert_eq!(self.length_of_a_bit, other.length_of_a_bit);
        for index in 0..other.number_of_bits {
            self.push_bit(other.bit(index));
        }
    }

    /// The segment's total duration, in the same unit its cell length is
    /// expressed in.
    #[must_use]
    pub fn duration(&self) -> Time {
        self.length_of_a_bit * self.number_of_bits
    }
}

/// A concrete [`Track`] over one or more [`PCMSegment`]s.
///
/// Segment cell lengths are reconciled onto their least common clock; event
/// lengths are emitted as exact fractions of the whole rotation, so they
/// always sum to 1 regardless of the absolute units the segments used.
#[derive(Clone, Debug)]
pub struct PCMTrack {
    segments: Vec<PCMSegment>,
    unit_lengths: Vec<u64>,
    total_units: u64,
    segment_index: usize,
    bit_index: u32,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    (a / gcd(a, b)) * b
}

impl PCMTrack {
    #[must_use]
    pub fn new(segments: Vec<PCMSegment>) -> Self {
        debug_assert!(!segments.is_empty());

        let common_rate = segments
            .iter()
            .fold(1u64, |rate, segment| lcm(rate, u64::from(segment.length_of_a_bit.clock_rate)));

        let unit_lengths: Vec<u64> = segments
            .iter()
            .map(|segment| {
                u64::from(segment.length_of_a_bit.length)
                    * (common_rate / u64::from(segment.length_of_a_bit.clock_rate))
            })
            .collect();

        let total_units = segments
            .iter()
            .zip(&unit_lengths)
            .map(|(segment, unit)| u64::from(segment.number_of_bits) * unit)
            .sum::<u64>();
        debug_assert!(total_units > 0);

        PCMTrack {
            segments,
            unit_lengths,
            total_units,
            segment_index: 0,
            bit_index: 0,
        }
    }

    #[must_use]
    pub fn from_segment(segment: PCMSegment) -> Self {
        PCMTrack::new(vec![segment])
    }

    #[must_use]
    pub fn number_of_bits(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| u64::from(segment.number_of_bits))
            .sum()
    }
}

impl Track for PCMTrack {
    fn next_event(&mut self) -> TrackEvent {
        // Bits are modelled as occurring at the end of their window.
        let mut accumulated: u64 = 0;
        while self.segment_index < self.segments.len() {
            let segment = &self.segments[self.segment_index];
            let unit = self.unit_lengths[self.segment_index];
            while self.bit_index < segment.number_of_bits {
                let bit = segment.bit(self.bit_index);
                self.bit_index += 1;
                accumulated += unit;
                if bit {
                    return TrackEvent {
                        kind: EventKind::FluxTransition,
                        length: Time::from_ratio(accumulated, self.total_units),
                    };
                }
            }
            self.bit_index = 0;
            self.segment_index += 1;
        }

        // Out of data: this rotation ends here and the next begins.
        self.segment_index = 0;
        TrackEvent {
            kind: EventKind::IndexHole,
            length: Time::from_ratio(accumulated, self.total_units),
        }
    }

    fn seek_to(&mut self, time_since_index_hole: Time) -> Time {
        let target = ((u128::from(time_since_index_hole.length) * u128::from(self.total_units))
            / u128::from(time_since_index_hole.clock_rate)) as u64;
        let target = target % self.total_units.max(1);

        let mut consumed: u64 = 0;
        for (index, segment) in self.segments.iter().enumerate() {
            let unit = self.unit_lengths[index];
            let span = u64::from(segment.number_of_bits) * unit;
            if target < consumed + span {
                let bits_in = ((target - consumed) / unit) as u32;
                self.segment_index = index;
                self.bit_index = bits_in;
                return Time::from_ratio(consumed + u64::from(bits_in) * unit, self.total_units);
            }
            consumed += span;
        }

        self.segment_index = 0;
        self.bit_index = 0;
        Time::ZERO
    }

    fn clone_track(&self) -> Box<dyn Track> {
        Box::new(self.clone())
    }
}

/// Resamples a whole rotation of any track onto a uniform bit cell of
/// `length_of_a_bit`, expressed as a fraction of a rotation. Rounding is
/// computed against the exact rotational position of each flux transition,
/// so error never accumulates along the track.
pub fn track_serialisation(track: &mut dyn Track, length_of_a_bit: Time) -> PCMSegment {
    let mut segment = PCMSegment::new(length_of_a_bit);

    track.seek_to(Time::ZERO);
    let mut position = Time::ZERO;
    let mut bits_written: u64 = 0;

    loop {
        let event = track.next_event();
        position += event.length;

        // Exact cell index of this position: round(position / bit length).
        let numerator = u128::from(position.length) * u128::from(length_of_a_bit.clock_rate);
        let denominator = u128::from(position.clock_rate) * u128::from(length_of_a_bit.length);
        let cells = ((2 * numerator + denominator) / (2 * denominator)) as u64;

        match event.kind {
            EventKind::FluxTransition => {
                let cells = cells.max(bits_written + 1);
                while bits_written + 1 < cells {
                    segment.push_bit(false);
                    bits_written += 1;
                }
                segment.push_bit(true);
                bits_written += 1;
            }
            EventKind::IndexHole => {
                while bits_written < cells {
                    segment.push_bit(false);
                    bits_written += 1;
                }
                break;
            }
        }
    }

    segment
}

/// A track with writing support: the underlying content is resampled to a
/// uniform cell length once, and written segments then overlay it in place.
#[derive(Clone, Debug)]
pub struct PCMPatchedTrack {
    bits: PCMSegment,
    reader: PCMTrack,
}

impl PCMPatchedTrack {
    /// Captures `underlying` at the given cell length (a fraction of a
    /// rotation) ready for patching.
    pub fn new(underlying: &mut dyn Track, length_of_a_bit: Time) -> Self {
        let bits = track_serialisation(underlying, length_of_a_bit);
        let reader = PCMTrack::from_segment(bits.clone());
        PCMPatchedTrack { bits, reader }
    }

    /// Overwrites the region beginning at `start_time` (a fraction of a
    /// rotation) with `segment`'s bits. If `clamp_to_index_hole`, writing
    /// stops at the end of the rotation; otherwise it wraps.
    pub fn add_segment(&mut self, start_time: Time, segment: &PCMSegment, clamp_to_index_hole: bool) {
        let total = u64::from(self.bits.number_of_bits);
        if total == 0 {
            return;
        }

        let start_bit = ((u128::from(start_time.length) * u128::from(total))
            / u128::from(start_time.clock_rate)) as u64;
        for index in 0..u64::from(segment.number_of_bits) {
            let destination = start_bit + index;
            if destination >= total {
                if clamp_to_index_hole {
                    break;
                }
                self.bits.set_bit((destination % total) as u32, segment.bit(index as u32));
            } else {
                self.bits.set_bit(destination as u32, segment.bit(index as u32));
            }
        }

        self.reader = PCMTrack::from_segment(self.bits.clone());
    }
}

impl Track for PCMPatchedTrack {
    fn next_event(&mut self) -> TrackEvent {
        self.reader.next_event()
    }

    fn seek_to(&mut self, time_since_index_hole: Time) -> Time {
        self.reader.seek_to(time_since_index_hole)
    }

    fn clone_track(&self) -> Box<dyn Track> {
        Box::new(self.clone())
    }
}
