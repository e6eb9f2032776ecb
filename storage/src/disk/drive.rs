//! The drive proper: head positioning, motor state, and real-time rotation
//! of the current track, with flux events forwarded to a delegate at their
//! exact simulated cycle.

use super::image::Disk;
use super::pcm::{PCMPatchedTrack, PCMSegment};
use super::pll::DigitalPhaseLockedLoop;
use super::{EventKind, HeadPosition, Track, TrackAddress, TrackEvent};
use clocking::{ClockingPreference, ClockingSource, Cycles, Time, TimedEventLoop};
use std::sync::Arc;

/// Receives everything a drive can report while it runs.
pub trait DriveEventDelegate {
    /// A bit recovered by the drive's phase-locked loop.
    fn process_input_bit(&mut self, bit: bool, cycles_since_index_hole: u64);

    /// The index hole passed under the sensor.
    fn process_index_hole(&mut self);

    /// Every bit queued with [`Drive::write_bit`] has been committed.
    fn process_write_completed(&mut self) {}
}

pub struct Drive {
    event_loop: TimedEventLoop,
    rotational_multiplier: Time,

    pll: Option<DigitalPhaseLockedLoop>,
    clocks_per_bit: i64,
    bit_length: Time,

    disk: Option<Arc<dyn Disk>>,
    track: Option<Box<dyn Track>>,
    head_position: HeadPosition,
    head: u8,
    motor_on: bool,

    time_into_track: Time,
    current_event: TrackEvent,
    cycles_since_index_hole: u64,

    is_writing: bool,
    clamp_writing_to_index_hole: bool,
    write_segment: PCMSegment,
    write_start_time: Time,
    cycles_until_bits_written: i64,
}

impl Drive {
    #[must_use]
    pub fn new(input_clock_rate: u32, revolutions_per_minute: u32) -> Self {
        Drive {
            event_loop: TimedEventLoop::new(input_clock_rate),
            rotational_multiplier: Time::new(60, revolutions_per_minute).simplify(),
            pll: None,
            clocks_per_bit: 0,
            bit_length: Time::ZERO,
            disk: None,
            track: None,
            head_position: HeadPosition::ZERO,
            head: 0,
            motor_on: false,
            time_into_track: Time::ZERO,
            current_event: TrackEvent {
                kind: EventKind::IndexHole,
                length: Time::ONE,
            },
            cycles_since_index_hole: 0,
            is_writing: false,
            clamp_writing_to_index_hole: false,
            write_segment: PCMSegment::new(Time::ONE),
            write_start_time: Time::ZERO,
            cycles_until_bits_written: 0,
        }
    }

    /// Tells the PLL how long one bit is expected to last, as a fraction of
    /// a second. The conversion to clocks need not be exact; rotation speed
    /// wobble swamps it, which is why there's a PLL at all.
    pub fn set_expected_bit_length(&mut self, bit_length: Time) {
        self.bit_length = bit_length;
        let clocks_per_bit = (u64::from(bit_length.length)
            * u64::from(self.event_loop.input_clock_rate())
            / u64::from(bit_length.clock_rate)) as i64;
        self.clocks_per_bit = clocks_per_bit;
        self.pll = Some(DigitalPhaseLockedLoop::new(clocks_per_bit, clocks_per_bit / 5, 3));
    }

    pub fn set_disk(&mut self, disk: Arc<dyn Disk>) {
        self.disk = Some(disk);
        self.time_into_track = Time::ZERO;
        self.set_track(Time::ZERO);
    }

    /// Mounts a one-track disk; a convenience for parsers and tests.
    pub fn set_disk_with_track(&mut self, track: Box<dyn Track>) {
        self.set_disk(Arc::new(super::image::SingleTrackDisk::new(track)));
    }

    #[must_use]
    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.disk.as_ref().map_or(true, |disk| disk.is_read_only())
    }

    #[must_use]
    pub fn is_track_zero(&self) -> bool {
        self.head_position == HeadPosition::ZERO
    }

    #[must_use]
    pub fn head_position(&self) -> HeadPosition {
        self.head_position
    }

    pub fn set_motor_on(&mut self, motor_on: bool) {
        self.motor_on = motor_on;
    }

    #[must_use]
    pub fn is_motor_on(&self) -> bool {
        self.motor_on
    }

    /// Steps the head by `offset`, floored at track zero, preserving the
    /// current rotational phase.
    pub fn step(&mut self, offset: HeadPosition) {
        self.head_position = (self.head_position + offset).max(HeadPosition::ZERO);
        let time = self.time_into_track;
        self.set_track(time);
    }

    pub fn set_head(&mut self, head: u8) {
        let head = match &self.disk {
            Some(disk) => head.min(disk.head_count().saturating_sub(1)),
            None => head,
        };
        if head != self.head {
            self.head = head;
            let time = self.time_into_track;
            self.set_track(time);
        }
    }

    fn set_track(&mut self, initial_offset: Time) {
        self.track = self.disk.as_ref().and_then(|disk| {
            disk.track_at(TrackAddress::new(self.head, self.head_position))
        });

        let offset = match self.track.as_mut() {
            Some(track) if !initial_offset.is_zero() => {
                let found = track.seek_to(initial_offset);
                self.time_into_track = found;
                initial_offset - found
            }
            Some(track) => {
                track.seek_to(Time::ZERO);
                self.time_into_track = Time::ZERO;
                Time::ZERO
            }
            None => {
                self.time_into_track = Time::ZERO;
                initial_offset
            }
        };

        self.event_loop.reset_timer();
        self.get_next_event();
        self.event_loop
            .reset_timer_to_offset(offset * self.rotational_multiplier);
    }

    fn get_next_event(&mut self) {
        self.current_event = match self.track.as_mut() {
            Some(track) => track.next_event(),
            // No disk: just the index pulse, once per revolution.
            None => TrackEvent {
                kind: EventKind::IndexHole,
                length: Time::ONE,
            },
        };

        // Event lengths are fractions of a rotation; scaling by 60/rpm
        // converts them to seconds.
        self.event_loop
            .set_next_event_time_interval(self.current_event.length * self.rotational_multiplier);
    }

    /// Runs the rotation for `cycles`, bounded chunk-by-chunk at scheduled
    /// events so that flux transitions, index holes and PLL windows land on
    /// their exact cycle.
    pub fn run_for(&mut self, cycles: Cycles, delegate: &mut dyn DriveEventDelegate) {
        if !self.motor_on {
            return;
        }

        let mut remaining = cycles.as_int();
        while remaining > 0 {
            let chunk = self
                .event_loop
                .cycles_until_next_event()
                .as_int()
                .min(remaining);
            remaining -= chunk;
            self.cycles_since_index_hole += chunk as u64;

            if self.is_writing {
                if self.cycles_until_bits_written > 0 {
                    self.cycles_until_bits_written -= chunk;
                    if self.cycles_until_bits_written <= 0 {
                        delegate.process_write_completed();
                    }
                }
            } else if let Some(pll) = self.pll.as_mut() {
                let cycles_since_index_hole = self.cycles_since_index_hole;
                pll.run_for(Cycles(chunk), &mut |bit| {
                    delegate.process_input_bit(bit, cycles_since_index_hole);
                });
            }

            if self.event_loop.advance(Cycles(chunk)) {
                self.process_next_event(delegate);
            }
        }
    }

    fn process_next_event(&mut self, delegate: &mut dyn DriveEventDelegate) {
        match self.current_event.kind {
            EventKind::FluxTransition => {
                self.time_into_track += self.current_event.length;
                if !self.is_writing {
                    if let Some(pll) = self.pll.as_mut() {
                        let cycles_since_index_hole = self.cycles_since_index_hole;
                        pll.add_pulse(&mut |bit| {
                            delegate.process_input_bit(bit, cycles_since_index_hole);
                        });
                    }
                }
            }
            EventKind::IndexHole => {
                self.cycles_since_index_hole = 0;
                self.time_into_track = Time::ZERO;
                delegate.process_index_hole();
                if self.is_writing && self.clamp_writing_to_index_hole {
                    self.end_writing();
                }
            }
        }
        self.get_next_event();
    }

    /// Switches into write mode: bits supplied via [`write_bit`] accumulate
    /// from the current rotational position.
    ///
    /// [`write_bit`]: Drive::write_bit
    pub fn begin_writing(&mut self, clamp_to_index_hole: bool) {
        if self.is_writing || self.is_read_only() || self.bit_length.is_zero() {
            return;
        }

        self.is_writing = true;
        self.clamp_writing_to_index_hole = clamp_to_index_hole;
        let bit_fraction = (self.bit_length / self.rotational_multiplier).simplify();
        self.write_segment = PCMSegment::new(bit_fraction);
        self.write_start_time = self.time_into_track;
        self.cycles_until_bits_written = 0;
    }

    /// Queues one bit for writing at the expected bit rate.
    pub fn write_bit(&mut self, bit: bool) {
        if !self.is_writing {
            return;
        }
        self.write_segment.push_bit(bit);
        self.cycles_until_bits_written += self.clocks_per_bit;
    }

    /// Leaves write mode, splicing everything written over the current
    /// track and scheduling the image write-back.
    pub fn end_writing(&mut self) {
        if !self.is_writing {
            return;
        }
        self.is_writing = false;

        if self.write_segment.number_of_bits == 0 {
            return;
        }

        if let Some(track) = self.track.as_mut() {
            let mut patched =
                PCMPatchedTrack::new(track.as_mut(), self.write_segment.length_of_a_bit);
            patched.add_segment(
                self.write_start_time,
                &self.write_segment,
                self.clamp_writing_to_index_hole,
            );

            let mut replacement: Box<dyn Track> = Box::new(patched);
            replacement.seek_to(self.time_into_track);
            if let Some(disk) = &self.disk {
                disk.set_track_at(
                    TrackAddress::new(self.head, self.head_position),
                    replacement.clone_track(),
                );
            }
            self.track = Some(replacement);
        }
    }
}

impl ClockingSource for Drive {
    fn preferred_clocking(&self) -> ClockingPreference {
        if self.motor_on {
            ClockingPreference::RealTime
        } else {
            ClockingPreference::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::pcm::{PCMSegment, PCMTrack};

    #[derive(Default)]
    struct Recorder {
        bits: Vec<bool>,
        index_holes: usize,
        writes_completed: usize,
    }

    impl DriveEventDelegate for Recorder {
        fn process_input_bit(&mut self, bit: bool, _cycles_since_index_hole: u64) {
            self.bits.push(bit);
        }

        fn process_index_hole(&mut self) {
            self.index_holes += 1;
        }

        fn process_write_completed(&mut self) {
            self.writes_completed += 1;
        }
    }

    fn simple_track() -> Box<dyn Track> {
        // 16 bits, transitions on every bit: a regular pulse train.
        Box::new(PCMTrack::from_segment(PCMSegment::from_data(
            vec![0xff, 0xff],
            Time::new(1, 16),
        )))
    }

    #[test]
    fn stationary_without_motor() {
        let mut drive = Drive::new(1_000_000, 300);
        drive.set_disk_with_track(simple_track());

        let mut recorder = Recorder::default();
        drive.run_for(Cycles(1_000_000), &mut recorder);
        assert_eq!(recorder.index_holes, 0);
        assert!(recorder.bits.is_empty());
    }

    #[test]
    fn index_hole_once_per_revolution_without_disk() {
        // 300 rpm at 1 MHz: one revolution is exactly 200000 cycles.
        let mut drive = Drive::new(1_000_000, 300);
        drive.set_motor_on(true);

        let mut recorder = Recorder::default();
        // The freshly started motor sees an immediate index pulse, then one
        // per full revolution.
        drive.run_for(Cycles(200_000 * 5), &mut recorder);
        assert_eq!(recorder.index_holes, 6);
    }

    #[test]
    fn flux_transitions_feed_the_pll() {
        let mut drive = Drive::new(1_000_000, 300);
        drive.set_disk_with_track(simple_track());
        // 16 bits per 200000-cycle revolution: 12500 cycles per bit.
        drive.set_expected_bit_length(Time::new(1, 80));
        drive.set_motor_on(true);

        let mut recorder = Recorder::default();
        drive.run_for(Cycles(200_100), &mut recorder);

        assert_eq!(recorder.index_holes, 1);
        let ones = recorder.bits.iter().filter(|bit| **bit).count();
        assert_eq!(ones, 16);
    }

    #[test]
    fn stepping_stays_floored_at_track_zero_and_back() {
        let mut drive = Drive::new(1_000_000, 300);
        assert!(drive.is_track_zero());

        for _ in 0..40 {
            drive.step(HeadPosition::new(1));
            assert!(!drive.is_track_zero());
        }
        assert_eq!(drive.head_position(), HeadPosition::new(40));

        for _ in 0..39 {
            drive.step(HeadPosition::new(-1));
            assert!(!drive.is_track_zero());
        }
        drive.step(HeadPosition::new(-1));
        assert!(drive.is_track_zero());

        // Stepping out below zero is floored.
        drive.step(HeadPosition::new(-1));
        assert!(drive.is_track_zero());
    }

    #[test]
    fn writing_replaces_the_covered_region() {
        // An all-zero 64-bit track; write eight 1-bits from the index hole.
        let blank = Box::new(PCMTrack::from_segment(PCMSegment::from_data(
            vec![0x00; 8],
            Time::new(1, 64),
        )));
        let mut drive = Drive::new(1_000_000, 300);
        drive.set_disk_with_track(blank);
        // 64 bits per 200000-cycle revolution.
        drive.set_expected_bit_length(Time::new(1, 320));
        drive.set_motor_on(true);

        let mut recorder = Recorder::default();
        drive.begin_writing(true);
        for _ in 0..8 {
            drive.write_bit(true);
        }
        // Writing the queued bits takes 8 bit cells of simulated time.
        drive.run_for(Cycles(3_125 * 8), &mut recorder);
        assert_eq!(recorder.writes_completed, 1);
        drive.end_writing();

        // Reading on to the end of the next revolution yields exactly the
        // eight transitions just written.
        let mut recorder = Recorder::default();
        drive.run_for(Cycles(300_000), &mut recorder);
        assert_eq!(recorder.index_holes, 1);
        let ones = recorder.bits.iter().filter(|bit| **bit).count();
        assert_eq!(ones, 8);
    }
}
