//! The glue between a disk controller chip and a drive: clock-rate
//! multiplication, the expected bit length, and write-mode switching.

use super::drive::{Drive, DriveEventDelegate};
use clocking::{ClockingPreference, ClockingSource, Cycles, Time};

/// Hosts a [`Drive`], running it at `clock_rate * clock_rate_multiplier`
/// so that the PLL can resolve sub-bit timing, and owns the expected bit
/// length that seeds that PLL.
pub struct Controller {
    drive: Drive,
    clock_rate_multiplier: u32,
}

impl Controller {
    #[must_use]
    pub fn new(clock_rate: u32, clock_rate_multiplier: u32, revolutions_per_minute: u32) -> Self {
        Controller {
            drive: Drive::new(clock_rate * clock_rate_multiplier, revolutions_per_minute),
            clock_rate_multiplier,
        }
    }

    /// Communicates the expected length of one bit, as a fraction of a
    /// second, to the drive's PLL.
    pub fn set_expected_bit_length(&mut self, bit_length: Time) {
        self.drive.set_expected_bit_length(bit_length);
    }

    /// Advances the drive by `cycles` of controller time.
    pub fn run_for(&mut self, cycles: Cycles, delegate: &mut dyn DriveEventDelegate) {
        self.drive
            .run_for(cycles * i64::from(self.clock_rate_multiplier), delegate);
    }

    pub fn begin_writing(&mut self, clamp_to_index_hole: bool) {
        self.drive.begin_writing(clamp_to_index_hole);
    }

    pub fn end_writing(&mut self) {
        self.drive.end_writing();
    }

    #[must_use]
    pub fn drive(&self) -> &Drive {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut Drive {
        &mut self.drive
    }
}

impl ClockingSource for Controller {
    /// A controller sleeps exactly when its drive does.
    fn preferred_clocking(&self) -> ClockingPreference {
        self.drive.preferred_clocking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_sleeps_with_its_drive() {
        let mut controller = Controller::new(1_000_000, 4, 300);
        assert_eq!(controller.preferred_clocking(), ClockingPreference::None);

        controller.drive_mut().set_motor_on(true);
        assert_eq!(controller.preferred_clocking(), ClockingPreference::RealTime);

        controller.drive_mut().set_motor_on(false);
        assert_eq!(controller.preferred_clocking(), ClockingPreference::None);
    }
}
