use clocking::{ClockingSource, Cycles};

/// The uniform surface of a memory-mapped peripheral: register access plus
/// time, with the clocking-preference protocol for coarse scheduling.
///
/// Machines advance components just-in-time: any component whose state a
/// bus access could observe is `run_for` its elapsed time immediately
/// before the access is performed.
pub trait BusComponent: ClockingSource {
    fn set_register(&mut self, address: u16, value: u8);
    fn get_register(&mut self, address: u16) -> u8;
    fn run_for(&mut self, cycles: Cycles);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clocking::ClockingPreference;

    /// A free-running counter readable at any address.
    struct CycleCounter {
        count: u64,
        enabled: bool,
    }

    impl ClockingSource for CycleCounter {
        fn preferred_clocking(&self) -> ClockingPreference {
            if self.enabled {
                ClockingPreference::JustInTime
            } else {
                ClockingPreference::None
            }
        }
    }

    impl BusComponent for CycleCounter {
        fn set_register(&mut self, _address: u16, value: u8) {
            self.enabled = value != 0;
        }

        fn get_register(&mut self, _address: u16) -> u8 {
            self.count as u8
        }

        fn run_for(&mut self, cycles: Cycles) {
            if self.enabled {
                self.count += cycles.as_int() as u64;
            }
        }
    }

    #[test]
    fn components_are_advanced_before_observation() {
        let mut counter = CycleCounter {
            count: 0,
            enabled: false,
        };
        assert_eq!(counter.preferred_clocking(), ClockingPreference::None);

        counter.set_register(0, 1);
        counter.run_for(Cycles(0x123));
        assert_eq!(counter.get_register(0), 0x23);
        assert_eq!(counter.preferred_clocking(), ClockingPreference::JustInTime);
    }
}
