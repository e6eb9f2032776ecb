//! The processor boundary. Instruction semantics live outside the core;
//! what the core fixes is the shape of the contract: a processor is run
//! for a span of (half-)cycles, and performs every bus transaction through
//! a host-supplied handler which may stretch the clock.

use clocking::{Cycles, HalfCycles};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusOperation {
    /// An opcode fetch; distinguished because several machines watch for
    /// these to page ROMs or insert wait states.
    ReadOpcode,
    Read,
    Write,
    /// An internal cycle: the address bus may carry garbage and nothing
    /// should respond.
    Internal,
    /// Z80 port input.
    Input,
    /// Z80 port output.
    Output,
}

/// The bus as seen by an 8-bit, 16-bit-address processor. The returned
/// value is any additional time the access consumed beyond its nominal
/// length, in the processor's own granularity.
pub trait Bus16 {
    fn perform_bus_operation(
        &mut self,
        operation: BusOperation,
        address: u16,
        value: &mut u8,
    ) -> Cycles;
}

/// The 68000's bus: 24-bit addresses carried in a u32, 16-bit data.
pub trait Bus68000 {
    fn perform_bus_operation(
        &mut self,
        operation: BusOperation,
        address: u32,
        value: &mut u16,
    ) -> HalfCycles;
}

/// A 6502-family core: whole-cycle granularity.
pub trait Processor6502 {
    fn run_for(&mut self, cycles: Cycles, bus: &mut dyn Bus16);
}

/// A Z80-family core: half-cycle granularity, as machines genuinely gate
/// it at that resolution.
pub trait ProcessorZ80 {
    fn run_for(&mut self, cycles: HalfCycles, bus: &mut dyn Bus16);
}

/// A 68000-family core: half-cycle granularity.
pub trait Processor68000 {
    fn run_for(&mut self, cycles: HalfCycles, bus: &mut dyn Bus68000);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A trivial synthetic "CPU" that reads ascending addresses, one per
    /// cycle, honouring any clock stretch the bus reports.
    struct AddressWalker {
        next_address: u16,
    }

    impl Processor6502 for AddressWalker {
        fn run_for(&mut self, cycles: Cycles, bus: &mut dyn Bus16) {
            let mut remaining = cycles;
            while remaining > Cycles(0) {
                let mut value = 0;
                let stretch =
                    bus.perform_bus_operation(BusOperation::Read, self.next_address, &mut value);
                self.next_address = self.next_address.wrapping_add(1);
                remaining -= Cycles(1) + stretch;
            }
        }
    }

    struct StretchyBus {
        accesses: usize,
    }

    impl Bus16 for StretchyBus {
        fn perform_bus_operation(
            &mut self,
            _operation: BusOperation,
            address: u16,
            value: &mut u8,
        ) -> Cycles {
            self.accesses += 1;
            *value = address as u8;
            // Every fourth access crosses a slow region.
            if address & 3 == 3 {
                Cycles(1)
            } else {
                Cycles(0)
            }
        }
    }

    #[test]
    fn bus_stretches_consume_processor_time() {
        let mut cpu = AddressWalker { next_address: 0 };
        let mut bus = StretchyBus { accesses: 0 };

        // 10 cycles: accesses at addresses 0..8, address 3 and 7 costing
        // two cycles each.
        cpu.run_for(Cycles(10), &mut bus);
        assert_eq!(bus.accesses, 8);
    }
}
