//! Oric .TAP files: framed bytes with a synthesised lead-in, replayed in
//! the fast encoding (a one is one 2400 Hz period, a zero a 2400 Hz pulse
//! followed by a 1200 Hz pulse).

use crate::tape::{Pulse, PulseKind, Tape};
use crate::Error;
use clocking::Time;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    LeadIn,
    Header,
    Data,
    End,
}

pub struct OricTapTape {
    data: Vec<u8>,

    file_pointer: usize,
    phase: Phase,
    next_phase: Phase,
    phase_counter: u32,
    bit_count: u8,
    current_value: u16,
    pulse_counter: u8,
    data_start_address: u16,
    data_end_address: u16,
}

impl OricTapTape {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = std::fs::read(path)?;
        if data.len() < 4 || data[0] != 0x16 || data[1] != 0x16 || data[2] != 0x16 || data[3] != 0x24
        {
            return Err(Error::InvalidFormat);
        }

        let mut result = OricTapTape {
            data,
            file_pointer: 0,
            phase: Phase::LeadIn,
            next_phase: Phase::LeadIn,
            phase_counter: 0,
            bit_count: 13,
            current_value: 0,
            pulse_counter: 0,
            data_start_address: 0,
            data_end_address: 0,
        };
        result.reset();
        Ok(result)
    }

    fn next_file_byte(&mut self) -> u8 {
        let byte = self.data.get(self.file_pointer).copied().unwrap_or(0);
        self.file_pointer += 1;
        byte
    }
}

impl Tape for OricTapTape {
    fn next_pulse(&mut self) -> Pulse {
        // Each byte is thirteen bits: 0, eight data bits, parity, three 1s.
        if self.bit_count == 13 {
            if self.next_phase != self.phase {
                self.phase = self.next_phase;
                self.phase_counter = 0;
            }

            self.bit_count = 0;
            let mut next_byte = 0;
            match self.phase {
                Phase::LeadIn => {
                    next_byte = 0x16;
                    self.phase_counter += 1;
                    // 256 artificial lead-in bytes; the file then supplies
                    // its own three plus the '$'.
                    if self.phase_counter == 256 {
                        self.next_phase = Phase::Header;
                    }
                }

                Phase::Header => {
                    // Counting from the start of the file:
                    // [0, 2]: 0x16. 3: '$'. [4, 5]: unused. 6: program
                    // type. 7: auto-run. [8, 9]: end address. [10, 11]:
                    // start address. 12: unused. [13...]: name, to NUL.
                    next_byte = self.next_file_byte();
                    match self.phase_counter {
                        8 => self.data_end_address = u16::from(next_byte) << 8,
                        9 => self.data_end_address |= u16::from(next_byte),
                        10 => self.data_start_address = u16::from(next_byte) << 8,
                        11 => self.data_start_address |= u16::from(next_byte),
                        _ => {}
                    }
                    self.phase_counter += 1;
                    if self.phase_counter > 12 && next_byte == 0 {
                        self.next_phase = Phase::Data;
                    }
                }

                Phase::Data => {
                    next_byte = self.next_file_byte();
                    self.phase_counter += 1;
                    if self.phase_counter
                        == u32::from(self.data_end_address.wrapping_sub(self.data_start_address))
                    {
                        self.phase_counter = 0;
                        self.next_phase = if self.file_pointer >= self.data.len() {
                            Phase::End
                        } else {
                            Phase::LeadIn
                        };
                    }
                }

                Phase::End => {}
            }

            let mut parity = next_byte;
            parity ^= parity >> 4;
            parity ^= parity >> 2;
            parity ^= parity >> 1;
            self.current_value =
                (u16::from(next_byte) << 1) | (u16::from(parity & 1) << 9) | (7 << 10);
        }

        match self.phase {
            Phase::End => Pulse::new(PulseKind::Zero, Time::new(4800, 4800)),
            _ => {
                let length = if self.current_value & 1 != 0 {
                    1
                } else if self.pulse_counter != 0 {
                    2
                } else {
                    1
                };
                let kind = if self.pulse_counter != 0 {
                    PulseKind::High
                } else {
                    PulseKind::Low
                };

                self.pulse_counter ^= 1;
                if self.pulse_counter == 0 {
                    self.current_value >>= 1;
                    self.bit_count += 1;
                }
                Pulse::new(kind, Time::new(length, 4800))
            }
        }
    }

    fn at_end(&self) -> bool {
        self.phase == Phase::End
    }

    fn reset(&mut self) {
        self.file_pointer = 0;
        self.bit_count = 13;
        self.phase = Phase::LeadIn;
        self.next_phase = Phase::LeadIn;
        self.phase_counter = 0;
        self.pulse_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-orictap-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn rejects_files_without_the_sync_signature() {
        let path = temp_path("bad.tap");
        std::fs::write(&path, [0x16, 0x16, 0x16, 0x16]).unwrap();
        assert!(matches!(
            OricTapTape::open(&path),
            Err(Error::InvalidFormat)
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn every_byte_spans_thirteen_bits_of_pulses() {
        let path = temp_path("frames.tap");
        // Signature, minimal header, one data byte.
        let mut file = vec![0x16, 0x16, 0x16, 0x24];
        file.extend_from_slice(&[0, 0, 0, 0, 0x00, 0x01, 0x00, 0x00, 0, 0]);
        file.push(0xa5);
        std::fs::write(&path, &file).unwrap();

        let mut tape = OricTapTape::open(&path).unwrap();

        // The first byte's 13 bits arrive as 26 pulses; a bit is two
        // pulses whose combined length is 2/4800 (one) or 3/4800 (zero).
        let mut total = Time::ZERO;
        for _ in 0..26 {
            let pulse = tape.next_pulse();
            assert_ne!(pulse.kind, PulseKind::Zero);
            total += pulse.length;
        }
        // 0x16 frames as 0-01101000-1-111: seven ones, six zeros.
        assert_eq!(total, Time::new(7 * 2 + 6 * 3, 4800));

        let _ = std::fs::remove_file(&path);
    }
}
