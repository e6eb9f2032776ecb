//! ZX80 .O/.80 and ZX81 .P/.81 files: bare memory dumps, turned back into
//! the machines' pulse-burst encoding on replay.

use crate::tape::{Pulse, PulseKind, Tape};
use crate::Error;
use clocking::Time;
use std::path::Path;

pub struct Zx80O81PTape {
    data: Vec<u8>,

    data_pointer: usize,
    is_past_silence: bool,
    has_ended_final_byte: bool,
    is_high: bool,
    bit_pointer: u8,
    wave_pointer: u8,
    byte: u8,
}

impl Zx80O81PTape {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut data = std::fs::read(path)?;
        if data.is_empty() || data.len() > 0x1_0000 {
            return Err(Error::InvalidFormat);
        }

        // ZX81 files don't include the file name; prepend an empty one.
        let is_zx81 = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map_or(false, |extension| {
                let lower = extension.to_lowercase();
                lower == "p" || lower == "81" || lower == "p81"
            });
        if is_zx81 {
            data.insert(0, 0x80);
        }

        let mut result = Zx80O81PTape {
            data,
            data_pointer: 0,
            is_past_silence: false,
            has_ended_final_byte: false,
            is_high: true,
            bit_pointer: 0,
            wave_pointer: 0,
            byte: 0,
        };
        result.reset();
        Ok(result)
    }

    fn has_finished_data(&self) -> bool {
        self.data_pointer == self.data.len() && self.wave_pointer == 0 && self.bit_pointer == 0
    }
}

impl Tape for Zx80O81PTape {
    fn next_pulse(&mut self) -> Pulse {
        // A second or so of silence opens the tape and closes it for good.
        if !self.is_past_silence || self.has_finished_data() {
            self.is_past_silence = true;
            self.has_ended_final_byte = self.has_finished_data();
            return Pulse::new(PulseKind::Low, Time::new(5, 1));
        }

        if self.bit_pointer == 0 && self.wave_pointer == 0 {
            self.byte = self.data[self.data_pointer];
            self.data_pointer += 1;
        }

        if self.wave_pointer == 0 {
            // The inter-bit rest, nominally 1300 µs.
            self.wave_pointer += 1;
            Pulse::new(PulseKind::Low, Time::new(13, 10_000))
        } else {
            // Waves are pairs of 150 µs pulses.
            let kind = if self.is_high {
                PulseKind::High
            } else {
                PulseKind::Low
            };
            if !self.is_high {
                // Bytes are stored MSB first.
                let wave_count = if self.byte & (0x80 >> self.bit_pointer) != 0 {
                    9
                } else {
                    4
                };
                self.wave_pointer += 1;
                if self.wave_pointer == wave_count + 1 {
                    self.bit_pointer = (self.bit_pointer + 1) & 7;
                    self.wave_pointer = 0;
                }
            }
            self.is_high = !self.is_high;
            Pulse::new(kind, Time::new(3, 20_000))
        }
    }

    fn at_end(&self) -> bool {
        self.has_finished_data() && self.has_ended_final_byte
    }

    fn reset(&mut self) {
        self.data_pointer = 0;
        self.is_past_silence = false;
        self.has_ended_final_byte = false;
        self.is_high = true;
        self.bit_pointer = 0;
        self.wave_pointer = 0;
    }
}
