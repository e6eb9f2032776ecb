//! The Acorn (BBC/Electron) 1200 baud tape convention: a zero is two
//! cycles at 1200 Hz, a one is four at 2400 Hz; bytes are framed as a zero
//! start bit, eight data bits LSB first and a one stop bit, with a
//! CRC-16 (initial value zero) over the payload.

use super::{Parser, PulseClassifier, WaveOutcome};
use crate::disk::encodings::crc::Crc16;
use crate::tape::{Pulse, PulseKind, Tape};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaveType {
    Short,
    Long,
    Unrecognised,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolType {
    Zero,
    One,
}

struct Classifier;

impl PulseClassifier for Classifier {
    type Wave = WaveType;
    type Symbol = SymbolType;

    fn process_pulse(&mut self, pulse: Pulse) -> Option<WaveType> {
        if matches!(pulse.kind, PulseKind::High | PulseKind::Low) {
            let length = pulse.length.as_f64();
            if (0.35 / 2400.0..0.7 / 1200.0).contains(&length) {
                return Some(if length > 1.0 / 3000.0 {
                    WaveType::Long
                } else {
                    WaveType::Short
                });
            }
        }
        Some(WaveType::Unrecognised)
    }

    fn inspect_waves(&self, waves: &[WaveType]) -> WaveOutcome<SymbolType> {
        if waves.len() < 2 {
            return WaveOutcome::Wait;
        }
        if waves[0] == WaveType::Long && waves[1] == WaveType::Long {
            return WaveOutcome::Symbol(SymbolType::Zero, 2);
        }
        if waves.len() < 4 {
            return WaveOutcome::Wait;
        }
        if waves[..4].iter().all(|wave| *wave == WaveType::Short) {
            return WaveOutcome::Symbol(SymbolType::One, 4);
        }
        WaveOutcome::Discard(1)
    }
}

pub struct AcornParser {
    parser: Parser<Classifier>,
    crc: Crc16,
}

impl AcornParser {
    #[must_use]
    pub fn new() -> Self {
        let mut crc = Crc16::new();
        crc.set_value(0);
        AcornParser {
            parser: Parser::new(Classifier),
            crc,
        }
    }

    #[must_use]
    pub fn error_flag(&self) -> bool {
        self.parser.error_flag()
    }

    pub fn reset_error_flag(&mut self) {
        self.parser.reset_error_flag();
    }

    pub fn next_bit(&mut self, tape: &mut dyn Tape) -> u8 {
        match self.parser.next_symbol(tape) {
            Some(SymbolType::One) => 1,
            _ => 0,
        }
    }

    /// One framed byte; framing violations latch the error flag.
    pub fn next_byte(&mut self, tape: &mut dyn Tape) -> Option<u8> {
        if self.next_bit(tape) != 0 {
            self.parser.set_error_flag();
            return None;
        }
        let mut value: u8 = 0;
        for _ in 0..8 {
            value = (value >> 1) | (self.next_bit(tape) << 7);
        }
        if self.next_bit(tape) != 1 {
            self.parser.set_error_flag();
            return None;
        }
        self.crc.add(value);
        Some(value)
    }

    pub fn next_short(&mut self, tape: &mut dyn Tape) -> Option<u16> {
        let low = self.next_byte(tape)?;
        let high = self.next_byte(tape)?;
        Some(u16::from(low) | (u16::from(high) << 8))
    }

    pub fn next_word(&mut self, tape: &mut dyn Tape) -> Option<u32> {
        let low = self.next_short(tape)?;
        let high = self.next_short(tape)?;
        Some(u32::from(low) | (u32::from(high) << 16))
    }

    pub fn reset_crc(&mut self) {
        self.crc.set_value(0);
    }

    #[must_use]
    pub fn crc(&self) -> u16 {
        self.crc.value()
    }
}

impl Default for AcornParser {
    fn default() -> Self {
        AcornParser::new()
    }
}
