//! The ZX80/81 tape scheme: each bit is a burst of 150 µs pulses (four
//! waves for a zero, nine for a one) followed by a 1300 µs gap, with
//! around a second of silence between files. Bytes are sent MSB first.

use super::{Parser, PulseClassifier, WaveOutcome};
use crate::tape::{Pulse, PulseKind, Tape};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaveType {
    Pulse,
    Gap,
    LongGap,
    Unrecognised,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolType {
    Zero,
    One,
    FileGap,
}

struct Classifier;

impl PulseClassifier for Classifier {
    type Wave = WaveType;
    type Symbol = SymbolType;

    fn process_pulse(&mut self, pulse: Pulse) -> Option<WaveType> {
        let length = pulse.length.as_f64();
        match pulse.kind {
            PulseKind::High | PulseKind::Low if length < 0.3e-3 => Some(WaveType::Pulse),
            PulseKind::Low | PulseKind::Zero if length >= 0.5 => Some(WaveType::LongGap),
            PulseKind::Low | PulseKind::Zero if length >= 0.6e-3 => Some(WaveType::Gap),
            _ => Some(WaveType::Unrecognised),
        }
    }

    fn inspect_waves(&self, waves: &[WaveType]) -> WaveOutcome<SymbolType> {
        match waves.first() {
            None => WaveOutcome::Wait,
            Some(WaveType::LongGap) => WaveOutcome::Symbol(SymbolType::FileGap, 1),
            Some(WaveType::Gap) | Some(WaveType::Unrecognised) => WaveOutcome::Discard(1),
            Some(WaveType::Pulse) => {
                let pulses = waves
                    .iter()
                    .take_while(|wave| **wave == WaveType::Pulse)
                    .count();
                if pulses == waves.len() {
                    // Tolerate a little noise, but an impossible run can be
                    // rejected without waiting for its terminating gap.
                    if pulses > 18 {
                        WaveOutcome::Discard(pulses)
                    } else {
                        WaveOutcome::Wait
                    }
                } else {
                    // A gap terminates the burst: 2 pulses per wave.
                    match pulses {
                        8 => WaveOutcome::Symbol(SymbolType::Zero, pulses),
                        18 => WaveOutcome::Symbol(SymbolType::One, pulses),
                        _ => WaveOutcome::Discard(pulses),
                    }
                }
            }
        }
    }
}

pub struct Zx8081Parser {
    parser: Parser<Classifier>,
}

impl Zx8081Parser {
    #[must_use]
    pub fn new() -> Self {
        Zx8081Parser {
            parser: Parser::new(Classifier),
        }
    }

    #[must_use]
    pub fn error_flag(&self) -> bool {
        self.parser.error_flag()
    }

    pub fn reset_error_flag(&mut self) {
        self.parser.reset_error_flag();
    }

    pub fn next_symbol(&mut self, tape: &mut dyn Tape) -> Option<SymbolType> {
        self.parser.next_symbol(tape)
    }

    /// One byte, MSB first. A file gap mid-byte is a framing error; at a
    /// byte boundary it is skipped.
    pub fn next_byte(&mut self, tape: &mut dyn Tape) -> Option<u8> {
        let mut value: u8 = 0;
        let mut bits_read = 0;
        while bits_read < 8 {
            match self.next_symbol(tape)? {
                SymbolType::One => {
                    value = (value << 1) | 1;
                    bits_read += 1;
                }
                SymbolType::Zero => {
                    value <<= 1;
                    bits_read += 1;
                }
                SymbolType::FileGap => {
                    if bits_read != 0 {
                        self.parser.set_error_flag();
                        return None;
                    }
                }
            }
        }
        Some(value)
    }
}

impl Default for Zx8081Parser {
    fn default() -> Self {
        Zx8081Parser::new()
    }
}
