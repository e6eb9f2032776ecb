//! The Oric fast tape encoding: a one is a single 2400 Hz period, a zero a
//! 2400 Hz pulse followed by a 1200 Hz pulse. Bytes are 13-bit frames: a
//! zero start bit, eight data bits LSB first, a parity bit and three ones.

use super::{Parser, PulseClassifier, WaveOutcome};
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
            // Half-periods: ~208 µs at 2400 Hz, ~417 µs at 1200 Hz.
            if (0.1e-3..0.3e-3).contains(&length) {
                return Some(WaveType::Short);
            }
            if (0.3e-3..0.6e-3).contains(&length) {
                return Some(WaveType::Long);
            }
        }
        Some(WaveType::Unrecognised)
    }

    fn inspect_waves(&self, waves: &[WaveType]) -> WaveOutcome<SymbolType> {
        if waves.len() < 2 {
            return WaveOutcome::Wait;
        }
        match (waves[0], waves[1]) {
            (WaveType::Short, WaveType::Short) => WaveOutcome::Symbol(SymbolType::One, 2),
            (WaveType::Short, WaveType::Long) => WaveOutcome::Symbol(SymbolType::Zero, 2),
            _ => WaveOutcome::Discard(1),
        }
    }
}

pub struct OricParser {
    parser: Parser<Classifier>,
}

impl OricParser {
    #[must_use]
    pub fn new() -> Self {
        OricParser {
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

    fn next_bit(&mut self, tape: &mut dyn Tape) -> Option<u8> {
        match self.parser.next_symbol(tape)? {
            SymbolType::One => Some(1),
            SymbolType::Zero => Some(0),
        }
    }

    /// Scans to the next start bit and decodes one 13-bit frame, checking
    /// the parity and stop bits.
    pub fn next_byte(&mut self, tape: &mut dyn Tape) -> Option<u8> {
        // Hunt for the start bit.
        loop {
            match self.next_bit(tape)? {
                0 => break,
                _ => continue,
            }
        }

        let mut value: u8 = 0;
        for bit in 0..8 {
            value |= self.next_bit(tape)? << bit;
        }

        let parity_bit = self.next_bit(tape)?;
        let mut parity = value;
        parity ^= parity >> 4;
        parity ^= parity >> 2;
        parity ^= parity >> 1;
        if parity_bit != (parity & 1) {
            self.parser.set_error_flag();
            return None;
        }

        for _ in 0..3 {
            if self.next_bit(tape)? != 1 {
                self.parser.set_error_flag();
                return None;
            }
        }

        Some(value)
    }
}

impl Default for OricParser {
    fn default() -> Self {
        OricParser::new()
    }
}
