//! The shared three-stage tape decoding pipeline: pulses are bucketed into
//! waves, a rolling window of waves is matched into symbols, and the
//! per-machine wrappers assemble symbols into framed bytes.

pub mod acorn;
pub mod oric;
pub mod zx8081;

use super::{Pulse, Tape};

/// What a classifier concluded from the current run of waves.
pub enum WaveOutcome<Symbol> {
    /// The leading `usize` waves form this symbol; drop them.
    Symbol(Symbol, usize),
    /// The leading waves can never start a symbol; drop them and re-inspect.
    Discard(usize),
    /// More waves are needed to decide.
    Wait,
}

/// A per-format classifier: pulse→wave bucketing and wave-pattern matching.
pub trait PulseClassifier {
    type Wave: Copy;
    type Symbol: Copy;

    /// Buckets one pulse; `None` means the pulse contributes no wave (for
    /// example, it merely extends a silence already reported).
    fn process_pulse(&mut self, pulse: Pulse) -> Option<Self::Wave>;

    /// Examines the wave buffer from its start.
    fn inspect_waves(&self, waves: &[Self::Wave]) -> WaveOutcome<Self::Symbol>;
}

/// Drives a [`PulseClassifier`] over a tape, holding the rolling wave
/// buffer and the latched error flag callers poll between reads.
pub struct Parser<C: PulseClassifier> {
    classifier: C,
    waves: Vec<C::Wave>,
    error_flag: bool,
}

impl<C: PulseClassifier> Parser<C> {
    pub fn new(classifier: C) -> Self {
        Parser {
            classifier,
            waves: Vec::new(),
            error_flag: false,
        }
    }

    #[must_use]
    pub fn error_flag(&self) -> bool {
        self.error_flag
    }

    pub fn set_error_flag(&mut self) {
        self.error_flag = true;
    }

    pub fn reset_error_flag(&mut self) {
        self.error_flag = false;
    }

    /// Reads pulses until a symbol is recognised. `None` means the tape
    /// ran out, which also latches the error flag.
    pub fn next_symbol(&mut self, tape: &mut dyn Tape) -> Option<C::Symbol> {
        loop {
            loop {
                match self.classifier.inspect_waves(&self.waves) {
                    WaveOutcome::Symbol(symbol, consumed) => {
                        self.waves.drain(..consumed.min(self.waves.len()));
                        return Some(symbol);
                    }
                    WaveOutcome::Discard(count) => {
                        debug_assert!(count > 0);
                        self.waves.drain(..count.min(self.waves.len()));
                    }
                    WaveOutcome::Wait => break,
                }
            }

            if tape.at_end() {
                self.error_flag = true;
                return None;
            }
            let pulse = tape.next_pulse();
            if let Some(wave) = self.classifier.process_pulse(pulse) {
                self.waves.push(wave);
            }
        }
    }
}
