//! A software phase-locked loop, reconstructing a bit clock from the
//! irregular stream of flux transition timings a drive supplies.

use clocking::Cycles;

/// Emits one bit per window: `1` if a flux transition arrived within it,
/// `0` if it elapsed empty. The window length breathes with the observed
/// transition spacing, clamped to a tolerance, and the window phase is
/// pulled toward centring transitions by a simple proportional spring.
#[derive(Clone, Debug)]
pub struct DigitalPhaseLockedLoop {
    clocks_per_bit: i64,
    tolerance: i64,

    phase: i64,
    window_length: i64,
    window_was_filled: bool,

    offset: i64,
    offset_history: Vec<i64>,
    offset_pointer: usize,
}

impl DigitalPhaseLockedLoop {
    #[must_use]
    pub fn new(clocks_per_bit: i64, tolerance: i64, length_of_history: usize) -> Self {
        debug_assert!(clocks_per_bit > 0);
        DigitalPhaseLockedLoop {
            clocks_per_bit,
            tolerance,
            phase: 0,
            window_length: clocks_per_bit,
            window_was_filled: false,
            offset: 0,
            offset_history: vec![0; length_of_history],
            offset_pointer: 0,
        }
    }

    /// Advances by `cycles`, reporting a `0` to `sink` for every window
    /// that completes without having seen a transition.
    pub fn run_for(&mut self, cycles: Cycles, sink: &mut impl FnMut(bool)) {
        self.offset += cycles.as_int();
        self.phase += cycles.as_int();

        if self.phase >= self.window_length {
            let mut windows_crossed = self.phase / self.window_length;

            // A window the preceding pulse already filled doesn't also
            // produce a zero.
            if self.window_was_filled {
                windows_crossed -= 1;
            }
            for _ in 0..windows_crossed {
                sink(false);
            }

            self.window_was_filled = false;
            self.phase %= self.window_length;
        }
    }

    /// Signals that a flux transition arrived now. The first transition in
    /// a window emits a `1`; later ones in the same window are ignored.
    pub fn add_pulse(&mut self, sink: &mut impl FnMut(bool)) {
        if !self.window_was_filled {
            sink(true);
            self.window_was_filled = true;
            self.post_phase_offset();
            self.offset = 0;
        }
    }

    fn post_phase_offset(&mut self) {
        self.offset_history[self.offset_pointer] = self.offset;
        self.offset_pointer = (self.offset_pointer + 1) % self.offset_history.len();

        // Each historical spacing is treated as the nearest whole number of
        // bits; their average re-estimates the window length.
        let mut total_spacing = 0;
        let mut total_divisor = 0;
        for offset in &self.offset_history {
            let multiple = (offset + (self.clocks_per_bit >> 1)) / self.clocks_per_bit;
            if multiple == 0 {
                continue;
            }
            total_divisor += multiple;
            total_spacing += offset;
        }
        if total_divisor != 0 {
            self.window_length = (total_spacing / total_divisor)
                .clamp(self.clocks_per_bit - self.tolerance, self.clocks_per_bit + self.tolerance);
        }

        // A simple spring as a lowpass filter for phase.
        let error = self.phase - (self.window_length >> 1);
        self.phase -= (error + 1) >> 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn run_train(pll: &mut DigitalPhaseLockedLoop, spacings: &[i64]) -> Vec<bool> {
        let mut bits = Vec::new();
        for spacing in spacings {
            pll.run_for(Cycles(*spacing), &mut |bit| bits.push(bit));
            pll.add_pulse(&mut |bit| bits.push(bit));
        }
        bits
    }

    #[test]
    fn regular_train_locks_without_drift() {
        // 10^6 cycles of pulses exactly one bit apart: every bit is a 1.
        let mut pll = DigitalPhaseLockedLoop::new(100, 20, 3);
        let spacings = vec![100i64; 10_000];
        let bits = run_train(&mut pll, &spacings);

        // The stream starts mid-window, so exactly one empty window
        // precedes the first pulse; thereafter every window holds a pulse.
        assert_eq!(bits.len(), 10_001);
        assert!(!bits[0]);
        assert!(bits[1..].iter().all(|bit| *bit));
    }

    #[test]
    fn empty_windows_emit_zeros() {
        let mut pll = DigitalPhaseLockedLoop::new(100, 20, 3);
        // Pulses three bits apart: 1 0 0 repeating.
        let bits = run_train(&mut pll, &vec![300i64; 300]);

        let ones = bits.iter().filter(|bit| **bit).count();
        let zeros = bits.len() - ones;
        assert_eq!(ones, 300);
        // Two zeros per pulse, plus one extra for the very first window,
        // which no preceding pulse had filled.
        assert_eq!(zeros, 601);
    }

    #[test]
    fn jittered_train_preserves_pulse_count() {
        // ±10 % jitter on a one-bit spacing; output must contain exactly
        // one 1 per input pulse and no spurious extras.
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let spacings: Vec<i64> = (0..10_000).map(|_| rng.gen_range(90..=110)).collect();

        let mut pll = DigitalPhaseLockedLoop::new(100, 20, 3);
        let bits = run_train(&mut pll, &spacings);

        let ones = bits.iter().filter(|bit| **bit).count();
        assert_eq!(ones, spacings.len());
        // Jitter may occasionally let a window elapse empty, but the loop
        // must stay locked rather than free-running.
        assert!(bits.len() - ones < spacings.len() / 100);
    }

    #[test]
    fn window_length_adapts_within_tolerance() {
        // A consistently fast source: 90-cycle bits against a nominal 100.
        let mut pll = DigitalPhaseLockedLoop::new(100, 15, 3);
        let _ = run_train(&mut pll, &vec![90i64; 50]);
        assert_eq!(pll.window_length, 90);

        // And one far beyond tolerance is clamped.
        let mut pll = DigitalPhaseLockedLoop::new(100, 15, 3);
        let _ = run_train(&mut pll, &vec![60i64; 50]);
        assert_eq!(pll.window_length, 85);
    }
}
