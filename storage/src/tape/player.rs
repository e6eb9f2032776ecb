//! A motor-gated tape transport, clocked at a machine's input rate and
//! reporting each pulse edge at its exact cycle.

use super::{Pulse, PulseKind, Tape};
use clocking::{ClockingPreference, ClockingSource, Cycles, Time, TimedEventLoop};

pub struct TapePlayer {
    event_loop: TimedEventLoop,
    tape: Option<Box<dyn Tape>>,
    motor_on: bool,
    current_pulse: Pulse,
}

impl TapePlayer {
    #[must_use]
    pub fn new(input_clock_rate: u32) -> Self {
        TapePlayer {
            event_loop: TimedEventLoop::new(input_clock_rate),
            tape: None,
            motor_on: false,
            current_pulse: Pulse::new(PulseKind::Zero, Time::ZERO),
        }
    }

    pub fn set_tape(&mut self, tape: Box<dyn Tape>) {
        self.tape = Some(tape);
        self.event_loop.reset_timer();
        self.current_pulse = Pulse::new(PulseKind::Zero, Time::ZERO);
    }

    #[must_use]
    pub fn has_tape(&self) -> bool {
        self.tape.is_some()
    }

    pub fn set_motor_on(&mut self, motor_on: bool) {
        self.motor_on = motor_on;
    }

    /// The level currently under the head.
    #[must_use]
    pub fn current_pulse(&self) -> Pulse {
        self.current_pulse
    }

    /// Advances the transport, invoking `on_pulse` at the exact cycle each
    /// new pulse begins.
    pub fn run_for(&mut self, cycles: Cycles, mut on_pulse: impl FnMut(Pulse)) {
        if !self.motor_on {
            return;
        }
        let Some(tape) = self.tape.as_mut() else {
            return;
        };
        if tape.at_end() {
            return;
        }

        let event_loop = &mut self.event_loop;
        let current_pulse = &mut self.current_pulse;
        event_loop.run_for(cycles, |event_loop| {
            // Skip any zero-length pulses; each still reports its edge.
            loop {
                if tape.at_end() {
                    // Hold a one-second silence forever after the end.
                    *current_pulse = Pulse::new(PulseKind::Zero, Time::ONE);
                    on_pulse(*current_pulse);
                    event_loop.set_next_event_time_interval(Time::ONE);
                    break;
                }
                let pulse = tape.next_pulse();
                *current_pulse = pulse;
                on_pulse(pulse);
                if !pulse.length.is_zero() {
                    event_loop.set_next_event_time_interval(pulse.length);
                    break;
                }
            }
        });
    }
}

impl ClockingSource for TapePlayer {
    fn preferred_clocking(&self) -> ClockingPreference {
        let playing = self.motor_on
            && self.tape.as_ref().map_or(false, |tape| !tape.at_end());
        if playing {
            ClockingPreference::RealTime
        } else {
            ClockingPreference::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An endless 1 kHz square wave.
    struct SquareWave {
        high: bool,
    }

    impl Tape for SquareWave {
        fn next_pulse(&mut self) -> Pulse {
            self.high = !self.high;
            Pulse::new(
                if self.high { PulseKind::High } else { PulseKind::Low },
                Time::new(1, 2_000),
            )
        }

        fn at_end(&self) -> bool {
            false
        }

        fn reset(&mut self) {
            self.high = false;
        }
    }

    #[test]
    fn pulses_arrive_at_the_tape_rate() {
        let mut player = TapePlayer::new(1_000_000);
        player.set_tape(Box::new(SquareWave { high: false }));
        assert_eq!(player.preferred_clocking(), ClockingPreference::None);

        player.set_motor_on(true);
        assert_eq!(player.preferred_clocking(), ClockingPreference::RealTime);

        let mut edges = 0;
        player.run_for(Cycles(1_000_000), |_pulse| edges += 1);
        // One second of a 1 kHz square wave: 2000 half-waves, plus the edge
        // delivered immediately at motor start.
        assert_eq!(edges, 2001);
    }

    #[test]
    fn motor_off_freezes_the_transport() {
        let mut player = TapePlayer::new(1_000_000);
        player.set_tape(Box::new(SquareWave { high: false }));

        let mut edges = 0;
        player.run_for(Cycles(1_000_000), |_pulse| edges += 1);
        assert_eq!(edges, 0);
    }
}
