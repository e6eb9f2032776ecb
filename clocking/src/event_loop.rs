use crate::cycles::Cycles;
use crate::time::Time;

/// Drives time toward the next scheduled event with sub-cycle precision.
///
/// Owners schedule an interval with [`set_next_event_time_interval`]; the
/// loop converts it to a whole number of input-clock cycles plus a rational
/// remainder, and carries that remainder into the next schedule so that no
/// rounding ever accumulates.
///
/// [`set_next_event_time_interval`]: TimedEventLoop::set_next_event_time_interval
#[derive(Clone, Debug)]
pub struct TimedEventLoop {
    input_clock_rate: u32,
    cycles_until_event: i64,
    subcycles_until_event: Time,
}

fn gcd_wide(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

impl TimedEventLoop {
    #[must_use]
    pub fn new(input_clock_rate: u32) -> Self {
        debug_assert!(input_clock_rate > 0);
        TimedEventLoop {
            input_clock_rate,
            cycles_until_event: 0,
            subcycles_until_event: Time::ZERO,
        }
    }

    #[must_use]
    pub fn input_clock_rate(&self) -> u32 {
        self.input_clock_rate
    }

    /// Advances by `cycles`, invoking `on_event` exactly at each point the
    /// pending event comes due. `on_event` must schedule the next event
    /// before returning.
    pub fn run_for(&mut self, cycles: Cycles, mut on_event: impl FnMut(&mut TimedEventLoop)) {
        let mut remaining = cycles.as_int();
        #[cfg(debug_assertions)]
        let mut advanced: i64 = 0;

        while self.cycles_until_event <= remaining {
            #[cfg(debug_assertions)]
            {
                advanced += self.cycles_until_event;
            }
            remaining -= self.cycles_until_event;
            self.cycles_until_event = 0;
            on_event(self);
        }

        if remaining > 0 {
            self.cycles_until_event -= remaining;
            #[cfg(debug_assertions)]
            {
                advanced += remaining;
            }
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(advanced, cycles.as_int());
        debug_assert!(self.cycles_until_event > 0);
    }

    /// Advances by `cycles`, which must not exceed
    /// [`cycles_until_next_event`](Self::cycles_until_next_event), and
    /// reports whether the pending event has now come due. For callers that
    /// interleave other per-chunk work between events.
    pub fn advance(&mut self, cycles: Cycles) -> bool {
        debug_assert!(cycles.as_int() <= self.cycles_until_event.max(0));
        self.cycles_until_event -= cycles.as_int();
        self.cycles_until_event <= 0
    }

    #[must_use]
    pub fn cycles_until_next_event(&self) -> Cycles {
        Cycles(self.cycles_until_event.max(0))
    }

    pub fn reset_timer(&mut self) {
        self.cycles_until_event = 0;
        self.subcycles_until_event = Time::ZERO;
    }

    /// Schedules the pending event `interval` hence, merging the interval
    /// with any sub-cycle remainder already accrued.
    pub fn set_next_event_time_interval(&mut self, interval: Time) {
        debug_assert_eq!(self.cycles_until_event, 0);

        // [interval] * [input clock rate] + [subcycles until event].
        let mut denominator = u128::from(interval.clock_rate)
            * u128::from(self.subcycles_until_event.clock_rate);
        let mut numerator = u128::from(self.subcycles_until_event.clock_rate)
            * u128::from(self.input_clock_rate)
            * u128::from(interval.length)
            + u128::from(interval.clock_rate) * u128::from(self.subcycles_until_event.length);

        if denominator > u128::from(u32::MAX) {
            let divisor = gcd_wide(numerator % denominator, denominator);
            numerator /= divisor;
            denominator /= divisor;
        }

        self.cycles_until_event += (numerator / denominator) as i64;
        debug_assert!(self.cycles_until_event >= 0);

        let mut remainder = numerator % denominator;
        while remainder > u128::from(u64::MAX) || denominator > u128::from(u64::MAX) {
            remainder >>= 1;
            denominator >>= 1;
        }
        self.subcycles_until_event =
            Time::from_ratio(remainder as u64, (denominator as u64).max(1)).simplify();
    }

    /// Rewinds the pending event by `offset`, as though that much of the
    /// current interval had already elapsed. Used after a seek that lands
    /// between events.
    pub fn reset_timer_to_offset(&mut self, offset: Time) {
        let numerator = u64::from(offset.length) * u64::from(self.input_clock_rate);
        let denominator = u64::from(offset.clock_rate);

        self.cycles_until_event -= (numerator / denominator) as i64;
        let fraction = Time::from_ratio(numerator % denominator, denominator);
        if !fraction.is_zero() {
            if self.subcycles_until_event < fraction {
                // Borrow one whole cycle to keep the subcycle term positive.
                self.cycles_until_event -= 1;
                self.subcycles_until_event = (self.subcycles_until_event + Time::ONE) - fraction;
            } else {
                self.subcycles_until_event -= fraction;
            }
        }
        self.cycles_until_event = self.cycles_until_event.max(0);
    }

    /// Discards any pending schedule and fires the event immediately.
    pub fn jump_to_next_event(&mut self, mut on_event: impl FnMut(&mut TimedEventLoop)) {
        self.reset_timer();
        on_event(self);
    }
}
