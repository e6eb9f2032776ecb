use core::cmp::Ordering;
use core::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

/// An exact rational quantity of time: `length` parts of a second divided
/// into `clock_rate` parts.
///
/// Disk and tape timing accumulates over many millions of cycles, so this
/// is kept rational rather than floating; all comparison is performed by
/// cross multiplication and simplification is lazy.
#[derive(Clone, Copy, Debug)]
pub struct Time {
    pub length: u32,
    pub clock_rate: u32,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

impl Time {
    pub const ZERO: Time = Time { length: 0, clock_rate: 1 };
    pub const ONE: Time = Time { length: 1, clock_rate: 1 };

    #[must_use]
    pub fn new(length: u32, clock_rate: u32) -> Self {
        debug_assert!(clock_rate > 0);
        Time { length, clock_rate }
    }

    /// Builds a Time from a 64-bit ratio, reducing (exactly by gcd where
    /// possible, by halving otherwise) until both terms fit in 32 bits.
    #[must_use]
    pub fn from_ratio(mut numerator: u64, mut denominator: u64) -> Self {
        debug_assert!(denominator > 0);
        let divisor = gcd(numerator, denominator);
        numerator /= divisor;
        denominator /= divisor;

        while numerator > u64::from(u32::MAX) || denominator > u64::from(u32::MAX) {
            numerator >>= 1;
            denominator >>= 1;
        }

        Time {
            length: numerator as u32,
            clock_rate: (denominator as u32).max(1),
        }
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.length == 0
    }

    pub fn set_zero(&mut self) {
        self.length = 0;
        self.clock_rate = 1;
    }

    /// Reduces the fraction by its greatest common divisor.
    #[must_use]
    pub fn simplify(mut self) -> Self {
        let divisor = gcd(u64::from(self.length), u64::from(self.clock_rate)) as u32;
        if divisor > 1 {
            self.length /= divisor;
            self.clock_rate /= divisor;
        }
        self
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.length) / f64::from(self.clock_rate)
    }
}

impl Default for Time {
    fn default() -> Self {
        Time::ZERO
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        u64::from(self.length) * u64::from(other.clock_rate)
            == u64::from(other.length) * u64::from(self.clock_rate)
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.length) * u64::from(other.clock_rate);
        let rhs = u64::from(other.length) * u64::from(self.clock_rate);
        lhs.cmp(&rhs)
    }
}

impl Add for Time {
    type Output = Time;
    fn add(self, rhs: Time) -> Time {
        Time::from_ratio(
            u64::from(self.length) * u64::from(rhs.clock_rate)
                + u64::from(rhs.length) * u64::from(self.clock_rate),
            u64::from(self.clock_rate) * u64::from(rhs.clock_rate),
        )
    }
}

impl Sub for Time {
    type Output = Time;
    fn sub(self, rhs: Time) -> Time {
        let lhs_scaled = u64::from(self.length) * u64::from(rhs.clock_rate);
        let rhs_scaled = u64::from(rhs.length) * u64::from(self.clock_rate);
        Time::from_ratio(
            lhs_scaled.saturating_sub(rhs_scaled),
            u64::from(self.clock_rate) * u64::from(rhs.clock_rate),
        )
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl SubAssign for Time {
    fn sub_assign(&mut self, rhs: Time) {
        *self = *self - rhs;
    }
}

impl Mul for Time {
    type Output = Time;
    fn mul(self, rhs: Time) -> Time {
        Time::from_ratio(
            u64::from(self.length) * u64::from(rhs.length),
            u64::from(self.clock_rate) * u64::from(rhs.clock_rate),
        )
    }
}

impl Mul<u32> for Time {
    type Output = Time;
    fn mul(self, rhs: u32) -> Time {
        Time::from_ratio(
            u64::from(self.length) * u64::from(rhs),
            u64::from(self.clock_rate),
        )
    }
}

impl Div for Time {
    type Output = Time;
    fn div(self, rhs: Time) -> Time {
        debug_assert!(rhs.length > 0);
        Time::from_ratio(
            u64::from(self.length) * u64::from(rhs.clock_rate),
            u64::from(self.clock_rate) * u64::from(rhs.length),
        )
    }
}

impl Div<u32> for Time {
    type Output = Time;
    fn div(self, rhs: u32) -> Time {
        debug_assert!(rhs > 0);
        Time::from_ratio(
            u64::from(self.length),
            u64::from(self.clock_rate) * u64::from(rhs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_subtract_round_trips() {
        let a = Time::new(3, 7);
        let b = Time::new(5, 12);
        assert_eq!((a + b) - b, a);
    }

    #[test]
    fn addition_promotes_to_common_clock() {
        let sum = Time::new(1, 3) + Time::new(1, 6);
        assert_eq!(sum, Time::new(1, 2));
    }

    #[test]
    fn comparison_agrees_with_floating_point() {
        let samples = [
            Time::new(1, 3),
            Time::new(2, 6),
            Time::new(1, 2),
            Time::new(99, 100),
            Time::new(100, 99),
            Time::new(0, 5),
        ];
        for a in samples {
            for b in samples {
                assert_eq!(
                    a.cmp(&b),
                    a.as_f64().partial_cmp(&b.as_f64()).unwrap(),
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn cross_multiplied_comparison_has_no_drift() {
        // Near-identical large fractions that single-precision floats
        // cannot tell apart.
        let a = Time::new(100_000_001, 300_000_000);
        let b = Time::new(100_000_000, 300_000_000);
        assert!(a > b);
        assert!(a != b);
    }

    #[test]
    fn overflowing_products_are_reduced() {
        let a = Time::new(1, 3_000_000_000);
        let b = Time::new(1, 2_999_999_999);
        // The exact common denominator exceeds u32; the sum must still be
        // close to 2/3e9.
        let sum = a + b;
        let expected = 2.0 / 3e9;
        assert!((sum.as_f64() - expected).abs() < expected / 1_000.0);
    }

    #[test]
    fn scalar_and_rational_multiplication() {
        assert_eq!(Time::new(3, 8) * 4, Time::new(3, 2));
        assert_eq!(Time::new(1, 2) * Time::new(2, 3), Time::new(1, 3));
        assert_eq!(Time::new(1, 2) / Time::new(1, 4), Time::new(2, 1));
    }

    #[test]
    fn subtraction_saturates_at_zero() {
        assert_eq!(Time::new(1, 4) - Time::new(1, 2), Time::ZERO);
    }
}
