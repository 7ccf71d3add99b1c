//! Closed integer intervals and the arithmetic the verifier derives facts
//! with.
//!
//! Bounds are `i128` so every 64-bit type range fits with room to spare.
//! Operations saturate at the `i128` limits instead of failing: a saturated
//! bound is always beyond every type range on the same side, so overflow and
//! bounds checks against type ranges keep giving the right answer.

use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    lo: i128,
    hi: i128,
}

impl Interval {
    pub const TRUE: Interval = Interval::singleton(1);
    pub const FALSE: Interval = Interval::singleton(0);
    /// Either truth value.
    pub const BOOL: Interval = Interval::new(0, 1);
    /// Nothing known.
    pub const FULL: Interval = Interval::new(i128::MIN, i128::MAX);

    pub const fn new(lo: i128, hi: i128) -> Interval {
        assert!(lo <= hi, "empty interval");
        Interval { lo, hi }
    }

    pub const fn singleton(value: i128) -> Interval {
        Interval {
            lo: value,
            hi: value,
        }
    }

    pub const fn lo(self) -> i128 {
        self.lo
    }

    pub const fn hi(self) -> i128 {
        self.hi
    }

    pub fn as_singleton(self) -> Option<i128> {
        (self.lo == self.hi).then_some(self.lo)
    }

    pub fn contains(self, value: i128) -> bool {
        self.lo <= value && value <= self.hi
    }

    /// Whether every value of `self` is also in `outer`.
    pub fn is_within(self, outer: Interval) -> bool {
        outer.lo <= self.lo && self.hi <= outer.hi
    }

    /// The smallest interval containing both.
    pub fn hull(self, other: Interval) -> Interval {
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// The intersection, or `None` when the two are disjoint.
    pub fn meet(self, other: Interval) -> Option<Interval> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        (lo <= hi).then_some(Interval { lo, hi })
    }

    pub fn add(self, rhs: Interval) -> Interval {
        Interval {
            lo: self.lo.saturating_add(rhs.lo),
            hi: self.hi.saturating_add(rhs.hi),
        }
    }

    pub fn sub(self, rhs: Interval) -> Interval {
        Interval {
            lo: self.lo.saturating_sub(rhs.hi),
            hi: self.hi.saturating_sub(rhs.lo),
        }
    }

    pub fn neg(self) -> Interval {
        Interval {
            lo: self.hi.saturating_neg(),
            hi: self.lo.saturating_neg(),
        }
    }

    pub fn mul(self, rhs: Interval) -> Interval {
        self.corners(rhs, i128::saturating_mul)
    }

    /// Truncating division. `None` when the divisor may be zero.
    pub fn div(self, rhs: Interval) -> Option<Interval> {
        if rhs.contains(0) {
            return None;
        }
        Some(self.corners(rhs, i128::saturating_div))
    }

    /// Remainder with the sign of the dividend. `None` when the divisor may be
    /// zero.
    pub fn rem(self, rhs: Interval) -> Option<Interval> {
        if rhs.contains(0) {
            return None;
        }
        let max_abs = rhs.lo.saturating_abs().max(rhs.hi.saturating_abs());
        let min_abs = rhs.lo.saturating_abs().min(rhs.hi.saturating_abs());
        let bound = max_abs - 1;
        // Dividends smaller in magnitude than every divisor come back as is.
        if self.lo.saturating_abs() < min_abs && self.hi.saturating_abs() < min_abs {
            return Some(self);
        }
        let lo = if self.lo >= 0 { 0 } else { self.lo.max(-bound) };
        let hi = if self.hi <= 0 { 0 } else { self.hi.min(bound) };
        Some(Interval { lo, hi })
    }

    /// `self * 2^rhs`. The caller guarantees `rhs` is non-negative.
    pub fn shl(self, rhs: Interval) -> Interval {
        debug_assert!(rhs.lo >= 0);
        self.corners(rhs, |a, k| a.saturating_mul(pow2(k)))
    }

    /// Arithmetic right shift. The caller guarantees `rhs` is non-negative.
    pub fn shr(self, rhs: Interval) -> Interval {
        debug_assert!(rhs.lo >= 0);
        self.corners(rhs, |a, k| a >> k.clamp(0, 127))
    }

    /// `None` when both operands may be negative.
    pub fn bitand(self, rhs: Interval) -> Option<Interval> {
        match (self.lo >= 0, rhs.lo >= 0) {
            (true, true) => Some(Interval::new(0, self.hi.min(rhs.hi))),
            (true, false) => Some(Interval::new(0, self.hi)),
            (false, true) => Some(Interval::new(0, rhs.hi)),
            (false, false) => None,
        }
    }

    /// `None` when either operand may be negative.
    pub fn bitor(self, rhs: Interval) -> Option<Interval> {
        if self.lo < 0 || rhs.lo < 0 {
            return None;
        }
        let hi = all_ones_covering(self.hi.max(rhs.hi));
        Some(Interval::new(self.lo.max(rhs.lo), hi))
    }

    /// `None` when either operand may be negative.
    pub fn bitxor(self, rhs: Interval) -> Option<Interval> {
        if self.lo < 0 || rhs.lo < 0 {
            return None;
        }
        Some(Interval::new(0, all_ones_covering(self.hi.max(rhs.hi))))
    }

    pub fn lt(self, rhs: Interval) -> Interval {
        if self.hi < rhs.lo {
            Interval::TRUE
        } else if self.lo >= rhs.hi {
            Interval::FALSE
        } else {
            Interval::BOOL
        }
    }

    pub fn le(self, rhs: Interval) -> Interval {
        if self.hi <= rhs.lo {
            Interval::TRUE
        } else if self.lo > rhs.hi {
            Interval::FALSE
        } else {
            Interval::BOOL
        }
    }

    pub fn eq(self, rhs: Interval) -> Interval {
        match (self.as_singleton(), rhs.as_singleton()) {
            (Some(a), Some(b)) if a == b => Interval::TRUE,
            _ if self.meet(rhs).is_none() => Interval::FALSE,
            _ => Interval::BOOL,
        }
    }

    pub fn ne(self, rhs: Interval) -> Interval {
        self.eq(rhs).not()
    }

    /// Logical negation of a truth interval.
    pub fn not(self) -> Interval {
        Interval {
            lo: 1 - self.hi,
            hi: 1 - self.lo,
        }
    }

    pub fn and(self, rhs: Interval) -> Interval {
        Interval {
            lo: self.lo.min(rhs.lo),
            hi: self.hi.min(rhs.hi),
        }
    }

    pub fn or(self, rhs: Interval) -> Interval {
        Interval {
            lo: self.lo.max(rhs.lo),
            hi: self.hi.max(rhs.hi),
        }
    }

    /// Applies `op` to the four corner pairs and keeps the extremes. Exact for
    /// operations that are monotone in each argument separately.
    fn corners(self, rhs: Interval, op: impl Fn(i128, i128) -> i128) -> Interval {
        let values = [
            op(self.lo, rhs.lo),
            op(self.lo, rhs.hi),
            op(self.hi, rhs.lo),
            op(self.hi, rhs.hi),
        ];
        Interval {
            lo: values.into_iter().min().unwrap_or(i128::MIN),
            hi: values.into_iter().max().unwrap_or(i128::MAX),
        }
    }
}

fn pow2(k: i128) -> i128 {
    if k >= 127 {
        i128::MAX
    } else {
        1 << k
    }
}

/// The smallest `2^n - 1` which is at least `value` (non-negative).
fn all_ones_covering(value: i128) -> i128 {
    if value <= 0 {
        return 0;
    }
    let bits = 128 - value.leading_zeros();
    if bits >= 127 {
        i128::MAX
    } else {
        (1 << bits) - 1
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}
