// vim: tw=80
//! Call count constraints
use std::{
    fmt,
    ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo,
          RangeToInclusive}
};

/// An inclusive range of acceptable call counts.  Either end may be absent,
/// meaning that side is unbounded.
///
/// The `Default` constraint is unbounded.  That differs from a freshly built
/// [`Call`](crate::Call), which expects exactly one call until told otherwise.
///
/// # Examples
/// ```
/// # use mockledger::CountConstraint;
/// let c = CountConstraint::from(2..);
/// assert!(!c.contains(1));
/// assert!(c.contains(1000));
/// assert_eq!("2..", c.to_string());
/// assert_eq!(CountConstraint::unbounded(), CountConstraint::default());
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct CountConstraint {
    min: Option<usize>,
    max: Option<usize>,
}

impl CountConstraint {
    /// Exactly `n` calls.
    pub const fn exactly(n: usize) -> Self {
        CountConstraint { min: Some(n), max: Some(n) }
    }

    /// Any number of calls, including none.
    pub const fn unbounded() -> Self {
        CountConstraint { min: None, max: None }
    }

    pub const fn new(min: Option<usize>, max: Option<usize>) -> Self {
        CountConstraint { min, max }
    }

    /// Replace the lower bound, keeping the upper one.
    pub const fn with_min(self, min: usize) -> Self {
        CountConstraint { min: Some(min), max: self.max }
    }

    /// Replace the upper bound, keeping the lower one.
    pub const fn with_max(self, max: usize) -> Self {
        CountConstraint { min: self.min, max: Some(max) }
    }

    pub const fn without_min(self) -> Self {
        CountConstraint { min: None, max: self.max }
    }

    pub const fn without_max(self) -> Self {
        CountConstraint { min: self.min, max: None }
    }

    pub const fn min(&self) -> Option<usize> {
        self.min
    }

    pub const fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn contains(&self, n: usize) -> bool {
        self.min.map_or(true, |min| min <= n) &&
            self.max.map_or(true, |max| n <= max)
    }

    /// Would one more call still be within the upper bound?
    pub fn admits_another(&self, n: usize) -> bool {
        self.max.map_or(true, |max| n < max)
    }

    /// True when neither end is bounded.
    pub const fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Both ends present, but in the wrong order.
    pub fn is_inverted(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }
}

impl fmt::Display for CountConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (None, None) => f.write_str(".."),
            (Some(min), Some(max)) if min == max => write!(f, "{}", min),
            (Some(min), None) => write!(f, "{}..", min),
            (None, Some(max)) => write!(f, "..{}", max),
            (Some(min), Some(max)) => write!(f, "{}..{}", min, max),
        }
    }
}

impl From<usize> for CountConstraint {
    fn from(n: usize) -> Self {
        CountConstraint::exactly(n)
    }
}

impl From<Range<usize>> for CountConstraint {
    /// `a..b` is half open, so it allows at most `b - 1` calls.  An empty
    /// range such as `0..0` forbids every call.
    fn from(r: Range<usize>) -> Self {
        let max = r.end.saturating_sub(1);
        if r.end <= r.start {
            CountConstraint::exactly(0)
        } else {
            CountConstraint::new(Some(r.start), Some(max))
        }
    }
}

impl From<RangeInclusive<usize>> for CountConstraint {
    fn from(r: RangeInclusive<usize>) -> Self {
        CountConstraint::new(Some(*r.start()), Some(*r.end()))
    }
}

impl From<RangeFrom<usize>> for CountConstraint {
    fn from(r: RangeFrom<usize>) -> Self {
        CountConstraint::new(Some(r.start), None)
    }
}

impl From<RangeTo<usize>> for CountConstraint {
    fn from(r: RangeTo<usize>) -> Self {
        if r.end == 0 {
            CountConstraint::exactly(0)
        } else {
            CountConstraint::new(None, Some(r.end - 1))
        }
    }
}

impl From<RangeToInclusive<usize>> for CountConstraint {
    fn from(r: RangeToInclusive<usize>) -> Self {
        CountConstraint::new(None, Some(r.end))
    }
}

impl From<RangeFull> for CountConstraint {
    fn from(_: RangeFull) -> Self {
        CountConstraint::unbounded()
    }
}

#[cfg(test)]
mod t {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display() {
        assert_eq!("3", CountConstraint::exactly(3).to_string());
        assert_eq!("3..", CountConstraint::from(3..).to_string());
        assert_eq!("..3", CountConstraint::from(..=3).to_string());
        assert_eq!("1..4", CountConstraint::from(1..5).to_string());
        assert_eq!("..", CountConstraint::unbounded().to_string());
    }

    #[test]
    fn default_is_unbounded() {
        let c = CountConstraint::default();
        assert_eq!(None, c.min());
        assert_eq!(None, c.max());
        assert!(c.contains(0));
        assert!(c.admits_another(usize::MAX - 1));
    }

    #[test]
    fn empty_means_unbounded() {
        assert!(CountConstraint::unbounded().is_empty());
        assert!(!CountConstraint::exactly(0).is_empty());
        assert!(!CountConstraint::default().with_max(2).is_empty());
    }

    #[test]
    fn half_open_ranges() {
        assert_eq!(CountConstraint::exactly(0), (0..0).into());
        assert_eq!(CountConstraint::exactly(0), (..0).into());
        assert_eq!(CountConstraint::new(None, Some(1)), (..2).into());
        assert_eq!(CountConstraint::new(Some(2), Some(2)), (2..3).into());
    }

    #[test]
    fn builders_keep_the_other_end() {
        let c = CountConstraint::default().with_min(2).with_max(5);
        assert_eq!(Some(2), c.min());
        assert_eq!(Some(5), c.max());
        assert_eq!(None, c.without_min().min());
        assert_eq!(None, c.without_max().max());
    }

    #[test]
    fn inverted() {
        assert!(CountConstraint::new(Some(3), Some(2)).is_inverted());
        assert!(!CountConstraint::new(Some(2), None).is_inverted());
    }

    proptest! {
        #[test]
        fn contains_matches_bounds(
            min in proptest::option::of(0usize..20),
            max in proptest::option::of(0usize..20),
            n in 0usize..40)
        {
            let c = CountConstraint::new(min, max);
            let expected = min.map_or(true, |m| m <= n) &&
                max.map_or(true, |m| n <= m);
            prop_assert_eq!(expected, c.contains(n));
        }

        #[test]
        fn admits_another_never_overshoots(max in 0usize..20, n in 0usize..40)
        {
            let c = CountConstraint::default().with_max(max);
            if c.admits_another(n) {
                prop_assert!(c.contains(n + 1) || n + 1 <= max);
            } else {
                prop_assert!(n + 1 > max);
            }
        }
    }
}
