//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

use cgmath::num_traits::Float;
use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: std::cmp::PartialOrd> Interval<T> {
    /// Returns true if the value lies in `[min, max)`.
    pub fn contains_half_open(&self, value: T) -> bool {
        value >= self.min && value < self.max
    }
}

impl<T: Float> Interval<T> {
    /// Creates an interval with the given centre and radius.
    pub fn disc(centre: T, radius: T) -> Self {
        Self {
            min: centre - radius,
            max: centre + radius,
        }
    }

    /// Returns the centre/mid-point of the interval.
    pub fn midpoint(&self) -> T {
        (self.min + self.max) / (T::one() + T::one())
    }

    /// Computes the distance between a point and the interval.
    /// Will be negative if the point is within the interval.
    pub fn distance(&self, other: T) -> T {
        T::max(other - self.max, self.min - other)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

#[cfg(test)]
mod test {
    use super::Interval;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn half_open_excludes_max() {
        let range = Interval::<f64>::new(-4.0, 4.0);
        assert!(range.contains_half_open(-4.0));
        assert!(range.contains_half_open(3.999));
        assert!(!range.contains_half_open(4.0));
    }

    #[test]
    fn distance_is_signed() {
        let range = Interval::<f64>::disc(10.0, 2.0);
        assert_approx_eq!(range.midpoint(), 10.0);
        assert_approx_eq!(range.max - range.min, 4.0);
        assert_approx_eq!(range.distance(15.0), 3.0);
        assert_approx_eq!(range.distance(5.0), 3.0);
        assert_approx_eq!(range.distance(10.0), -2.0);
    }
}
