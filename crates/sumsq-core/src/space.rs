//! Search space model: the target value and the lattice bound

use crate::error::{Result, SearchError};
use std::fmt;
use sumsq_backends::isqrt;

/// The value every reported pair must sum to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchTarget {
    pub n: u64,
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N = {}", self.n)
    }
}

/// Inputs plus everything derived from them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSpace {
    pub x: u64,
    pub y: u64,
    pub target: SearchTarget,
    /// Inclusive bound of both lattice axes
    pub max_xy: u64,
}

impl SearchSpace {
    /// Derive `N = x² + y²` and `max_xy = isqrt(N) + 1`.
    ///
    /// Kernels evaluate `x² + y²` for points up to `max_xy` on both axes, so
    /// `2·max_xy²` must also fit in `u64`.
    pub fn new(x: u64, y: u64) -> Result<Self> {
        if x == 0 || y == 0 {
            return Err(SearchError::invalid_input(format!(
                "x and y must be positive (got x = {x}, y = {y})"
            )));
        }

        let n = x
            .checked_mul(x)
            .zip(y.checked_mul(y))
            .and_then(|(xx, yy)| xx.checked_add(yy))
            .ok_or_else(|| SearchError::overflow(format!("{x}² + {y}² does not fit in u64")))?;

        let max_xy = isqrt(n) + 1;
        max_xy
            .checked_mul(max_xy)
            .and_then(|sq| sq.checked_mul(2))
            .ok_or_else(|| SearchError::overflow(format!("lattice bound {max_xy} is too large")))?;

        Ok(Self {
            x,
            y,
            target: SearchTarget { n },
            max_xy,
        })
    }

    pub fn n(&self) -> u64 {
        self.target.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_four_five() {
        let space = SearchSpace::new(3, 4).unwrap();
        assert_eq!(space.n(), 25);
        assert_eq!(space.max_xy, 6);
        assert_eq!(space.target.to_string(), "N = 25");
    }

    #[test]
    fn default_inputs() {
        let space = SearchSpace::new(60001, 60002).unwrap();
        assert_eq!(space.n(), 7_200_360_005);
        assert_eq!(space.max_xy, 84_855);
    }

    #[test]
    fn zero_is_rejected() {
        assert!(matches!(SearchSpace::new(0, 4), Err(SearchError::InvalidInput(_))));
        assert!(matches!(SearchSpace::new(3, 0), Err(SearchError::InvalidInput(_))));
    }

    #[test]
    fn overflow_is_rejected() {
        assert!(matches!(SearchSpace::new(u64::MAX, 1), Err(SearchError::Overflow(_))));
        // Sum fits but 2·max_xy² does not.
        assert!(matches!(SearchSpace::new(3_037_000_499, 1), Err(SearchError::Overflow(_))));
    }
}
