//! Probit coordinate change between a bounded rectangle and ℝ<sup>d</sup>
//!
//! Every density in this crate lives on a rectangular domain. Inference runs
//! in the unconstrained space reached through the per-dimension map
//! t(x) = Φ⁻¹((x − lo)/(hi − lo)), where Φ is the standard normal cdf. The
//! log-Jacobian of the inverse map converts probit-space densities back to
//! the natural space without resampling.
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::DVector;
use special::Error as _;
use std::f64::consts::SQRT_2;
use std::fmt;

use crate::consts::HALF_LN_2PI;

/// Rectangular domain, one `[lo, hi]` interval per dimension.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum BoundsError {
    /// No intervals were supplied
    Empty,
    /// An interval is inverted, empty, or non-finite
    InvalidInterval { axis: usize, lo: f64, hi: f64 },
    /// A point has the wrong number of coordinates
    DimensionMismatch { ndims: usize, len: usize },
    /// A coordinate falls outside its interval
    OutOfDomain {
        axis: usize,
        value: f64,
        lo: f64,
        hi: f64,
    },
}

impl Bounds {
    /// Create bounds from `(lo, hi)` pairs.
    pub fn new(intervals: &[(f64, f64)]) -> Result<Self, BoundsError> {
        if intervals.is_empty() {
            return Err(BoundsError::Empty);
        }
        for (axis, &(lo, hi)) in intervals.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(BoundsError::InvalidInterval { axis, lo, hi });
            }
        }
        let lower =
            DVector::from_iterator(intervals.len(), intervals.iter().map(|b| b.0));
        let upper =
            DVector::from_iterator(intervals.len(), intervals.iter().map(|b| b.1));
        Ok(Bounds { lower, upper })
    }

    /// Number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.lower.len()
    }

    #[inline]
    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    #[inline]
    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    /// `true` if `x` has the right length and lies strictly inside the
    /// rectangle.
    pub fn contains(&self, x: &DVector<f64>) -> bool {
        self.validate(x).is_ok()
    }

    /// Check that `x` is a valid interior point, reporting the offending
    /// axis otherwise.
    pub fn validate(&self, x: &DVector<f64>) -> Result<(), BoundsError> {
        if x.len() != self.ndims() {
            return Err(BoundsError::DimensionMismatch {
                ndims: self.ndims(),
                len: x.len(),
            });
        }
        for axis in 0..self.ndims() {
            let (lo, hi) = (self.lower[axis], self.upper[axis]);
            let value = x[axis];
            if !(lo < value && value < hi) {
                return Err(BoundsError::OutOfDomain {
                    axis,
                    value,
                    lo,
                    hi,
                });
            }
        }
        Ok(())
    }

    /// Map a natural-space point to probit space.
    ///
    /// Coordinates on or outside the boundary map to non-finite values;
    /// callers that cannot tolerate that must [`validate`](Self::validate)
    /// first.
    pub fn to_probit(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.ndims(),
            (0..self.ndims()).map(|i| {
                let p = (x[i] - self.lower[i])
                    / (self.upper[i] - self.lower[i]);
                SQRT_2 * 2.0_f64.mul_add(p, -1.0).inv_error()
            }),
        )
    }

    /// Map a probit-space point back to the natural space. Exact two-sided
    /// inverse of [`to_probit`](Self::to_probit) on the open rectangle.
    pub fn from_probit(&self, t: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.ndims(),
            (0..self.ndims()).map(|i| {
                let cdf = 0.5 * (1.0 + (t[i] / SQRT_2).error());
                (self.upper[i] - self.lower[i]).mul_add(cdf, self.lower[i])
            }),
        )
    }

    /// Log-Jacobian ln|dx/dt| of the inverse map at probit-space `t`:
    /// Σᵢ (−tᵢ²/2 − ln(2π)/2 + ln(hiᵢ − loᵢ)).
    pub fn ln_jacobian(&self, t: &DVector<f64>) -> f64 {
        (0..self.ndims()).fold(0.0, |acc, i| {
            acc - 0.5 * t[i] * t[i] - HALF_LN_2PI
                + (self.upper[i] - self.lower[i]).ln()
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..self.ndims() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}, {}]", self.lower[i], self.upper[i])?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for BoundsError {}

impl fmt::Display for BoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "bounds must have at least one interval"),
            Self::InvalidInterval { axis, lo, hi } => write!(
                f,
                "interval [{}, {}] on axis {} is not a finite, non-empty \
                 range",
                lo, hi, axis
            ),
            Self::DimensionMismatch { ndims, len } => write!(
                f,
                "point has {} coordinates but the bounds have {} dimensions",
                len, ndims
            ),
            Self::OutOfDomain {
                axis,
                value,
                lo,
                hi,
            } => write!(
                f,
                "coordinate {} on axis {} falls outside the open interval \
                 ({}, {})",
                value, axis, lo, hi
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;
    use proptest::prelude::*;

    const TOL: f64 = 1E-10;

    #[test]
    fn new_rejects_empty() {
        assert_eq!(Bounds::new(&[]), Err(BoundsError::Empty));
    }

    #[test]
    fn new_rejects_inverted_interval() {
        let res = Bounds::new(&[(0.0, 1.0), (2.0, 2.0)]);
        assert_eq!(
            res,
            Err(BoundsError::InvalidInterval {
                axis: 1,
                lo: 2.0,
                hi: 2.0
            })
        );
    }

    #[test]
    fn probit_of_midpoint_is_zero() {
        let bounds = Bounds::new(&[(-10.0, 10.0)]).unwrap();
        let t = bounds.to_probit(&dvector![0.0]);
        assert::close(t[0], 0.0, TOL);
    }

    #[test]
    fn probit_of_known_quantile() {
        let bounds = Bounds::new(&[(0.0, 1.0)]).unwrap();
        // Φ(1) = 0.8413447460685429
        let t = bounds.to_probit(&dvector![0.841_344_746_068_542_9]);
        assert::close(t[0], 1.0, 1E-8);
    }

    #[test]
    fn probit_outside_domain_is_non_finite() {
        let bounds = Bounds::new(&[(-1.0, 1.0)]).unwrap();
        let t = bounds.to_probit(&dvector![1.5]);
        assert!(!t[0].is_finite());
        let t = bounds.to_probit(&dvector![-1.0]);
        assert!(!t[0].is_finite());
    }

    #[test]
    fn validate_reports_offending_axis() {
        let bounds = Bounds::new(&[(-1.0, 1.0), (0.0, 4.0)]).unwrap();
        let res = bounds.validate(&dvector![0.2, 4.3]);
        assert_eq!(
            res,
            Err(BoundsError::OutOfDomain {
                axis: 1,
                value: 4.3,
                lo: 0.0,
                hi: 4.0
            })
        );
    }

    #[test]
    fn validate_rejects_wrong_length() {
        let bounds = Bounds::new(&[(-1.0, 1.0), (0.0, 4.0)]).unwrap();
        let res = bounds.validate(&dvector![0.2]);
        assert_eq!(
            res,
            Err(BoundsError::DimensionMismatch { ndims: 2, len: 1 })
        );
    }

    #[test]
    fn ln_jacobian_at_origin() {
        let bounds = Bounds::new(&[(0.0, 1.0)]).unwrap();
        let lnj = bounds.ln_jacobian(&dvector![0.0]);
        // -0.5 ln(2π) + ln(1)
        assert::close(lnj, -0.918_938_533_204_672_7, TOL);
    }

    #[test]
    fn ln_jacobian_sums_over_dimensions() {
        let bounds = Bounds::new(&[(0.0, 1.0), (0.0, 2.0)]).unwrap();
        let lnj = bounds.ln_jacobian(&dvector![0.5, -0.5]);
        let expected = -0.5 * 0.25 - 0.918_938_533_204_672_7
            + (-0.5 * 0.25 - 0.918_938_533_204_672_7 + 2.0_f64.ln());
        assert::close(lnj, expected, TOL);
    }

    proptest! {
        #[test]
        fn probit_round_trip(x in -9.9..9.9_f64, y in 0.01..1.99_f64) {
            let bounds = Bounds::new(&[(-10.0, 10.0), (0.0, 2.0)]).unwrap();
            let p = dvector![x, y];
            let rt = bounds.from_probit(&bounds.to_probit(&p));
            prop_assert!((rt[0] - x).abs() < 1E-6);
            prop_assert!((rt[1] - y).abs() < 1E-6);
        }
    }
}
