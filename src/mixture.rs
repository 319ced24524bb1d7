//! Frozen Gaussian-mixture draw
//!
//! A [`Mixture`] is the immutable snapshot an engine produces from one
//! inference run: component Gaussians in probit space, count-derived
//! weights, and the domain bounds needed to evaluate, sample, and
//! differentiate in the natural space. Every query follows the same shape:
//! transform the input to probit space, evaluate there, correct the result
//! through the log-Jacobian.
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use itertools::izip;
use nalgebra::{dvector, DVector};
use rand::Rng;
use special::Error as _;
use std::f64::consts::SQRT_2;
use std::fmt;

use crate::consts::HALF_LN_2PI;
use crate::misc::{logsumexp, pflip};
use crate::mvn::{MvNormal, MvNormalError};
use crate::transform::{Bounds, BoundsError};

/// A single density draw: finite Gaussian mixture over a bounded domain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Mixture {
    components: Vec<MvNormal>,
    weights: Vec<f64>,
    ln_weights: Vec<f64>,
    bounds: Bounds,
    n_pts: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum MixtureError {
    /// No components were supplied
    EmptyComponents,
    /// Weight and component counts differ
    WeightsLengthMismatch {
        n_components: usize,
        n_weights: usize,
    },
    /// A component's dimensionality does not match the bounds
    ComponentDimensionMismatch {
        index: usize,
        ndims: usize,
        got: usize,
    },
    /// A weight is negative or non-finite
    InvalidWeight { index: usize, weight: f64 },
    /// The weights sum to zero
    ZeroTotalWeight,
    /// A component covariance is not positive definite
    Component(MvNormalError),
    /// A query point falls outside the domain
    Domain(BoundsError),
    /// The cumulative distribution is defined in one dimension only
    CdfNotOneDimensional { ndims: usize },
}

impl Mixture {
    /// Freeze a mixture from probit-space components and unnormalized
    /// weights.
    pub fn new(
        components: Vec<MvNormal>,
        weights: Vec<f64>,
        bounds: Bounds,
        n_pts: usize,
    ) -> Result<Self, MixtureError> {
        if components.is_empty() {
            return Err(MixtureError::EmptyComponents);
        }
        if components.len() != weights.len() {
            return Err(MixtureError::WeightsLengthMismatch {
                n_components: components.len(),
                n_weights: weights.len(),
            });
        }
        for (index, c) in components.iter().enumerate() {
            if c.ndims() != bounds.ndims() {
                return Err(MixtureError::ComponentDimensionMismatch {
                    index,
                    ndims: bounds.ndims(),
                    got: c.ndims(),
                });
            }
        }
        for (index, &w) in weights.iter().enumerate() {
            if !w.is_finite() || w < 0.0 {
                return Err(MixtureError::InvalidWeight { index, weight: w });
            }
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(MixtureError::ZeroTotalWeight);
        }
        let weights: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let ln_weights: Vec<f64> = weights.iter().map(|w| w.ln()).collect();
        Ok(Mixture {
            components,
            weights,
            ln_weights,
            bounds,
            n_pts,
        })
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.bounds.ndims()
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Number of observations the producing run assigned.
    #[inline]
    pub fn n_points(&self) -> usize {
        self.n_pts
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn ln_weights(&self) -> &[f64] {
        &self.ln_weights
    }

    #[inline]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// The probit-space component Gaussians.
    #[inline]
    pub fn components(&self) -> &[MvNormal] {
        &self.components
    }

    /// Log density at a probit-space point.
    pub(crate) fn ln_pdf_probit(&self, t: &DVector<f64>) -> f64 {
        let terms: Vec<f64> = izip!(&self.ln_weights, &self.components)
            .map(|(lw, c)| lw + c.ln_pdf(t))
            .collect();
        logsumexp(&terms)
    }

    /// Log density at a natural-space point.
    pub fn ln_pdf(&self, x: &DVector<f64>) -> Result<f64, MixtureError> {
        self.bounds.validate(x)?;
        let t = self.bounds.to_probit(x);
        Ok(self.ln_pdf_probit(&t) - self.bounds.ln_jacobian(&t))
    }

    /// Density at a natural-space point.
    pub fn pdf(&self, x: &DVector<f64>) -> Result<f64, MixtureError> {
        self.ln_pdf(x).map(|ln_p| ln_p.exp())
    }

    /// Cumulative distribution at `x`. One-dimensional mixtures only.
    pub fn cdf(&self, x: f64) -> Result<f64, MixtureError> {
        if self.ndims() > 1 {
            return Err(MixtureError::CdfNotOneDimensional {
                ndims: self.ndims(),
            });
        }
        let xv = dvector![x];
        self.bounds.validate(&xv)?;
        let t = self.bounds.to_probit(&xv)[0];
        let cdf = izip!(&self.weights, &self.components)
            .map(|(w, c)| {
                let z = (t - c.mu()[0]) / c.cov()[(0, 0)].sqrt();
                w * 0.5 * (1.0 + (z / SQRT_2).error())
            })
            .sum();
        Ok(cdf)
    }

    /// Log cumulative distribution at `x`. One-dimensional mixtures only.
    pub fn ln_cdf(&self, x: f64) -> Result<f64, MixtureError> {
        self.cdf(x).map(|c| c.ln())
    }

    /// Draw one natural-space sample: categorical component pick, Gaussian
    /// draw in probit space, inverse transform.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        let ix = pflip(&self.weights, 1, rng)[0];
        let t = self.components[ix].draw(rng);
        self.bounds.from_probit(&t)
    }

    /// Draw `n` natural-space samples.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<DVector<f64>> {
        (0..n).map(|_| self.draw(rng)).collect()
    }

    /// Gradient of the log density with respect to the natural-space
    /// coordinates.
    pub fn gradient_ln_pdf(
        &self,
        x: &DVector<f64>,
    ) -> Result<DVector<f64>, MixtureError> {
        self.bounds.validate(x)?;
        let t = self.bounds.to_probit(x);

        let ln_qs: Vec<f64> = izip!(&self.ln_weights, &self.components)
            .map(|(lw, c)| lw + c.ln_pdf(&t))
            .collect();
        let ln_q = logsumexp(&ln_qs);

        // ∂ ln q / ∂t = Σₖ rₖ · (−Σₖ⁻¹(t − mₖ)), rₖ the posterior
        // responsibilities
        let mut u = DVector::zeros(self.ndims());
        for (ln_qk, c) in izip!(&ln_qs, &self.components) {
            let r = (ln_qk - ln_q).exp();
            u -= c.solve_centered(&t) * r;
        }

        // chain rule through the probit map: dtᵢ/dxᵢ = e^{−lnJᵢ}
        let grad = DVector::from_iterator(
            self.ndims(),
            (0..self.ndims()).map(|i| {
                let width = self.bounds.upper()[i] - self.bounds.lower()[i];
                let ln_j_i =
                    (-0.5 * t[i]).mul_add(t[i], -HALF_LN_2PI) + width.ln();
                (u[i] + t[i]) * (-ln_j_i).exp()
            }),
        );
        Ok(grad)
    }

    /// Gradient of the density with respect to the natural-space
    /// coordinates.
    pub fn gradient_pdf(
        &self,
        x: &DVector<f64>,
    ) -> Result<DVector<f64>, MixtureError> {
        let p = self.pdf(x)?;
        self.gradient_ln_pdf(x).map(|g| g * p)
    }
}

impl From<BoundsError> for MixtureError {
    fn from(err: BoundsError) -> Self {
        MixtureError::Domain(err)
    }
}

impl From<MvNormalError> for MixtureError {
    fn from(err: MvNormalError) -> Self {
        MixtureError::Component(err)
    }
}

impl std::error::Error for MixtureError {}

impl fmt::Display for MixtureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyComponents => {
                write!(f, "a mixture needs at least one component")
            }
            Self::WeightsLengthMismatch {
                n_components,
                n_weights,
            } => write!(
                f,
                "{} components but {} weights",
                n_components, n_weights
            ),
            Self::ComponentDimensionMismatch { index, ndims, got } => write!(
                f,
                "component {} is {}-dimensional but the bounds have {} \
                 dimensions",
                index, got, ndims
            ),
            Self::InvalidWeight { index, weight } => write!(
                f,
                "weight {} at index {} must be finite and non-negative",
                weight, index
            ),
            Self::ZeroTotalWeight => {
                write!(f, "the mixture weights sum to zero")
            }
            Self::Component(err) => write!(f, "{}", err),
            Self::Domain(err) => write!(f, "{}", err),
            Self::CdfNotOneDimensional { ndims } => write!(
                f,
                "the cdf is provided only for 1-dimensional densities \
                 (this mixture has {} dimensions)",
                ndims
            ),
        }
    }
}
