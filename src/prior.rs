//! Normal-Inverse-Wishart prior on the (μ, Σ) of mixture components
//!
//! Ν(μ, Σ) ~ NIW(μ<sub>0</sub>, κ, ν, Ψ) implies μ ~ N(μ<sub>0</sub>, Σ/κ)
//! and Σ ~ W<sup>-1</sup>(Ψ, ν). Conjugacy gives closed-form posterior
//! hyperparameters from a cluster's running (mean, scatter, count) and a
//! multivariate Student-t posterior predictive for candidate scoring.
//!
//! The prior operates in probit space: its scale is specified as the
//! expected component covariance there, and the elicitation helpers
//! ([`NiwPrior::from_samples`], [`NiwPrior::from_natural`]) push natural-space
//! information through the probit map first.
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use special::Gamma as _;
use std::f64::consts::PI;
use std::fmt;

use crate::mvn::{MvNormal, MvNormalError};
use crate::transform::{Bounds, BoundsError};
use crate::wishart::InvWishart;

/// NIW hyperparameters (κ, μ<sub>0</sub>, ν, Ψ).
///
/// ν is clamped to at least d + 2 at construction and the supplied expected
/// covariance is rescaled by (ν − d − 1) into the stored Wishart scale, so
/// that `scale / (ν − d − 1)` recovers the prior mean covariance.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct NiwPrior {
    mu: DVector<f64>,
    k: f64,
    nu: f64,
    scale: DMatrix<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum NiwError {
    /// The κ parameter is non-positive or non-finite
    KTooLow { k: f64 },
    /// The ν parameter is not finite
    NuNotFinite { nu: f64 },
    /// The scale matrix is not square
    ScaleNotSquare { nrows: usize, ncols: usize },
    /// The dimensions of μ and the scale matrix do not align
    MuScaleDimensionMismatch { n_mu: usize, n_scale: usize },
    /// The scale matrix has no Cholesky factorization
    ScaleNotPositiveDefinite,
    /// An elicitation mean lies outside the domain
    MeanOutsideBounds { axis: usize, value: f64 },
    /// An elicitation sample lies outside the domain
    SampleOutsideBounds {
        index: usize,
        axis: usize,
        value: f64,
    },
    /// Elicitation input does not match the domain dimensionality
    DimensionMismatch { ndims: usize, len: usize },
    /// Too few usable samples to estimate a covariance
    TooFewSamples { n: usize },
}

fn validate_params(
    mu: &DVector<f64>,
    k: f64,
    nu: f64,
    scale: &DMatrix<f64>,
) -> Result<(), NiwError> {
    if k <= 0.0 || !k.is_finite() {
        Err(NiwError::KTooLow { k })
    } else if !nu.is_finite() {
        Err(NiwError::NuNotFinite { nu })
    } else if !scale.is_square() {
        Err(NiwError::ScaleNotSquare {
            nrows: scale.nrows(),
            ncols: scale.ncols(),
        })
    } else if mu.len() != scale.nrows() {
        Err(NiwError::MuScaleDimensionMismatch {
            n_mu: mu.len(),
            n_scale: scale.nrows(),
        })
    } else if scale.clone().cholesky().is_none() {
        Err(NiwError::ScaleNotPositiveDefinite)
    } else {
        Ok(())
    }
}

impl NiwPrior {
    /// Create a prior from (μ<sub>0</sub>, κ, ν, expected covariance).
    pub fn new(
        mu: DVector<f64>,
        k: f64,
        nu: f64,
        expected_cov: DMatrix<f64>,
    ) -> Result<Self, NiwError> {
        validate_params(&mu, k, nu, &expected_cov)?;
        let d = mu.len() as f64;
        let nu = nu.max(d + 2.0);
        let scale = expected_cov * (nu - d - 1.0);
        Ok(NiwPrior { mu, k, nu, scale })
    }

    /// Weakly informative default: κ = 10⁻², expected covariance 0.2²·I,
    /// ν = d + 2, μ<sub>0</sub> at the probit-space origin.
    pub fn default_for(ndims: usize) -> Self {
        NiwPrior::new(
            DVector::zeros(ndims),
            1E-2,
            ndims as f64 + 2.0,
            DMatrix::identity(ndims, ndims) * 0.04,
        )
        .expect("default prior parameters are valid")
    }

    /// Elicit a prior from probit-transformed `samples`: μ<sub>0</sub> at
    /// their mean, expected covariance a conservative fraction of their
    /// spread with per-axis standard deviation capped at 0.2.
    pub fn from_samples(
        bounds: &Bounds,
        samples: &[DVector<f64>],
    ) -> Result<Self, NiwError> {
        if samples.len() < 2 {
            return Err(NiwError::TooFewSamples { n: samples.len() });
        }
        for (index, x) in samples.iter().enumerate() {
            match bounds.validate(x) {
                Ok(()) => {}
                Err(BoundsError::OutOfDomain { axis, value, .. }) => {
                    return Err(NiwError::SampleOutsideBounds {
                        index,
                        axis,
                        value,
                    })
                }
                Err(_) => {
                    return Err(NiwError::DimensionMismatch {
                        ndims: bounds.ndims(),
                        len: x.len(),
                    })
                }
            }
        }
        let probit: Vec<DVector<f64>> =
            samples.iter().map(|x| bounds.to_probit(x)).collect();
        let (mean, cov) = sample_moments(&probit);
        let expected_cov = capped_cov(cov / 9.0)?;
        NiwPrior::new(mean, 1E-2, bounds.ndims() as f64 + 2.0, expected_cov)
    }

    /// Elicit a prior from a natural-space covariance by pushing draws of
    /// N(domain center, `cov`) through the probit map (in-bounds draws only)
    /// and taking their empirical covariance. An explicit natural-space
    /// `mean` overrides the probit-space origin.
    pub fn from_natural<R: Rng>(
        bounds: &Bounds,
        mean: Option<&DVector<f64>>,
        cov: &DMatrix<f64>,
        rng: &mut R,
    ) -> Result<Self, NiwError> {
        let d = bounds.ndims();
        let mu = match mean {
            Some(m) => {
                match bounds.validate(m) {
                    Ok(()) => {}
                    Err(BoundsError::OutOfDomain { axis, value, .. }) => {
                        return Err(NiwError::MeanOutsideBounds {
                            axis,
                            value,
                        })
                    }
                    Err(_) => {
                        return Err(NiwError::DimensionMismatch {
                            ndims: d,
                            len: m.len(),
                        })
                    }
                }
                bounds.to_probit(m)
            }
            None => DVector::zeros(d),
        };

        let center = (bounds.lower() + bounds.upper()) / 2.0;
        let proposal =
            MvNormal::new(center, cov.clone()).map_err(|err| match err {
                MvNormalError::DimensionMismatch { n_cov, .. } => {
                    NiwError::DimensionMismatch { ndims: d, len: n_cov }
                }
                _ => NiwError::ScaleNotPositiveDefinite,
            })?;
        let probit: Vec<DVector<f64>> = (0..10_000)
            .map(|_| proposal.draw(rng))
            .filter(|x| bounds.contains(x))
            .map(|x| bounds.to_probit(&x))
            .collect();
        if probit.len() < 2 {
            return Err(NiwError::TooFewSamples { n: probit.len() });
        }
        let (_, probit_cov) = sample_moments(&probit);
        NiwPrior::new(mu, 1E-2, d as f64 + 2.0, probit_cov)
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.mu.len()
    }

    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    #[inline]
    pub fn k(&self) -> f64 {
        self.k
    }

    #[inline]
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// The stored Wishart scale matrix Ψ (already rescaled by ν − d − 1).
    #[inline]
    pub fn scale(&self) -> &DMatrix<f64> {
        &self.scale
    }

    /// Posterior hyperparameters (κ_n, μ_n, ν_n, Ψ_n) given a cluster's
    /// running mean, centered scatter matrix, and count.
    pub fn posterior_params(
        &self,
        mean: &DVector<f64>,
        scatter: &DMatrix<f64>,
        n: f64,
    ) -> (f64, DVector<f64>, f64, DMatrix<f64>) {
        let k_n = self.k + n;
        let mu_n = (&self.mu * self.k + mean * n) / k_n;
        let nu_n = self.nu + n;
        let diff = mean - &self.mu;
        let l_n = &self.scale
            + scatter
            + (&diff * diff.transpose()) * (self.k * n / k_n);
        (k_n, mu_n, nu_n, l_n)
    }

    /// Log posterior-predictive density of a probit-space point `t` under a
    /// cluster with the given sufficient statistics: multivariate Student-t
    /// with df = ν_n − d + 1, location μ_n, shape Ψ_n(κ_n+1)/(κ_n·df).
    ///
    /// Returns `-∞` when the shape matrix is not positive definite.
    pub fn ln_predictive(
        &self,
        t: &DVector<f64>,
        mean: &DVector<f64>,
        scatter: &DMatrix<f64>,
        n: f64,
    ) -> f64 {
        let d = self.ndims() as f64;
        let (k_n, mu_n, nu_n, l_n) = self.posterior_params(mean, scatter, n);
        let df = nu_n - d + 1.0;
        let shape = l_n * ((k_n + 1.0) / (k_n * df));
        ln_mvt(t, df, &mu_n, &shape)
    }

    /// Posterior (μ, Σ) point estimates: the posterior mean location and
    /// the maximum-a-posteriori covariance Ψ_n/(ν_n − d − 1).
    pub fn map_estimates(
        &self,
        mean: &DVector<f64>,
        scatter: &DMatrix<f64>,
        n: f64,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let d = self.ndims() as f64;
        let (_, mu_n, nu_n, l_n) = self.posterior_params(mean, scatter, n);
        let sigma = l_n / (nu_n - d - 1.0);
        (mu_n, sigma)
    }

    /// Draw one (μ, Σ) pair from the prior predictive: Σ ~ W⁻¹(Ψ, ν),
    /// μ ~ N(μ<sub>0</sub>, Σ/κ).
    pub fn draw_component<R: Rng>(
        &self,
        rng: &mut R,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let sigma = InvWishart::new(&self.scale, self.nu).draw(rng);
        let mvn = MvNormal::new(self.mu.clone(), &sigma / self.k)
            .expect("inverse-Wishart draw is positive definite");
        (mvn.draw(rng), sigma)
    }
}

/// Log density of the multivariate Student-t with `df` degrees of freedom.
///
/// Returns `-∞` when `shape` is not positive definite.
pub(crate) fn ln_mvt(
    t: &DVector<f64>,
    df: f64,
    mu: &DVector<f64>,
    shape: &DMatrix<f64>,
) -> f64 {
    let d = mu.len() as f64;
    match shape.clone().cholesky() {
        Some(chol) => {
            let ln_det = 2.0
                * chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>();
            let diff = t - mu;
            let maha = diff.dot(&chol.solve(&diff));
            let half = 0.5 * (df + d);
            half.mul_add(-(maha / df).ln_1p(), (0.5 * (df + d)).ln_gamma().0)
                - (0.5 * df).ln_gamma().0
                - 0.5 * d * (df * PI).ln()
                - 0.5 * ln_det
        }
        None => f64::NEG_INFINITY,
    }
}

fn sample_moments(xs: &[DVector<f64>]) -> (DVector<f64>, DMatrix<f64>) {
    let d = xs[0].len();
    let n = xs.len() as f64;
    let mean = xs.iter().fold(DVector::zeros(d), |acc, x| acc + x) / n;
    let cov = xs.iter().fold(DMatrix::zeros(d, d), |acc, x| {
        let diff = x - &mean;
        acc + &diff * diff.transpose()
    }) / (n - 1.0);
    (mean, cov)
}

/// Cap per-axis standard deviations at 0.2, preserving correlations.
fn capped_cov(cov: DMatrix<f64>) -> Result<DMatrix<f64>, NiwError> {
    let d = cov.nrows();
    let mut sd = Vec::with_capacity(d);
    for i in 0..d {
        let s = cov[(i, i)].sqrt();
        if !(s > 0.0) {
            return Err(NiwError::ScaleNotPositiveDefinite);
        }
        sd.push(s);
    }
    let mut out = cov;
    for i in 0..d {
        for j in 0..d {
            let cap_i = sd[i].min(0.2) / sd[i];
            let cap_j = sd[j].min(0.2) / sd[j];
            out[(i, j)] *= cap_i * cap_j;
        }
    }
    Ok(out)
}

impl fmt::Display for NiwPrior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NIW (\n μ: {}\n κ: {}\n ν: {}\n Ψ: {}",
            self.mu, self.k, self.nu, self.scale
        )
    }
}

impl std::error::Error for NiwError {}

impl fmt::Display for NiwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KTooLow { k } => {
                write!(f, "κ ({}) must be positive and finite", k)
            }
            Self::NuNotFinite { nu } => {
                write!(f, "ν ({}) must be finite", nu)
            }
            Self::ScaleNotSquare { nrows, ncols } => {
                write!(f, "the scale matrix is not square: {} x {}", nrows, ncols)
            }
            Self::MuScaleDimensionMismatch { n_mu, n_scale } => write!(
                f,
                "the μ vector ({} entries) must match the scale matrix \
                 ({} rows)",
                n_mu, n_scale
            ),
            Self::ScaleNotPositiveDefinite => {
                write!(f, "the scale matrix is not positive definite")
            }
            Self::MeanOutsideBounds { axis, value } => write!(
                f,
                "the requested prior mean ({} on axis {}) lies outside the \
                 domain",
                value, axis
            ),
            Self::SampleOutsideBounds { index, axis, value } => write!(
                f,
                "sample {} lies outside the domain ({} on axis {})",
                index, value, axis
            ),
            Self::DimensionMismatch { ndims, len } => write!(
                f,
                "elicitation input has {} dimensions but the domain has {}",
                len, ndims
            ),
            Self::TooFewSamples { n } => write!(
                f,
                "at least two in-bounds samples are required, got {}",
                n
            ),
        }
    }
}
