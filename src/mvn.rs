//! Multivariate normal kernel used for mixture components
//!
//! The Cholesky factor and log-determinant are computed once at construction
//! so that repeated density and gradient evaluations cost one triangular
//! solve instead of a fresh factorization.
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

use crate::consts::LN_2PI;

/// Gaussian 𝒩(μ, Σ) over ℝ<sup>d</sup> with a cached factorization.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct MvNormal {
    mu: DVector<f64>,
    cov: DMatrix<f64>,
    chol_l: DMatrix<f64>,
    ln_det: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum MvNormalError {
    /// The dimensions of μ and Σ do not align
    DimensionMismatch { n_mu: usize, n_cov: usize },
    /// Σ is not square
    CovNotSquare { nrows: usize, ncols: usize },
    /// Σ has no Cholesky factorization
    NotPositiveDefinite,
}

impl MvNormal {
    pub fn new(
        mu: DVector<f64>,
        cov: DMatrix<f64>,
    ) -> Result<Self, MvNormalError> {
        if !cov.is_square() {
            return Err(MvNormalError::CovNotSquare {
                nrows: cov.nrows(),
                ncols: cov.ncols(),
            });
        }
        if mu.len() != cov.nrows() {
            return Err(MvNormalError::DimensionMismatch {
                n_mu: mu.len(),
                n_cov: cov.nrows(),
            });
        }
        let chol = cov
            .clone()
            .cholesky()
            .ok_or(MvNormalError::NotPositiveDefinite)?;
        let chol_l = chol.unpack();
        let ln_det =
            2.0 * chol_l.diagonal().iter().map(|d| d.ln()).sum::<f64>();
        Ok(MvNormal {
            mu,
            cov,
            chol_l,
            ln_det,
        })
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
    pub fn cov(&self) -> &DMatrix<f64> {
        &self.cov
    }

    /// Log density at `x`.
    pub fn ln_pdf(&self, x: &DVector<f64>) -> f64 {
        let diff = x - &self.mu;
        let z = self
            .chol_l
            .solve_lower_triangular(&diff)
            .expect("triangular solve failed");
        let maha = z.norm_squared();
        -0.5 * ((self.ndims() as f64).mul_add(LN_2PI, self.ln_det) + maha)
    }

    /// Σ⁻¹(x − μ), via two triangular solves.
    pub fn solve_centered(&self, x: &DVector<f64>) -> DVector<f64> {
        let diff = x - &self.mu;
        let y = self
            .chol_l
            .solve_lower_triangular(&diff)
            .expect("triangular solve failed");
        self.chol_l
            .transpose()
            .solve_upper_triangular(&y)
            .expect("triangular solve failed")
    }

    /// Single draw, μ + Lz with z standard normal.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        let z = DVector::from_iterator(
            self.ndims(),
            (0..self.ndims()).map(|_| rng.sample::<f64, _>(StandardNormal)),
        );
        &self.mu + &self.chol_l * z
    }

    /// One-shot log density without caching a factorization.
    ///
    /// A covariance with no Cholesky factorization yields `-∞`: a degenerate
    /// candidate contributes zero probability rather than poisoning the
    /// caller with a NaN.
    pub fn ln_pdf_raw(
        x: &DVector<f64>,
        mu: &DVector<f64>,
        cov: &DMatrix<f64>,
    ) -> f64 {
        match cov.clone().cholesky() {
            Some(chol) => {
                let ln_det = 2.0
                    * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
                let diff = x - mu;
                let maha = diff.dot(&chol.solve(&diff));
                -0.5 * ((mu.len() as f64).mul_add(LN_2PI, ln_det) + maha)
            }
            None => f64::NEG_INFINITY,
        }
    }
}

impl std::error::Error for MvNormalError {}

impl fmt::Display for MvNormalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { n_mu, n_cov } => write!(
                f,
                "μ has {} entries but Σ is {}-dimensional",
                n_mu, n_cov
            ),
            Self::CovNotSquare { nrows, ncols } => {
                write!(f, "Σ must be square, got {} x {}", nrows, ncols)
            }
            Self::NotPositiveDefinite => {
                write!(f, "Σ is not positive definite")
            }
        }
    }
}
