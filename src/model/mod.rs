//! Cluster-likelihood capability
//!
//! The sequential engine is generic over how an observation is scored
//! against a cluster and folded into it. The pointwise model
//! ([`Conjugate`]) scores probit-transformed points with the closed-form
//! NIW posterior predictive; the hierarchical model ([`McMarginal`]) scores
//! whole event mixtures with a Monte-Carlo importance estimate of the
//! marginal likelihood. One engine, two capabilities, no inheritance.
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::engine::EngineError;
use crate::prior::NiwPrior;
use crate::transform::Bounds;

mod conjugate;
mod montecarlo;

pub use conjugate::Conjugate;
pub use montecarlo::{McMarginal, DEFAULT_MC_DRAWS};

/// Predictive-likelihood and update rules plugged into the engine.
pub trait ClusterModel {
    /// What one incoming observation is.
    type Obs;
    /// Per-cluster sufficient statistics.
    type Component;
    /// An observation validated and put in scoring form (probit point, or
    /// per-grid-point log likelihoods).
    type Prepared;

    /// Force a new cluster when every assignment score vanishes, instead of
    /// failing the draw.
    const FORCE_NEW_ON_DEGENERATE: bool;

    /// Validate an incoming observation against the domain and prepare it
    /// for scoring.
    fn prepare(
        &self,
        x: &Self::Obs,
        bounds: &Bounds,
    ) -> Result<Self::Prepared, EngineError>;

    /// Log predictive likelihood of joining an existing cluster.
    fn ln_predictive(
        &self,
        comp: &Self::Component,
        prep: &Self::Prepared,
    ) -> f64;

    /// Log predictive likelihood of opening a new cluster.
    fn ln_predictive_new(&self, prep: &Self::Prepared) -> f64;

    /// Open a cluster from its first observation.
    fn open(&self, x: &Self::Obs, prep: &Self::Prepared) -> Self::Component;

    /// Fold an observation into an existing cluster.
    fn absorb(
        &self,
        comp: &mut Self::Component,
        x: &Self::Obs,
        prep: &Self::Prepared,
    );

    /// The (μ, Σ) pair a frozen mixture reports for this cluster.
    fn snapshot(&self, comp: &Self::Component) -> (DVector<f64>, DMatrix<f64>);

    /// Reset per-run state, optionally replacing the prior. The
    /// hierarchical model redraws its Monte-Carlo grid here.
    fn reset<R: Rng>(&mut self, prior: Option<NiwPrior>, rng: &mut R);

    fn prior(&self) -> &NiwPrior;
}
