//! Sequential infinite-mixture assignment engine
//!
//! One engine owns one inference run: observations arrive one at a time,
//! each is assigned to an existing cluster or a new one under CRP weights
//! (occupancy for existing clusters, the concentration α for a new one)
//! multiplied by the model's predictive likelihood, and the chosen
//! cluster's sufficient statistics are updated in place. Clusters are an
//! append-only arena; none are ever removed or merged within a run.
//!
//! Assignment order matters — that is a property of sequential CRP-style
//! samplers, not hidden nondeterminism — so
//! [`density_from_samples`](Engine::density_from_samples) shuffles the
//! input and two runs agree exactly only when they share a seed.
use nalgebra::DVector;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

use crate::alpha::update_alpha;
use crate::misc::pflip;
use crate::mixture::{Mixture, MixtureError};
use crate::model::{ClusterModel, Conjugate, McMarginal};
use crate::mvn::MvNormal;
use crate::prior::NiwPrior;
use crate::transform::{Bounds, BoundsError};

/// Where an observation may be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// An existing cluster, by arena index
    Existing(usize),
    /// A fresh cluster
    New,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The initial concentration parameter is not positive and finite
    InvalidAlpha { alpha: f64 },
    /// The prior dimensionality does not match the bounds
    PriorDimensionMismatch { ndims: usize, prior_ndims: usize },
    /// An observation falls outside the domain
    Domain(BoundsError),
    /// A hierarchical event was built over different bounds
    EventBoundsMismatch,
    /// An event ensemble contained no draws
    EmptyEventEnsemble,
    /// Every assignment candidate scored non-finite
    DegenerateScores { n_candidates: usize },
    /// The engine holds no clusters yet
    EmptyMixture,
    /// Freezing or querying the mixture failed
    Mixture(MixtureError),
}

/// The sequential assignment engine, generic over the cluster-likelihood
/// model.
///
/// [`Dpgmm`] assigns raw points with the closed-form conjugate predictive;
/// [`Hdpgmm`] assigns per-object mixture draws with a Monte-Carlo marginal.
pub struct Engine<M: ClusterModel> {
    bounds: Bounds,
    model: M,
    alpha: f64,
    alpha0: f64,
    components: Vec<M::Component>,
    counts: Vec<f64>,
    n_pts: usize,
}

/// Density estimation from raw samples.
pub type Dpgmm = Engine<Conjugate>;

/// Population-level density estimation from per-object mixture draws.
pub type Hdpgmm = Engine<McMarginal>;

impl<M: ClusterModel> Engine<M> {
    fn with_model(
        bounds: Bounds,
        model: M,
        alpha0: f64,
    ) -> Result<Self, EngineError> {
        if !(alpha0 > 0.0 && alpha0.is_finite()) {
            return Err(EngineError::InvalidAlpha { alpha: alpha0 });
        }
        if model.prior().ndims() != bounds.ndims() {
            return Err(EngineError::PriorDimensionMismatch {
                ndims: bounds.ndims(),
                prior_ndims: model.prior().ndims(),
            });
        }
        Ok(Engine {
            bounds,
            model,
            alpha: alpha0,
            alpha0,
            components: Vec::new(),
            counts: Vec::new(),
            n_pts: 0,
        })
    }

    #[inline]
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.bounds.ndims()
    }

    #[inline]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn n_points(&self) -> usize {
        self.n_pts
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn prior(&self) -> &NiwPrior {
        self.model.prior()
    }

    /// Cluster occupancies normalized to sum to one.
    pub fn weights(&self) -> Vec<f64> {
        let total: f64 = self.counts.iter().sum();
        self.counts.iter().map(|ct| ct / total).collect()
    }

    /// Reset to the empty state, optionally with new prior hyperparameters.
    /// The hierarchical model redraws its Monte-Carlo grid here.
    pub fn initialise<R: Rng>(
        &mut self,
        prior: Option<NiwPrior>,
        rng: &mut R,
    ) -> Result<(), EngineError> {
        if let Some(ref p) = prior {
            if p.ndims() != self.bounds.ndims() {
                return Err(EngineError::PriorDimensionMismatch {
                    ndims: self.bounds.ndims(),
                    prior_ndims: p.ndims(),
                });
            }
        }
        self.model.reset(prior, rng);
        self.alpha = self.alpha0;
        self.components.clear();
        self.counts.clear();
        self.n_pts = 0;
        Ok(())
    }

    /// CRP-weighted log scores for every candidate, in candidate order.
    fn assignment_scores(
        &self,
        prep: &M::Prepared,
    ) -> (Vec<Candidate>, Vec<f64>) {
        let k = self.components.len();
        let mut candidates = Vec::with_capacity(k + 1);
        let mut ln_scores = Vec::with_capacity(k + 1);
        for (i, (comp, ct)) in
            self.components.iter().zip(self.counts.iter()).enumerate()
        {
            candidates.push(Candidate::Existing(i));
            ln_scores.push(self.model.ln_predictive(comp, prep) + ct.ln());
        }
        candidates.push(Candidate::New);
        ln_scores.push(self.model.ln_predictive_new(prep) + self.alpha.ln());
        (candidates, ln_scores)
    }

    /// Assign one observation and resample α.
    ///
    /// Non-finite scores carry zero probability. If every score is
    /// non-finite the model's degeneracy policy applies: the conjugate
    /// model fails the draw, the hierarchical model opens a new cluster.
    pub fn add_new_point<R: Rng>(
        &mut self,
        x: &M::Obs,
        rng: &mut R,
    ) -> Result<Candidate, EngineError> {
        let prep = self.model.prepare(x, &self.bounds)?;
        let (candidates, ln_scores) = self.assignment_scores(&prep);

        // max-shift before exponentiating so a finite best candidate never
        // underflows to zero
        let shift = ln_scores
            .iter()
            .filter(|s| s.is_finite())
            .fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let choice = if shift.is_finite() {
            let probs: Vec<f64> = ln_scores
                .iter()
                .map(|&s| {
                    if s.is_finite() {
                        (s - shift).exp()
                    } else {
                        0.0
                    }
                })
                .collect();
            candidates[pflip(&probs, 1, rng)[0]]
        } else if M::FORCE_NEW_ON_DEGENERATE {
            Candidate::New
        } else {
            return Err(EngineError::DegenerateScores {
                n_candidates: candidates.len(),
            });
        };

        match choice {
            Candidate::New => {
                self.components.push(self.model.open(x, &prep));
                self.counts.push(1.0);
            }
            Candidate::Existing(i) => {
                self.model.absorb(&mut self.components[i], x, &prep);
                self.counts[i] += 1.0;
            }
        }
        self.n_pts += 1;
        self.alpha = update_alpha(
            self.alpha,
            self.n_pts,
            self.components.len(),
            rng,
        );
        Ok(choice)
    }

    /// One full draw: shuffle the samples, assign each in turn, freeze the
    /// run into a [`Mixture`], then reset so the engine can produce the
    /// next independent draw.
    pub fn density_from_samples<R: Rng>(
        &mut self,
        samples: &[M::Obs],
        rng: &mut R,
    ) -> Result<Mixture, EngineError> {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.shuffle(rng);
        for ix in order {
            self.add_new_point(&samples[ix], rng)?;
        }
        let mixture = self.build_mixture()?;
        self.initialise(None, rng)?;
        Ok(mixture)
    }

    /// Freeze the current state into an immutable [`Mixture`].
    pub fn build_mixture(&self) -> Result<Mixture, EngineError> {
        if self.components.is_empty() {
            return Err(EngineError::EmptyMixture);
        }
        let mut comps = Vec::with_capacity(self.components.len());
        for c in &self.components {
            let (mu, sigma) = self.model.snapshot(c);
            comps.push(
                MvNormal::new(mu, sigma).map_err(MixtureError::from)?,
            );
        }
        Mixture::new(comps, self.weights(), self.bounds.clone(), self.n_pts)
            .map_err(Into::into)
    }

    /// Density at a natural-space point.
    pub fn pdf(&self, x: &DVector<f64>) -> Result<f64, EngineError> {
        Ok(self.build_mixture()?.pdf(x)?)
    }

    /// Log density at a natural-space point.
    pub fn ln_pdf(&self, x: &DVector<f64>) -> Result<f64, EngineError> {
        Ok(self.build_mixture()?.ln_pdf(x)?)
    }

    /// Cumulative distribution at `x`. One-dimensional runs only.
    pub fn cdf(&self, x: f64) -> Result<f64, EngineError> {
        Ok(self.build_mixture()?.cdf(x)?)
    }

    /// Log cumulative distribution at `x`. One-dimensional runs only.
    pub fn ln_cdf(&self, x: f64) -> Result<f64, EngineError> {
        Ok(self.build_mixture()?.ln_cdf(x)?)
    }

    /// Draw one natural-space sample from the current mixture.
    pub fn draw<R: Rng>(
        &self,
        rng: &mut R,
    ) -> Result<DVector<f64>, EngineError> {
        Ok(self.build_mixture()?.draw(rng))
    }

    /// Draw `n` natural-space samples from the current mixture.
    pub fn sample<R: Rng>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<DVector<f64>>, EngineError> {
        Ok(self.build_mixture()?.sample(n, rng))
    }

    /// Gradient of the density at a natural-space point.
    pub fn gradient_pdf(
        &self,
        x: &DVector<f64>,
    ) -> Result<DVector<f64>, EngineError> {
        Ok(self.build_mixture()?.gradient_pdf(x)?)
    }

    /// Gradient of the log density at a natural-space point.
    pub fn gradient_ln_pdf(
        &self,
        x: &DVector<f64>,
    ) -> Result<DVector<f64>, EngineError> {
        Ok(self.build_mixture()?.gradient_ln_pdf(x)?)
    }
}

impl Engine<Conjugate> {
    /// New pointwise engine. Without an explicit prior the weakly
    /// informative default for the bounds' dimensionality is used.
    pub fn new(
        bounds: Bounds,
        prior: Option<NiwPrior>,
        alpha0: f64,
    ) -> Result<Self, EngineError> {
        let prior =
            prior.unwrap_or_else(|| NiwPrior::default_for(bounds.ndims()));
        Engine::with_model(bounds, Conjugate::new(prior), alpha0)
    }
}

impl Engine<McMarginal> {
    /// New hierarchical engine with a Monte-Carlo grid of `mc_draws`
    /// prior-predictive (μ, Σ) pairs
    /// (see [`DEFAULT_MC_DRAWS`](crate::model::DEFAULT_MC_DRAWS)).
    pub fn new<R: Rng>(
        bounds: Bounds,
        prior: Option<NiwPrior>,
        alpha0: f64,
        mc_draws: usize,
        rng: &mut R,
    ) -> Result<Self, EngineError> {
        let prior =
            prior.unwrap_or_else(|| NiwPrior::default_for(bounds.ndims()));
        Engine::with_model(
            bounds,
            McMarginal::new(prior, mc_draws, rng),
            alpha0,
        )
    }

    /// Ingest an object available as an ensemble of posterior draws: one
    /// draw is selected uniformly at random and assigned.
    pub fn add_new_event<R: Rng>(
        &mut self,
        draws: &[Mixture],
        rng: &mut R,
    ) -> Result<Candidate, EngineError> {
        if draws.is_empty() {
            return Err(EngineError::EmptyEventEnsemble);
        }
        let ix = rng.gen_range(0..draws.len());
        self.add_new_point(&draws[ix], rng)
    }
}

impl From<BoundsError> for EngineError {
    fn from(err: BoundsError) -> Self {
        EngineError::Domain(err)
    }
}

impl From<MixtureError> for EngineError {
    fn from(err: MixtureError) -> Self {
        EngineError::Mixture(err)
    }
}

impl std::error::Error for EngineError {}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAlpha { alpha } => write!(
                f,
                "the concentration parameter ({}) must be positive and \
                 finite",
                alpha
            ),
            Self::PriorDimensionMismatch { ndims, prior_ndims } => write!(
                f,
                "the prior is {}-dimensional but the bounds have {} \
                 dimensions",
                prior_ndims, ndims
            ),
            Self::Domain(err) => write!(f, "{}", err),
            Self::EventBoundsMismatch => write!(
                f,
                "the event mixture was built over different bounds than \
                 this engine"
            ),
            Self::EmptyEventEnsemble => {
                write!(f, "the event ensemble contains no draws")
            }
            Self::DegenerateScores { n_candidates } => write!(
                f,
                "all {} assignment scores were non-finite; the draw was \
                 aborted",
                n_candidates
            ),
            Self::EmptyMixture => write!(
                f,
                "the mixture is empty - the engine was initialised and has \
                 not assigned any observation yet"
            ),
            Self::Mixture(err) => write!(f, "{}", err),
        }
    }
}
