//! Pointwise conjugate likelihood
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::component::Component;
use crate::engine::EngineError;
use crate::model::ClusterModel;
use crate::prior::NiwPrior;
use crate::transform::Bounds;

/// Closed-form NIW scoring of probit-transformed points.
#[derive(Debug, Clone)]
pub struct Conjugate {
    prior: NiwPrior,
}

impl Conjugate {
    pub fn new(prior: NiwPrior) -> Self {
        Conjugate { prior }
    }
}

impl ClusterModel for Conjugate {
    type Obs = DVector<f64>;
    type Component = Component;
    type Prepared = DVector<f64>;

    // Degenerate scores mean the conjugate algebra broke down; abort the
    // draw rather than inventing a cluster.
    const FORCE_NEW_ON_DEGENERATE: bool = false;

    fn prepare(
        &self,
        x: &DVector<f64>,
        bounds: &Bounds,
    ) -> Result<DVector<f64>, EngineError> {
        bounds.validate(x)?;
        Ok(bounds.to_probit(x))
    }

    fn ln_predictive(&self, comp: &Component, t: &DVector<f64>) -> f64 {
        self.prior
            .ln_predictive(t, comp.mean(), comp.scatter(), comp.n())
    }

    fn ln_predictive_new(&self, t: &DVector<f64>) -> f64 {
        let d = self.prior.ndims();
        self.prior.ln_predictive(
            t,
            &DVector::zeros(d),
            &DMatrix::zeros(d, d),
            0.0,
        )
    }

    fn open(&self, _x: &DVector<f64>, t: &DVector<f64>) -> Component {
        Component::new(t, &self.prior)
    }

    fn absorb(
        &self,
        comp: &mut Component,
        _x: &DVector<f64>,
        t: &DVector<f64>,
    ) {
        comp.observe(t, &self.prior);
    }

    fn snapshot(&self, comp: &Component) -> (DVector<f64>, DMatrix<f64>) {
        (comp.mu().clone(), comp.sigma().clone())
    }

    fn reset<R: Rng>(&mut self, prior: Option<NiwPrior>, _rng: &mut R) {
        if let Some(p) = prior {
            self.prior = p;
        }
    }

    fn prior(&self) -> &NiwPrior {
        &self.prior
    }
}
