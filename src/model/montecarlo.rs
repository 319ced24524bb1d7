//! Monte-Carlo marginal likelihood for hierarchical inference
//!
//! Observations are whole event mixtures (per-object posterior draws). A
//! fixed grid of (μ, Σ) pairs drawn from the prior predictive is shared by
//! the entire run; a cluster's membership likelihood is the importance
//! estimate
//!
//! ∫ L(event | μ, Σ) p(μ, Σ | cluster) d(μ,Σ)
//!   ≈ logsumexp(logL_D + logL_x) − logsumexp(logL_D)
//!
//! where logL_x is the event's log likelihood at each grid point and logL_D
//! the cluster's accumulated grid log likelihoods.
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::component::HierComponent;
use crate::engine::EngineError;
use crate::misc::logsumexp;
use crate::mixture::Mixture;
use crate::model::ClusterModel;
use crate::mvn::MvNormal;
use crate::prior::NiwPrior;
use crate::transform::Bounds;

/// Default Monte-Carlo grid size.
pub const DEFAULT_MC_DRAWS: usize = 2000;

/// Importance-sampling marginal scoring of event mixtures.
#[derive(Debug, Clone)]
pub struct McMarginal {
    prior: NiwPrior,
    n_draws: usize,
    mu_grid: Vec<DVector<f64>>,
    sigma_grid: Vec<DMatrix<f64>>,
}

impl McMarginal {
    /// Draw the grid once from the prior predictive; it is reused for the
    /// whole run.
    ///
    /// # Panics
    ///
    /// Panics when `n_draws` is zero.
    pub fn new<R: Rng>(
        prior: NiwPrior,
        n_draws: usize,
        rng: &mut R,
    ) -> Self {
        assert!(n_draws > 0, "the Monte Carlo grid needs at least one draw");
        let mut model = McMarginal {
            prior,
            n_draws,
            mu_grid: Vec::new(),
            sigma_grid: Vec::new(),
        };
        model.redraw_grid(rng);
        model
    }

    #[cfg(test)]
    fn with_grid(
        prior: NiwPrior,
        mu_grid: Vec<DVector<f64>>,
        sigma_grid: Vec<DMatrix<f64>>,
    ) -> Self {
        McMarginal {
            prior,
            n_draws: mu_grid.len(),
            mu_grid,
            sigma_grid,
        }
    }

    #[inline]
    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    fn redraw_grid<R: Rng>(&mut self, rng: &mut R) {
        self.mu_grid.clear();
        self.sigma_grid.clear();
        for _ in 0..self.n_draws {
            let (mu, sigma) = self.prior.draw_component(rng);
            self.mu_grid.push(mu);
            self.sigma_grid.push(sigma);
        }
    }
}

impl ClusterModel for McMarginal {
    type Obs = Mixture;
    type Component = HierComponent;
    type Prepared = DVector<f64>;

    // An event that no grid point explains still has to live somewhere;
    // open a cluster for it.
    const FORCE_NEW_ON_DEGENERATE: bool = true;

    fn prepare(
        &self,
        x: &Mixture,
        bounds: &Bounds,
    ) -> Result<DVector<f64>, EngineError> {
        if x.bounds() != bounds {
            return Err(EngineError::EventBoundsMismatch);
        }
        // the event's log likelihood at each grid point, marginalized over
        // the event's own components: Σₖ wₖ N(mₖ; μⱼ, Σⱼ + Cₖ)
        Ok(DVector::from_iterator(
            self.n_draws,
            (0..self.n_draws).map(|j| {
                let terms: Vec<f64> =
                    izip!(x.ln_weights(), x.components())
                        .map(|(lw, c)| {
                            lw + MvNormal::ln_pdf_raw(
                                c.mu(),
                                &self.mu_grid[j],
                                &(&self.sigma_grid[j] + c.cov()),
                            )
                        })
                        .collect();
                logsumexp(&terms)
            }),
        ))
    }

    fn ln_predictive(
        &self,
        comp: &HierComponent,
        ln_likes: &DVector<f64>,
    ) -> f64 {
        let joint: Vec<f64> = comp
            .ln_likes()
            .iter()
            .zip(ln_likes.iter())
            .map(|(a, b)| a + b)
            .collect();
        logsumexp(&joint) - logsumexp(comp.ln_likes().as_slice())
    }

    fn ln_predictive_new(&self, ln_likes: &DVector<f64>) -> f64 {
        logsumexp(ln_likes.as_slice()) - (self.n_draws as f64).ln()
    }

    fn open(&self, x: &Mixture, ln_likes: &DVector<f64>) -> HierComponent {
        HierComponent::new(
            x.clone(),
            ln_likes.clone(),
            &self.mu_grid,
            &self.sigma_grid,
        )
    }

    fn absorb(
        &self,
        comp: &mut HierComponent,
        x: &Mixture,
        ln_likes: &DVector<f64>,
    ) {
        comp.absorb(x.clone(), ln_likes, &self.mu_grid, &self.sigma_grid);
    }

    fn snapshot(
        &self,
        comp: &HierComponent,
    ) -> (DVector<f64>, DMatrix<f64>) {
        (comp.mu().clone(), comp.sigma().clone())
    }

    fn reset<R: Rng>(&mut self, prior: Option<NiwPrior>, rng: &mut R) {
        if let Some(p) = prior {
            self.prior = p;
        }
        self.redraw_grid(rng);
    }

    fn prior(&self) -> &NiwPrior {
        &self.prior
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::LN_2PI;
    use nalgebra::dvector;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    const TOL: f64 = 1E-10;

    fn bounds() -> Bounds {
        Bounds::new(&[(-10.0, 10.0)]).unwrap()
    }

    fn event_at(mean: f64, var: f64) -> Mixture {
        let c = MvNormal::new(
            dvector![mean],
            DMatrix::from_element(1, 1, var),
        )
        .unwrap();
        Mixture::new(vec![c], vec![1.0], bounds(), 1).unwrap()
    }

    fn two_point_model() -> McMarginal {
        McMarginal::with_grid(
            NiwPrior::default_for(1),
            vec![dvector![0.0], dvector![2.0]],
            vec![
                DMatrix::from_element(1, 1, 1.0),
                DMatrix::from_element(1, 1, 1.0),
            ],
        )
    }

    fn ln_norm_1d(x: f64, m: f64, var: f64) -> f64 {
        -0.5 * ((x - m) * (x - m) / var + var.ln() + LN_2PI)
    }

    #[test]
    fn prepare_marginalizes_over_event_components() {
        let model = two_point_model();
        let ev = event_at(0.0, 1.0);
        let l = model.prepare(&ev, &bounds()).unwrap();
        // component at 0 with unit covariance against each grid point:
        // N(0; μⱼ, 1 + 1)
        assert::close(l[0], ln_norm_1d(0.0, 0.0, 2.0), TOL);
        assert::close(l[1], ln_norm_1d(0.0, 2.0, 2.0), TOL);
    }

    #[test]
    fn prepare_rejects_mismatched_bounds() {
        let model = two_point_model();
        let other = Bounds::new(&[(-5.0, 5.0)]).unwrap();
        let c = MvNormal::new(
            dvector![0.0],
            DMatrix::from_element(1, 1, 1.0),
        )
        .unwrap();
        let ev = Mixture::new(vec![c], vec![1.0], other, 1).unwrap();
        assert!(matches!(
            model.prepare(&ev, &bounds()),
            Err(EngineError::EventBoundsMismatch)
        ));
    }

    #[test]
    fn new_cluster_predictive_averages_the_grid() {
        let model = two_point_model();
        let l = dvector![0.2_f64.ln(), 0.6_f64.ln()];
        // logsumexp(l) − ln M = ln((0.2 + 0.6)/2)
        assert::close(model.ln_predictive_new(&l), 0.4_f64.ln(), TOL);
    }

    #[test]
    fn occupied_cluster_predictive_reweights_by_accumulated_likelihood() {
        let model = two_point_model();
        let ev = event_at(0.0, 1.0);
        let comp = model.open(&ev, &dvector![0.8_f64.ln(), 0.2_f64.ln()]);
        let l = dvector![0.5_f64.ln(), 0.1_f64.ln()];
        // Σⱼ wⱼ·Lⱼ with wⱼ ∝ the cluster's accumulated likelihood
        let expected: f64 = (0.8 * 0.5 + 0.2 * 0.1) / (0.8 + 0.2);
        assert::close(
            model.ln_predictive(&comp, &l),
            expected.ln(),
            TOL,
        );
    }

    #[test]
    fn absorb_tightens_toward_the_supported_grid_point() {
        let model = two_point_model();
        let ev = event_at(0.0, 1.0);
        let l0 = model.prepare(&ev, &bounds()).unwrap();
        let mut comp = model.open(&ev, &l0);
        for _ in 0..5 {
            let l = model.prepare(&ev, &bounds()).unwrap();
            model.absorb(&mut comp, &ev, &l);
        }
        // repeated events at 0 concentrate the importance weights on the
        // grid point at 0
        assert!(comp.mu()[0].abs() < 0.5);
        assert::close(comp.n(), 6.0, TOL);
    }

    #[test]
    fn reset_redraws_the_grid() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xF0);
        let mut model =
            McMarginal::new(NiwPrior::default_for(1), 32, &mut rng);
        let before = model.mu_grid[0].clone();
        model.reset(None, &mut rng);
        assert_eq!(model.n_draws(), 32);
        assert_ne!(model.mu_grid[0], before);
    }
}
