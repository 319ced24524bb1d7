//! Per-cluster sufficient statistics
//!
//! A [`Component`] carries the running aggregates (count, mean, centered
//! scatter) a cluster needs for conjugate updates, plus the derived
//! posterior (μ, Σ) used when the run is frozen into a mixture. The derived
//! pair is recomputed after every assignment; it is never free state.
//!
//! A [`HierComponent`] is its hierarchical counterpart: observations are
//! whole event mixtures, the running aggregate is a vector of per-grid-point
//! log likelihoods, and (μ, Σ) are importance-weighted averages over the
//! Monte-Carlo grid.
use nalgebra::{DMatrix, DVector};

use crate::misc::logsumexp;
use crate::mixture::Mixture;
use crate::prior::NiwPrior;

/// Sufficient statistics of one pointwise cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    n: f64,
    mean: DVector<f64>,
    scatter: DMatrix<f64>,
    mu: DVector<f64>,
    sigma: DMatrix<f64>,
}

impl Component {
    /// Open a cluster from its first probit-space point.
    pub fn new(t: &DVector<f64>, prior: &NiwPrior) -> Self {
        let d = t.len();
        let mean = t.clone();
        let scatter = DMatrix::zeros(d, d);
        let (mu, sigma) = prior.map_estimates(&mean, &scatter, 1.0);
        Component {
            n: 1.0,
            mean,
            scatter,
            mu,
            sigma,
        }
    }

    /// Fold one probit-space point into the running statistics and refresh
    /// the derived posterior pair.
    ///
    /// The mean/scatter recurrence is the streaming (Welford) form, which
    /// avoids the catastrophic cancellation of the sum-of-outer-products
    /// update.
    pub fn observe(&mut self, t: &DVector<f64>, prior: &NiwPrior) {
        self.n += 1.0;
        let d1 = t - &self.mean;
        self.mean += &d1 / self.n;
        let d2 = t - &self.mean;
        self.scatter += d1 * d2.transpose();

        let (mu, sigma) =
            prior.map_estimates(&self.mean, &self.scatter, self.n);
        self.mu = mu;
        self.sigma = sigma;
    }

    #[inline]
    pub fn n(&self) -> f64 {
        self.n
    }

    #[inline]
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    #[inline]
    pub fn scatter(&self) -> &DMatrix<f64> {
        &self.scatter
    }

    /// Posterior mean location.
    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    /// Maximum-a-posteriori covariance.
    #[inline]
    pub fn sigma(&self) -> &DMatrix<f64> {
        &self.sigma
    }
}

/// Sufficient statistics of one hierarchical cluster.
#[derive(Debug, Clone)]
pub struct HierComponent {
    n: f64,
    events: Vec<Mixture>,
    ln_likes: DVector<f64>,
    mu: DVector<f64>,
    sigma: DMatrix<f64>,
}

impl HierComponent {
    /// Open a cluster from its first event and that event's per-grid-point
    /// log likelihoods.
    pub fn new(
        event: Mixture,
        ln_likes: DVector<f64>,
        mu_grid: &[DVector<f64>],
        sigma_grid: &[DMatrix<f64>],
    ) -> Self {
        let (mu, sigma) = importance_moments(&ln_likes, mu_grid, sigma_grid);
        HierComponent {
            n: 1.0,
            events: vec![event],
            ln_likes,
            mu,
            sigma,
        }
    }

    /// Fold one event in: accumulate its log likelihoods and refresh the
    /// importance-weighted (μ, Σ).
    pub fn absorb(
        &mut self,
        event: Mixture,
        ln_likes: &DVector<f64>,
        mu_grid: &[DVector<f64>],
        sigma_grid: &[DMatrix<f64>],
    ) {
        self.n += 1.0;
        self.events.push(event);
        self.ln_likes += ln_likes;
        let (mu, sigma) =
            importance_moments(&self.ln_likes, mu_grid, sigma_grid);
        self.mu = mu;
        self.sigma = sigma;
    }

    #[inline]
    pub fn n(&self) -> f64 {
        self.n
    }

    /// The event mixtures assigned to this cluster, in assignment order.
    #[inline]
    pub fn events(&self) -> &[Mixture] {
        &self.events
    }

    /// Accumulated per-grid-point log likelihoods.
    #[inline]
    pub fn ln_likes(&self) -> &DVector<f64> {
        &self.ln_likes
    }

    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    #[inline]
    pub fn sigma(&self) -> &DMatrix<f64> {
        &self.sigma
    }
}

/// Grid averages weighted by exp(ln_likes − logsumexp(ln_likes)).
///
/// Fully degenerate weights (all −∞) fall back to the unweighted grid
/// average instead of poisoning the caller with NaNs.
fn importance_moments(
    ln_likes: &DVector<f64>,
    mu_grid: &[DVector<f64>],
    sigma_grid: &[DMatrix<f64>],
) -> (DVector<f64>, DMatrix<f64>) {
    let d = mu_grid[0].len();
    let ln_norm = logsumexp(ln_likes.as_slice());
    let mut mu = DVector::zeros(d);
    let mut sigma = DMatrix::zeros(d, d);
    if ln_norm.is_finite() {
        for i in 0..mu_grid.len() {
            let w = (ln_likes[i] - ln_norm).exp();
            mu += &mu_grid[i] * w;
            sigma += &sigma_grid[i] * w;
        }
    } else {
        let w = 1.0 / mu_grid.len() as f64;
        for i in 0..mu_grid.len() {
            mu += &mu_grid[i] * w;
            sigma += &sigma_grid[i] * w;
        }
    }
    (mu, sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvn::MvNormal;
    use crate::transform::Bounds;
    use nalgebra::dvector;

    const TOL: f64 = 1E-12;

    fn prior_1d() -> NiwPrior {
        NiwPrior::new(
            dvector![0.0],
            1E-2,
            3.0,
            DMatrix::from_element(1, 1, 0.04),
        )
        .unwrap()
    }

    #[test]
    fn new_component_has_unit_count_and_zero_scatter() {
        let prior = prior_1d();
        let c = Component::new(&dvector![0.4], &prior);
        assert::close(c.n(), 1.0, TOL);
        assert::close(c.mean()[0], 0.4, TOL);
        assert::close(c.scatter()[(0, 0)], 0.0, TOL);

        let (mu, sigma) = prior.map_estimates(c.mean(), c.scatter(), 1.0);
        assert::close(c.mu()[0], mu[0], TOL);
        assert::close(c.sigma()[(0, 0)], sigma[(0, 0)], TOL);
    }

    #[test]
    fn streaming_update_matches_direct_moments() {
        let prior = NiwPrior::default_for(2);
        let pts = [
            dvector![0.1, -0.4],
            dvector![0.5, 0.2],
            dvector![-0.3, 0.9],
            dvector![0.8, 0.4],
        ];
        let mut c = Component::new(&pts[0], &prior);
        for p in &pts[1..] {
            c.observe(p, &prior);
        }

        let n = pts.len() as f64;
        let mean =
            pts.iter().fold(DVector::zeros(2), |acc, p| acc + p) / n;
        let scatter = pts.iter().fold(DMatrix::zeros(2, 2), |acc, p| {
            let diff = p - &mean;
            acc + &diff * diff.transpose()
        });

        assert::close(c.n(), n, TOL);
        for i in 0..2 {
            assert::close(c.mean()[i], mean[i], 1E-10);
            for j in 0..2 {
                assert::close(
                    c.scatter()[(i, j)],
                    scatter[(i, j)],
                    1E-10,
                );
            }
        }
    }

    #[test]
    fn derived_pair_tracks_posterior() {
        let prior = prior_1d();
        let mut c = Component::new(&dvector![0.1], &prior);
        c.observe(&dvector![0.3], &prior);
        let (mu, sigma) = prior.map_estimates(c.mean(), c.scatter(), 2.0);
        assert::close(c.mu()[0], mu[0], TOL);
        assert::close(c.sigma()[(0, 0)], sigma[(0, 0)], TOL);
    }

    fn tiny_event() -> Mixture {
        let bounds = Bounds::new(&[(-10.0, 10.0)]).unwrap();
        let c = MvNormal::new(
            dvector![0.0],
            DMatrix::from_element(1, 1, 1E-4),
        )
        .unwrap();
        Mixture::new(vec![c], vec![1.0], bounds, 1).unwrap()
    }

    #[test]
    fn importance_moments_weight_the_grid() {
        let mu_grid = vec![dvector![0.0], dvector![2.0]];
        let sigma_grid = vec![
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, 3.0),
        ];
        let ln_likes = dvector![0.25_f64.ln(), 0.75_f64.ln()];
        let c = HierComponent::new(
            tiny_event(),
            ln_likes,
            &mu_grid,
            &sigma_grid,
        );
        assert::close(c.mu()[0], 1.5, TOL);
        assert::close(c.sigma()[(0, 0)], 2.5, TOL);
        assert_eq!(c.events().len(), 1);
    }

    #[test]
    fn absorb_accumulates_in_log_space() {
        let mu_grid = vec![dvector![0.0], dvector![2.0]];
        let sigma_grid = vec![
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, 3.0),
        ];
        let mut c = HierComponent::new(
            tiny_event(),
            dvector![0.0, 0.0],
            &mu_grid,
            &sigma_grid,
        );
        c.absorb(
            tiny_event(),
            &dvector![0.25_f64.ln(), 0.75_f64.ln()],
            &mu_grid,
            &sigma_grid,
        );
        assert::close(c.n(), 2.0, TOL);
        assert_eq!(c.events().len(), 2);
        assert::close(c.ln_likes()[0], 0.25_f64.ln(), TOL);
        assert::close(c.mu()[0], 1.5, TOL);
    }

    #[test]
    fn degenerate_weights_fall_back_to_uniform() {
        let mu_grid = vec![dvector![0.0], dvector![2.0]];
        let sigma_grid = vec![
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, 3.0),
        ];
        let c = HierComponent::new(
            tiny_event(),
            dvector![f64::NEG_INFINITY, f64::NEG_INFINITY],
            &mu_grid,
            &sigma_grid,
        );
        assert::close(c.mu()[0], 1.0, TOL);
        assert::close(c.sigma()[(0, 0)], 2.0, TOL);
    }
}
