//! Concentration-parameter resampling
//!
//! The Dirichlet-process concentration α is re-sampled after every
//! assignment with a short Metropolis-Hastings random walk targeting the
//! CRP marginal likelihood weighted by a 1/α-style prior:
//!
//! p(α | n, K) ∝ Γ(α)/Γ(α+n) · α<sup>K</sup> · e<sup>−1/α</sup>
//!
//! Only the final chain state is returned; the walk acts as a re-mixing
//! pass after each data update rather than a one-time warm-up.
use rand::Rng;
use special::Gamma as _;

/// One re-mixing pass over α given `n` assigned observations in `k`
/// clusters. Proposals are α′ = α + U(−0.5, 0.5); non-positive proposals
/// are rejected outright (the one place local silent rejection is the
/// designed behavior).
pub fn update_alpha<R: Rng>(
    alpha: f64,
    n: usize,
    k: usize,
    rng: &mut R,
) -> f64 {
    let nf = n as f64;
    let kf = k as f64;
    let ln_target = |a: f64| {
        kf.mul_add(a.ln(), a.ln_gamma().0 - (a + nf).ln_gamma().0) - a.recip()
    };

    let mut a_old = alpha;
    let n_steps = 1000 + rng.gen_range(0..100);
    for _ in 0..n_steps {
        let a_new = a_old + (rng.gen::<f64>() - 0.5);
        if a_new > 0.0
            && ln_target(a_new) - ln_target(a_old) > rng.gen::<f64>().ln()
        {
            a_old = a_new;
        }
    }
    a_old
}
