//! Inverse-Wishart draws for the Monte-Carlo component grid
//!
//! The degrees of freedom are real-valued (posterior updates add sample
//! counts to a real ν), so draws use the Bartlett factorization with
//! chi-squared marginals rather than summing ν Gaussian outer products.
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{ChiSquared, StandardNormal};

/// W<sup>-1</sup>(Ψ, ν) over positive definite matrices.
///
/// Construction assumes a positive-definite Ψ and ν > d − 1; both are
/// enforced upstream by prior validation.
#[derive(Debug, Clone)]
pub(crate) struct InvWishart {
    /// Cholesky factor of Ψ⁻¹
    chol_inv_scale: DMatrix<f64>,
    df: f64,
}

impl InvWishart {
    pub(crate) fn new(scale: &DMatrix<f64>, df: f64) -> Self {
        debug_assert!(df > scale.nrows() as f64 - 1.0);
        let inv_scale = scale
            .clone()
            .try_inverse()
            .expect("scale matrix is not invertible");
        let chol_inv_scale = inv_scale
            .cholesky()
            .expect("scale matrix is not positive definite")
            .unpack();
        InvWishart { chol_inv_scale, df }
    }

    /// Draw one positive definite matrix.
    pub(crate) fn draw<R: Rng>(&self, rng: &mut R) -> DMatrix<f64> {
        let p = self.chol_inv_scale.nrows();
        let mut a = DMatrix::<f64>::zeros(p, p);
        for i in 0..p {
            let chi2 = ChiSquared::new(self.df - i as f64)
                .expect("chi-squared dof must be positive");
            a[(i, i)] = rng.sample::<f64, _>(chi2).sqrt();
            for j in 0..i {
                a[(i, j)] = rng.sample::<f64, _>(StandardNormal);
            }
        }
        // X⁻¹ = (L A)(L A)ᵀ ~ Wishart(Ψ⁻¹, ν)
        let m = &self.chol_inv_scale * a;
        (&m * m.transpose())
            .try_inverse()
            .expect("Wishart draw is not invertible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn univariate_draw_mean_matches_inverse_gamma() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x17);
        let scale = DMatrix::from_element(1, 1, 2.0);
        let iw = InvWishart::new(&scale, 6.0);
        let n = 20_000;
        let mean = (0..n).map(|_| iw.draw(&mut rng)[(0, 0)]).sum::<f64>()
            / n as f64;
        // E[X] = Ψ/(ν - d - 1)
        assert::close(mean, 0.5, 0.03);
    }

    #[test]
    fn bivariate_draws_are_positive_definite_with_correct_mean() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x18);
        let scale = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]);
        let iw = InvWishart::new(&scale, 7.0);
        let n = 5_000;
        let mut mean = DMatrix::<f64>::zeros(2, 2);
        for _ in 0..n {
            let x = iw.draw(&mut rng);
            assert!(x.clone().cholesky().is_some());
            mean += x;
        }
        mean /= n as f64;
        let expected = scale / 4.0;
        for i in 0..2 {
            for j in 0..2 {
                assert::close(mean[(i, j)], expected[(i, j)], 0.05);
            }
        }
    }

    #[test]
    fn fractional_dof_draws_are_finite() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x19);
        let scale = DMatrix::identity(3, 3);
        let iw = InvWishart::new(&scale, 5.5);
        for _ in 0..100 {
            let x = iw.draw(&mut rng);
            assert!(x.iter().all(|v| v.is_finite()));
        }
    }
}
