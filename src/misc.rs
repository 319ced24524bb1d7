//! Shared numerical utilities
use rand::Rng;

/// Log-sum-exp of `xs` with the usual max shift.
///
/// # Panics
///
/// Panics on an empty slice.
///
/// # Example
///
/// ```rust
/// # use dpmix::misc::logsumexp;
/// let xs: Vec<f64> = vec![0.1_f64.ln(), 0.9_f64.ln()];
/// assert!((logsumexp(&xs) - 0.0).abs() < 1e-12);
/// ```
pub fn logsumexp(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        panic!("Empty container");
    } else if xs.len() == 1 {
        xs[0]
    } else {
        let maxval =
            *xs.iter().max_by(|x, y| x.partial_cmp(y).unwrap()).unwrap();
        if maxval == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        xs.iter().fold(0.0, |acc, x| acc + (x - maxval).exp()).ln() + maxval
    }
}

#[inline]
fn binary_search(cws: &[f64], r: f64) -> usize {
    let mut left: usize = 0;
    let mut right: usize = cws.len();
    while left < right {
        let mid = (left + right) / 2;
        if cws[mid] < r {
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    left
}

fn catflip(cws: &[f64], r: f64) -> Option<usize> {
    if cws.len() > 9 {
        let ix = binary_search(cws, r);
        if ix < cws.len() {
            Some(ix)
        } else {
            None
        }
    } else {
        cws.iter().position(|&w| w > r)
    }
}

/// Draw `n` indices in proportion to their `weights`.
///
/// The weights need not be normalized, but they must be non-negative with a
/// positive sum.
///
/// # Panics
///
/// Panics on empty `weights` or when no index can be drawn (all-zero
/// weights).
pub fn pflip<R: Rng>(weights: &[f64], n: usize, rng: &mut R) -> Vec<usize> {
    if weights.is_empty() {
        panic!("Empty container");
    }

    let mut cws: Vec<f64> = weights.to_vec();
    for i in 1..cws.len() {
        cws[i] += cws[i - 1];
    }
    let scale: f64 = *cws.last().unwrap();

    (0..n)
        .map(|_| {
            let r = rng.gen::<f64>() * scale;
            match catflip(&cws, r) {
                Some(ix) => ix,
                None => panic!("Could not draw from {:?}", weights),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    const TOL: f64 = 1E-12;

    #[test]
    fn logsumexp_on_vector_of_zeros() {
        let xs: Vec<f64> = vec![0.0; 5];
        // should be about log(5)
        assert::close(logsumexp(&xs), 1.609_437_912_434_100_3, TOL);
    }

    #[test]
    fn logsumexp_on_random_values() {
        let xs: Vec<f64> = vec![
            0.304_153_86,
            -0.070_722_96,
            -1.042_870_19,
            0.278_554_07,
            -0.818_975_65,
        ];
        assert::close(logsumexp(&xs), 1.482_000_789_426_305_9, TOL);
    }

    #[test]
    fn logsumexp_returns_only_value_on_singleton() {
        let xs: Vec<f64> = vec![0.304_153_86];
        assert::close(logsumexp(&xs), 0.304_153_86, TOL);
    }

    #[test]
    fn logsumexp_all_neg_infinity() {
        let xs: Vec<f64> = vec![f64::NEG_INFINITY; 4];
        assert_eq!(logsumexp(&xs), f64::NEG_INFINITY);
    }

    #[test]
    #[should_panic]
    fn logsumexp_should_panic_on_empty() {
        let xs: Vec<f64> = Vec::new();
        logsumexp(&xs);
    }

    #[test]
    fn pflip_should_always_draw_highest_weight_indices() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xABCD);
        let weights: Vec<f64> = vec![0.0, 0.0, 1.0, 0.0];
        let xs = pflip(&weights, 100, &mut rng);
        assert!(xs.iter().all(|&x| x == 2));
    }

    #[test]
    fn pflip_should_draw_according_to_weights() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xABCD);
        let weights: Vec<f64> = vec![1.0, 1.0, 1.0, 1.0];
        let xs = pflip(&weights, 10_000, &mut rng);

        let mut counts = [0_usize; 4];
        xs.iter().for_each(|&x| counts[x] += 1);
        counts
            .iter()
            .for_each(|&ct| assert::close(ct as f64, 2_500.0, 250.0));
    }

    #[test]
    fn pflip_unnormalized_long_weight_vector() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x1234);
        // long enough to hit the bisection path
        let mut weights: Vec<f64> = vec![0.0; 12];
        weights[7] = 11.2;
        let xs = pflip(&weights, 50, &mut rng);
        assert!(xs.iter().all(|&x| x == 7));
    }
}
